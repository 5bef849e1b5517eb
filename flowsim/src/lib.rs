/*!
# Flow measurement experiments

Replays traffic traces over a simulated link and measures every flow
with the [`flowsim_core`] engine: throughput, delay, jitter and packet
delivery ratio, per flow and over time.

```
use flowsim::{Experiment, ExperimentConfig, Source, report};
use flowsim_core::{TrafficPattern, VirtualTime};
use std::net::Ipv4Addr;

let config: ExperimentConfig = "
    stop_time = 2s
    latency = 10ms
    packet_loss = list[2]
".parse().unwrap();

let cbr = TrafficPattern::constant_bit_rate(VirtualTime::from_millis(100), 1_000, 10);
let source = Source::udp(Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2), cbr);
let mut experiment = Experiment::new(config);
experiment.add_source(source).unwrap();
let report = experiment.run().unwrap();

assert_eq!(report.flows.lost_packets(), 1);

let mut summary = Vec::new();
report::write_summary(&mut summary, &report).unwrap();
```
*/

pub mod config;
pub mod defaults;
pub mod experiment;
pub mod link;
pub mod measure;
pub mod report;
pub mod sampler;
pub mod source;

pub use self::{
    config::ExperimentConfig,
    experiment::{Experiment, ExperimentError, ExperimentReport},
    measure::{Bandwidth, Latency, PacketLoss},
    source::{Source, load_trace},
};
