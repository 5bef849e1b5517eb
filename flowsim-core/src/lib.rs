/*!
# Flow simulation core

Deterministic, single-threaded primitives to measure traffic flows in a
discrete-event simulation and to replay recorded traffic traces.

* [`Scheduler`]: the virtual clock and the event queue everything else
  runs in;
* [`FlowMonitor`]: passive per-flow accounting, fed by send notifications
  and by the surrounding simulator's delivery/drop notifications
  (built from a [`PacketRegistry`] and a [`FlowStats`]);
* [`TraceReplay`]: emits the packets of a recorded trace with the recorded
  inter-packet gaps.

The crate does not model a network: it is told when packets leave and
whether they arrive.
*/

mod flow;
mod monitor;
mod registry;
mod replay;
mod scheduler;
mod stats;
pub mod time;
pub mod trace;

pub use self::{
    flow::{FlowClassifier, FlowId, FlowTuple, Protocol},
    monitor::{Delivery, FlowMonitor, FlowReport},
    registry::{PacketId, PacketRecord, PacketRegistry, RegistryError},
    replay::{ReplayError, ReplayState, Sink, TraceReplay, TrafficPattern},
    scheduler::{Callback, EventHandle, Scheduler, SchedulerError, SchedulerStats},
    stats::{FlowMetrics, FlowRecord, FlowStats, MetricsError},
    time::{TimeDelta, VirtualTime},
    trace::{TraceEvent, TraceParseError, TraceParseErrorKind, parse_trace},
};
