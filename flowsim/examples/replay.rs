//! Replay a trace file over a simulated link and report every flow.
//!
//! Run with:
//!   cargo run --example replay -p flowsim -- trace.txt --latency 20ms --packet-loss 1%
//!
//! Without a trace file a constant bit rate source is used instead. Set
//! `RUST_LOG=flowsim=debug` to see the late deliveries and expiry sweeps.

use anyhow::{Context as _, Result};
use clap::Parser;
use flowsim::{
    Bandwidth, Experiment, ExperimentConfig, Latency, PacketLoss, Source, load_trace, report,
};
use flowsim_core::{TrafficPattern, VirtualTime};
use std::{
    fs::File,
    io::{BufWriter, Write as _},
    net::IpAddr,
    path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Command {
    /// Trace file, one `<time> <size>` event per line.
    trace: Option<PathBuf>,

    /// Experiment configuration file, `key = value` per line. The other
    /// options override its settings.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    stop_time: Option<VirtualTime>,
    #[arg(long)]
    latency: Option<Latency>,
    #[arg(long)]
    bandwidth: Option<Bandwidth>,
    #[arg(long)]
    packet_loss: Option<PacketLoss>,
    #[arg(long)]
    seed: Option<u64>,

    /// Sample the throughput of every flow (every 100ms unless the
    /// configuration says otherwise).
    #[arg(long)]
    sample: bool,

    #[arg(long, default_value = "10.1.1.1")]
    src: IpAddr,
    #[arg(long, default_value = "10.1.1.2")]
    dst: IpAddr,
    /// When the source starts sending.
    #[arg(long, default_value = "1s")]
    start: VirtualTime,

    /// Interval of the constant bit rate source used without a trace.
    #[arg(long, default_value = "10ms")]
    cbr_interval: VirtualTime,
    #[arg(long, default_value = "1024")]
    cbr_size: u32,
    /// Number of packets the constant bit rate source sends, `0` to send
    /// until the stop time.
    #[arg(long, default_value = "0")]
    cbr_packets: u64,

    /// Write one row per delivered packet to this file.
    #[arg(long)]
    packets_csv: Option<PathBuf>,
    /// Write one row per flow to this file.
    #[arg(long)]
    flows_csv: Option<PathBuf>,
}

impl Command {
    fn config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
                .parse::<ExperimentConfig>()
                .with_context(|| format!("Invalid configuration {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        if let Some(stop_time) = self.stop_time {
            config = config.set_stop_time(stop_time);
        }
        if let Some(latency) = self.latency {
            config = config.set_latency(latency);
        }
        if let Some(bandwidth) = self.bandwidth {
            config = config.set_bandwidth(bandwidth);
        }
        if let Some(packet_loss) = self.packet_loss.clone() {
            config = config.set_packet_loss(packet_loss);
        }
        if let Some(seed) = self.seed {
            config = config.set_seed(seed);
        }
        if self.sample {
            config = config.enable_sampling();
        }

        Ok(config.set_record_deliveries(self.packets_csv.is_some()))
    }

    fn pattern(&self) -> Result<TrafficPattern> {
        match &self.trace {
            Some(path) => Ok(TrafficPattern::Trace(load_trace(path)?)),
            None => Ok(TrafficPattern::constant_bit_rate(
                self.cbr_interval,
                self.cbr_size,
                self.cbr_packets,
            )),
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cmd = Command::parse();
    let config = cmd.config()?;
    let source = Source::udp(cmd.src, cmd.dst, cmd.pattern()?).set_start(cmd.start);

    let mut experiment = Experiment::new(config);
    experiment.add_source(source)?;
    let report = experiment.run()?;

    let mut stdout = std::io::stdout().lock();
    report::write_summary(&mut stdout, &report)?;

    if !report.samples.is_empty() {
        writeln!(stdout)?;
        report::write_samples_csv(&mut stdout, &report.samples)?;
    }

    if let Some(path) = &cmd.packets_csv {
        report::write_packets_csv(create(path)?, &report.flows.deliveries)?;
    }
    if let Some(path) = &cmd.flows_csv {
        report::write_flows_csv(create(path)?, &report)?;
    }

    Ok(())
}
