//! Report writers.
//!
//! * [`write_packets_csv`]: one row per delivered packet;
//! * [`write_flows_csv`]: one row per flow with its derived metrics;
//! * [`write_summary`]: the same per-flow figures, for humans;
//! * [`write_samples_csv`]: throughput of every flow over time.
//!
//! Times are in seconds. A throughput over an empty observation window is
//! written `n/a`.

use crate::{experiment::ExperimentReport, sampler::Sample};
use flowsim_core::{Delivery, FlowMetrics, FlowRecord};
use std::io::{self, Write};

pub const PACKETS_CSV_HEADER: &str = "srcNode,dstNode,packetSize,txTime,rxTime";

pub const FLOWS_CSV_HEADER: &str = concat!(
    "flowId,src,dst,protocol,txPackets,rxPackets,txBytes,rxBytes,",
    "lostPackets,expiredPackets,throughputBps,meanDelay,meanJitter,pdr",
);

pub const SAMPLES_CSV_HEADER: &str = "time,flowId,rxBytes,throughputBps";

const NOT_AVAILABLE: &str = "n/a";

/// Write the per-packet CSV of `deliveries`.
///
/// Only delivered packets have a row: lost packets have no receive time.
pub fn write_packets_csv<W: Write>(mut writer: W, deliveries: &[Delivery]) -> io::Result<()> {
    writeln!(writer, "{PACKETS_CSV_HEADER}")?;
    for delivery in deliveries {
        let record = &delivery.record;
        writeln!(
            writer,
            "{},{},{},{},{}",
            record.tuple.src_addr,
            record.tuple.dst_addr,
            record.size,
            record.send_time.as_secs_f64(),
            delivery.received_at.as_secs_f64(),
        )?;
    }
    writer.flush()
}

/// Write the per-flow CSV of `report`.
pub fn write_flows_csv<W: Write>(mut writer: W, report: &ExperimentReport) -> io::Result<()> {
    writeln!(writer, "{FLOWS_CSV_HEADER}")?;
    for (flow, metrics) in report.metrics() {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            flow.flow_id,
            flow.tuple.src_addr,
            flow.tuple.dst_addr,
            flow.tuple.protocol,
            flow.tx_packets,
            flow.rx_packets,
            flow.tx_bytes,
            flow.rx_bytes,
            flow.lost_packets,
            flow.expired_packets,
            Throughput(metrics.throughput_bps),
            metrics.mean_delay.as_secs_f64(),
            metrics.mean_jitter.as_secs_f64(),
            metrics.packet_delivery_ratio,
        )?;
    }
    writer.flush()
}

/// Write one row per throughput [`Sample`], in the order they were taken.
pub fn write_samples_csv<W: Write>(mut writer: W, samples: &[Sample]) -> io::Result<()> {
    writeln!(writer, "{SAMPLES_CSV_HEADER}")?;
    for sample in samples {
        writeln!(
            writer,
            "{},{},{},{}",
            sample.time.as_secs_f64(),
            sample.flow_id,
            sample.rx_bytes,
            sample.throughput_bps,
        )?;
    }
    writer.flush()
}

/// Write a human readable summary of `report`.
pub fn write_summary<W: Write>(mut writer: W, report: &ExperimentReport) -> io::Result<()> {
    writeln!(
        writer,
        "{} flow(s), {} packet(s) sent, {} received, {} lost, observed over {}",
        report.flows.flows.len(),
        report.flows.tx_packets(),
        report.flows.rx_packets(),
        report.flows.lost_packets(),
        report.window,
    )?;
    if !report.flows.is_complete() {
        writeln!(
            writer,
            "{} packet(s) were still in flight at {} and are counted as lost",
            report.flows.unresolved, report.flows.finished_at,
        )?;
    }

    for (flow, metrics) in report.metrics() {
        write_flow_summary(&mut writer, flow, &metrics)?;
    }
    writer.flush()
}

fn write_flow_summary<W: Write>(
    writer: &mut W,
    flow: &FlowRecord,
    metrics: &FlowMetrics,
) -> io::Result<()> {
    writeln!(writer)?;
    write!(writer, "Flow {} ({})", flow.flow_id, flow.tuple)?;
    if !metrics.complete {
        write!(writer, " incomplete")?;
    }
    writeln!(writer)?;
    writeln!(writer, "  Tx Packets:   {}", flow.tx_packets)?;
    writeln!(writer, "  Rx Packets:   {}", flow.rx_packets)?;
    writeln!(writer, "  Tx Bytes:     {}", flow.tx_bytes)?;
    writeln!(writer, "  Rx Bytes:     {}", flow.rx_bytes)?;
    writeln!(writer, "  Lost Packets: {}", flow.lost_packets)?;
    if flow.expired_packets > 0 {
        writeln!(writer, "    of which unresolved: {}", flow.expired_packets)?;
    }
    match metrics.throughput_bps {
        Some(bps) => writeln!(writer, "  Throughput:   {:.4} Mbps", bps / 1_000_000.0)?,
        None => writeln!(writer, "  Throughput:   {NOT_AVAILABLE}")?,
    }
    writeln!(writer, "  Mean Delay:   {}", metrics.mean_delay)?;
    writeln!(writer, "  Mean Jitter:  {}", metrics.mean_jitter)?;
    writeln!(
        writer,
        "  Packet Delivery Ratio: {:.2}%",
        metrics.packet_delivery_ratio * 100.0
    )
}

struct Throughput(Option<f64>);

impl std::fmt::Display for Throughput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(bps) => write!(f, "{bps}"),
            None => f.write_str(NOT_AVAILABLE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ExperimentConfig,
        experiment::Experiment,
        measure::{Bandwidth, Latency, PacketLoss},
        source::Source,
    };
    use flowsim_core::{TraceEvent, TrafficPattern, VirtualTime};
    use std::net::Ipv4Addr;

    fn report(config: ExperimentConfig, events: &[(u64, u32)]) -> ExperimentReport {
        let trace = events
            .iter()
            .map(|(millis, size)| TraceEvent::new(VirtualTime::from_millis(*millis), *size))
            .collect();
        let mut experiment = Experiment::new(
            config
                .set_latency(Latency::from_millis(10))
                .set_bandwidth(Bandwidth::UNLIMITED)
                .set_record_deliveries(true),
        );
        experiment
            .add_source(Source::udp(
                Ipv4Addr::new(10, 1, 1, 1),
                Ipv4Addr::new(10, 1, 1, 2),
                TrafficPattern::Trace(trace),
            ))
            .unwrap();
        experiment.run().unwrap()
    }

    fn write<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn packets_csv() {
        let report = report(ExperimentConfig::new(), &[(0, 100), (500, 200)]);
        let csv = write(|w| write_packets_csv(w, &report.flows.deliveries));

        assert_eq!(
            csv,
            "srcNode,dstNode,packetSize,txTime,rxTime\n\
             10.1.1.1,10.1.1.2,100,0,0.01\n\
             10.1.1.1,10.1.1.2,200,0.5,0.51\n"
        );
    }

    #[test]
    fn flows_csv() {
        let config = ExperimentConfig::new().set_stop_time(VirtualTime::from_secs(1));
        let report = report(config, &[(0, 1_000), (500, 1_000)]);
        let csv = write(|w| write_flows_csv(w, &report));

        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(FLOWS_CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some("1,10.1.1.1,10.1.1.2,udp,2,2,2000,2000,0,0,16000,0.01,0,1")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn empty_window_is_not_available() {
        let config = ExperimentConfig::new().set_observation_window(VirtualTime::ZERO);
        let report = report(config, &[(0, 100)]);

        let csv = write(|w| write_flows_csv(w, &report));
        assert!(csv.lines().nth(1).unwrap().contains(",n/a,"), "{csv}");

        let summary = write(|w| write_summary(w, &report));
        assert!(summary.contains("Throughput:   n/a"), "{summary}");
    }

    #[test]
    fn summary_flags_incomplete_flows() {
        let config = ExperimentConfig::new()
            .set_stop_time(VirtualTime::from_millis(505))
            .set_packet_loss(PacketLoss::None);
        let report = report(config, &[(0, 100), (500, 100)]);
        let summary = write(|w| write_summary(w, &report));

        assert!(
            summary.starts_with("1 flow(s), 2 packet(s) sent, 1 received, 1 lost"),
            "{summary}"
        );
        assert!(
            summary.contains("1 packet(s) were still in flight at 505ms"),
            "{summary}"
        );
        assert!(
            summary.contains("Flow 1 (10.1.1.1:49153 -> 10.1.1.2:9 (udp)) incomplete"),
            "{summary}"
        );
        assert!(summary.contains("Packet Delivery Ratio: 50.00%"), "{summary}");
    }

    #[test]
    fn summary_of_a_complete_run() {
        let report = report(ExperimentConfig::new(), &[(0, 100)]);
        let summary = write(|w| write_summary(w, &report));

        assert!(!summary.contains("incomplete"), "{summary}");
        assert!(!summary.contains("still in flight"), "{summary}");
        assert!(summary.contains("Mean Delay:   10ms"), "{summary}");
    }

    #[test]
    fn samples_csv() {
        let config = ExperimentConfig::new()
            .set_stop_time(VirtualTime::from_secs(1))
            .set_sample_interval(VirtualTime::from_millis(500));
        let report = report(config, &[(0, 1_000), (600, 500)]);
        let csv = write(|w| write_samples_csv(w, &report.samples));

        assert_eq!(
            csv,
            "time,flowId,rxBytes,throughputBps\n\
             0.5,1,1000,16000\n\
             1,1,1500,8000\n"
        );
    }

    #[test]
    fn no_samples_is_just_the_header() {
        let csv = write(|w| write_samples_csv(w, &[]));
        assert_eq!(csv, format!("{SAMPLES_CSV_HEADER}\n"));
    }
}
