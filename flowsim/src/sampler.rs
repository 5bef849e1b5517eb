//! Throughput over time.
//!
//! The [`Sampler`] is invoked every `interval` of virtual time and records,
//! for each flow, the throughput delivered since the previous sample.

use flowsim_core::{FlowId, FlowRecord, VirtualTime};

/// Throughput of one flow over one sampling interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// End of the interval.
    pub time: VirtualTime,
    pub flow_id: FlowId,
    /// Bytes delivered since the flow started.
    pub rx_bytes: u64,
    /// Bits per second delivered during the interval.
    pub throughput_bps: f64,
}

#[derive(Debug)]
pub struct Sampler {
    interval: VirtualTime,
    last_time: VirtualTime,
    /// `rx_bytes` of every flow at the previous sample, indexed like the
    /// snapshots
    last_rx_bytes: Vec<u64>,
    samples: Vec<Sample>,
}

impl Sampler {
    pub fn new(interval: VirtualTime) -> Self {
        Self {
            interval,
            last_time: VirtualTime::ZERO,
            last_rx_bytes: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn interval(&self) -> VirtualTime {
        self.interval
    }

    /// Record one sample per flow of `flows` (a snapshot, in flow id
    /// order). Flows that appeared since the previous sample start from
    /// zero.
    pub fn sample(&mut self, now: VirtualTime, flows: &[FlowRecord]) {
        let elapsed = now.saturating_sub(self.last_time);
        self.last_rx_bytes.resize(flows.len(), 0);

        for (flow, last) in flows.iter().zip(self.last_rx_bytes.iter_mut()) {
            let delivered = flow.rx_bytes.saturating_sub(*last);
            let throughput_bps = if elapsed.is_zero() {
                0.0
            } else {
                delivered as f64 * 8.0 / elapsed.as_secs_f64()
            };
            self.samples.push(Sample {
                time: now,
                flow_id: flow.flow_id,
                rx_bytes: flow.rx_bytes,
                throughput_bps,
            });
            *last = flow.rx_bytes;
        }

        self.last_time = now;
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
