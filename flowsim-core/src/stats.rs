//! Per-flow statistics.
//!
//! [`FlowStats`] accumulates counters per flow from send, receive and loss
//! notifications. [`FlowStats::snapshot`] provides a point-in-time copy of
//! every [`FlowRecord`]; derived metrics (throughput, mean delay, mean
//! jitter, delivery ratio) are computed from a record on demand with
//! [`FlowRecord::metrics`] and are never stored.

use crate::{
    flow::{FlowClassifier, FlowId, FlowTuple},
    time::VirtualTime,
};
use thiserror::Error;

/// Counters of a single flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// The flow's identifier.
    pub flow_id: FlowId,
    /// The five-tuple this flow was classified from.
    pub tuple: FlowTuple,
    /// Packets handed to the network.
    pub tx_packets: u64,
    /// Packets delivered.
    pub rx_packets: u64,
    /// Bytes handed to the network.
    pub tx_bytes: u64,
    /// Bytes delivered.
    pub rx_bytes: u64,
    /// Sum of the end-to-end delay of every delivered packet.
    pub delay_sum: VirtualTime,
    /// Sum of `|delay(n) - delay(n-1)|` over consecutive deliveries.
    pub jitter_sum: VirtualTime,
    /// Delay of the last delivered packet, `None` until the first delivery.
    pub last_delay: Option<VirtualTime>,
    /// Packets reported lost, including expired ones.
    ///
    /// This is an independent counter: packets still in flight are neither
    /// received nor lost, so it is not `tx_packets - rx_packets`.
    pub lost_packets: u64,
    /// Bytes of the lost packets.
    pub lost_bytes: u64,
    /// Packets that were never resolved and had to be swept from the
    /// registry. A non-zero value means the flow's statistics are
    /// incomplete.
    pub expired_packets: u64,
    pub time_first_tx: Option<VirtualTime>,
    pub time_last_tx: Option<VirtualTime>,
    pub time_first_rx: Option<VirtualTime>,
    pub time_last_rx: Option<VirtualTime>,
}

/// Metrics derived from a [`FlowRecord`] over an observation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowMetrics {
    /// Delivered bits per second of the window, `None` for an empty window.
    pub throughput_bps: Option<f64>,
    pub mean_delay: VirtualTime,
    pub mean_jitter: VirtualTime,
    /// `rx_packets / tx_packets`, `0` when nothing was sent.
    pub packet_delivery_ratio: f64,
    /// `false` if some packets of the flow were never resolved.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// A throughput over a zero-length window is meaningless. The window
    /// must be provided by the caller, it is never guessed from packet
    /// timestamps.
    #[error("The observation window is empty, throughput is undefined")]
    EmptyObservationWindow,
}

/// The statistics aggregator.
///
/// Owns the [`FlowClassifier`] and every [`FlowRecord`]. Records are stored
/// densely and indexed by [`FlowId`], so snapshots are in id order.
#[derive(Debug, Default)]
pub struct FlowStats {
    classifier: FlowClassifier,
    flows: Vec<FlowRecord>,
}

impl FlowRecord {
    fn new(flow_id: FlowId, tuple: FlowTuple) -> Self {
        Self {
            flow_id,
            tuple,
            tx_packets: 0,
            rx_packets: 0,
            tx_bytes: 0,
            rx_bytes: 0,
            delay_sum: VirtualTime::ZERO,
            jitter_sum: VirtualTime::ZERO,
            last_delay: None,
            lost_packets: 0,
            lost_bytes: 0,
            expired_packets: 0,
            time_first_tx: None,
            time_last_tx: None,
            time_first_rx: None,
            time_last_rx: None,
        }
    }

    /// Delivered bits per second over `window`.
    ///
    /// # Errors
    ///
    /// [`MetricsError::EmptyObservationWindow`] if `window` is zero.
    pub fn throughput(&self, window: VirtualTime) -> Result<f64, MetricsError> {
        if window.is_zero() {
            return Err(MetricsError::EmptyObservationWindow);
        }
        Ok(self.rx_bytes as f64 * 8.0 / window.as_secs_f64())
    }

    /// `delay_sum / rx_packets`, zero if nothing was received.
    pub fn mean_delay(&self) -> VirtualTime {
        if self.rx_packets == 0 {
            return VirtualTime::ZERO;
        }
        VirtualTime::from_nanos(self.delay_sum.as_nanos() / self.rx_packets)
    }

    /// `jitter_sum / max(rx_packets - 1, 1)`
    pub fn mean_jitter(&self) -> VirtualTime {
        let samples = self.rx_packets.saturating_sub(1).max(1);
        VirtualTime::from_nanos(self.jitter_sum.as_nanos() / samples)
    }

    /// `rx_packets / tx_packets`, zero if nothing was sent.
    pub fn packet_delivery_ratio(&self) -> f64 {
        if self.tx_packets == 0 {
            return 0.0;
        }
        self.rx_packets as f64 / self.tx_packets as f64
    }

    /// `true` unless some packets had to be swept unresolved.
    pub fn is_complete(&self) -> bool {
        self.expired_packets == 0
    }

    /// All derived metrics at once.
    ///
    /// ```
    /// # use flowsim_core::{FlowStats, FlowTuple, Protocol, VirtualTime};
    /// # use std::net::Ipv4Addr;
    /// let tuple = FlowTuple::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, 1, 2, Protocol::Udp);
    /// let mut stats = FlowStats::new();
    /// stats.on_sent(&tuple, 1_000, VirtualTime::ZERO);
    /// let delay = VirtualTime::from_millis(10);
    /// stats.on_received(&tuple, 1_000, delay, delay);
    ///
    /// let metrics = stats.snapshot()[0].metrics(VirtualTime::from_secs(1));
    /// assert_eq!(metrics.throughput_bps, Some(8_000.0));
    /// assert_eq!(metrics.mean_delay, VirtualTime::from_millis(10));
    /// assert_eq!(metrics.packet_delivery_ratio, 1.0);
    /// ```
    pub fn metrics(&self, window: VirtualTime) -> FlowMetrics {
        FlowMetrics {
            throughput_bps: self.throughput(window).ok(),
            mean_delay: self.mean_delay(),
            mean_jitter: self.mean_jitter(),
            packet_delivery_ratio: self.packet_delivery_ratio(),
            complete: self.is_complete(),
        }
    }
}

impl FlowStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// The classifier, for callers that need the [`FlowId`] of a tuple.
    pub fn classifier(&self) -> &FlowClassifier {
        &self.classifier
    }

    fn record_mut(&mut self, tuple: &FlowTuple) -> &mut FlowRecord {
        let flow_id = self.classifier.classify(tuple);
        let index = flow_id.index();
        if index == self.flows.len() {
            self.flows.push(FlowRecord::new(flow_id, *tuple));
        }
        &mut self.flows[index]
    }

    /// Classify `tuple`, creating its (empty) record if needed.
    pub fn classify(&mut self, tuple: &FlowTuple) -> FlowId {
        self.record_mut(tuple).flow_id
    }

    pub fn on_sent(&mut self, tuple: &FlowTuple, size: u32, now: VirtualTime) {
        let record = self.record_mut(tuple);
        record.tx_packets += 1;
        record.tx_bytes += u64::from(size);
        record.time_first_tx.get_or_insert(now);
        record.time_last_tx = Some(now);
    }

    pub fn on_received(
        &mut self,
        tuple: &FlowTuple,
        size: u32,
        delay: VirtualTime,
        now: VirtualTime,
    ) {
        let record = self.record_mut(tuple);
        record.rx_packets += 1;
        record.rx_bytes += u64::from(size);
        record.delay_sum += delay;
        if let Some(last_delay) = record.last_delay {
            record.jitter_sum += delay.abs_diff(last_delay);
        }
        record.last_delay = Some(delay);
        record.time_first_rx.get_or_insert(now);
        record.time_last_rx = Some(now);
    }

    /// A packet the network reported as lost.
    pub fn on_lost(&mut self, tuple: &FlowTuple, size: u32) {
        let record = self.record_mut(tuple);
        record.lost_packets += 1;
        record.lost_bytes += u64::from(size);
    }

    /// A packet that was never resolved and had to be swept. Counted as
    /// lost, and flags the flow as incomplete.
    pub fn on_expired(&mut self, tuple: &FlowTuple, size: u32) {
        self.on_lost(tuple, size);
        self.record_mut(tuple).expired_packets += 1;
    }

    pub fn get(&self, flow_id: FlowId) -> Option<&FlowRecord> {
        self.flows.get(flow_id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Copy of every flow record, ordered by [`FlowId`].
    pub fn snapshot(&self) -> Vec<FlowRecord> {
        self.flows.clone()
    }
}
