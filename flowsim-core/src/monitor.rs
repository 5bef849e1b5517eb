//! The flow monitor: a [`PacketRegistry`] and a [`FlowStats`] wired
//! together.
//!
//! Traffic sources call [`FlowMonitor::on_send`]; the surrounding simulator
//! calls [`FlowMonitor::notify_received`] or [`FlowMonitor::notify_dropped`]
//! with the id it was given. At the end of the run
//! [`FlowMonitor::finish`] sweeps whatever is still in flight, accounts it
//! as lost and returns the final [`FlowReport`].
//!
//! ```
//! use flowsim_core::{FlowMonitor, FlowTuple, Protocol, VirtualTime};
//! use std::net::Ipv4Addr;
//!
//! let (a, b) = (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
//! let tuple = FlowTuple::new(a, b, 1, 2, Protocol::Udp);
//! let mut monitor = FlowMonitor::new();
//!
//! let delivered = monitor.on_send(tuple, 100, VirtualTime::ZERO);
//! let _in_flight = monitor.on_send(tuple, 100, VirtualTime::ZERO);
//! monitor.notify_received(delivered, VirtualTime::from_millis(5)).unwrap();
//!
//! let report = monitor.finish(VirtualTime::from_secs(1));
//! assert_eq!(report.unresolved, 1);
//! assert_eq!(report.flows[0].rx_packets, 1);
//! assert_eq!(report.flows[0].lost_packets, 1);
//! assert!(!report.flows[0].is_complete());
//! ```

use crate::{
    flow::{FlowId, FlowTuple},
    registry::{PacketId, PacketRecord, PacketRegistry, RegistryError},
    stats::{FlowRecord, FlowStats},
    time::VirtualTime,
};
use tracing::{debug, warn};

/// A packet that reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub record: PacketRecord,
    pub flow_id: FlowId,
    pub received_at: VirtualTime,
    pub delay: VirtualTime,
}

/// Final state of a run, returned by [`FlowMonitor::finish`].
#[derive(Debug, Clone)]
pub struct FlowReport {
    /// Virtual time at which the run was finished.
    pub finished_at: VirtualTime,
    /// Every flow, ordered by [`FlowId`].
    pub flows: Vec<FlowRecord>,
    /// Number of packets that were still unresolved at the end of the run
    /// (and are counted as lost in their flow).
    pub unresolved: usize,
    /// Delivery log, empty unless [`FlowMonitor::record_deliveries`] was
    /// enabled.
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Default)]
pub struct FlowMonitor {
    registry: PacketRegistry,
    stats: FlowStats,
    deliveries: Option<Vec<Delivery>>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a log of every individual [`Delivery`] (off by default).
    pub fn record_deliveries(mut self, enabled: bool) -> Self {
        self.deliveries = enabled.then(Vec::new);
        self
    }

    /// Number of packets sent and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> &FlowStats {
        &self.stats
    }

    pub fn snapshot(&self) -> Vec<FlowRecord> {
        self.stats.snapshot()
    }

    /// Deliveries recorded so far.
    pub fn deliveries(&self) -> &[Delivery] {
        self.deliveries.as_deref().unwrap_or_default()
    }

    /// A packet of `size` bytes is handed to the network on `tuple`.
    pub fn on_send(&mut self, tuple: FlowTuple, size: u32, now: VirtualTime) -> PacketId {
        self.stats.on_sent(&tuple, size, now);
        self.registry.on_send(tuple, size, now)
    }

    /// The network delivered packet `id` at `now`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownPacket`] if the packet is unknown or already
    /// resolved. The statistics are left untouched in that case.
    pub fn notify_received(
        &mut self,
        id: PacketId,
        now: VirtualTime,
    ) -> Result<Delivery, RegistryError> {
        let record = self.registry.on_receive(id)?;
        let delay = record.delay_at(now);

        self.stats.on_received(&record.tuple, record.size, delay, now);

        let delivery = Delivery {
            record,
            flow_id: self.stats.classify(&record.tuple),
            received_at: now,
            delay,
        };
        if let Some(deliveries) = self.deliveries.as_mut() {
            deliveries.push(delivery);
        }
        Ok(delivery)
    }

    /// The network reported packet `id` as lost.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownPacket`] if the packet is unknown or already
    /// resolved.
    pub fn notify_dropped(&mut self, id: PacketId) -> Result<PacketRecord, RegistryError> {
        let record = self.registry.on_drop(id)?;
        self.stats.on_lost(&record.tuple, record.size);
        Ok(record)
    }

    /// Sweep packets in flight for longer than `age` and account them as
    /// lost. Returns how many were swept.
    pub fn expire_older_than(&mut self, age: VirtualTime, now: VirtualTime) -> usize {
        let expired = self.registry.expire_older_than(age, now);
        for record in &expired {
            self.stats.on_expired(&record.tuple, record.size);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), %age, %now, "expired packets in flight");
        }
        expired.len()
    }

    /// End the run: every packet still in flight is accounted as lost and
    /// flags its flow as incomplete.
    pub fn finish(mut self, now: VirtualTime) -> FlowReport {
        let unresolved = self.registry.drain();
        for record in &unresolved {
            self.stats.on_expired(&record.tuple, record.size);
        }
        if !unresolved.is_empty() {
            warn!(
                count = unresolved.len(),
                %now,
                "packets unresolved at the end of the run, counted as lost"
            );
        }

        FlowReport {
            finished_at: now,
            flows: self.stats.snapshot(),
            unresolved: unresolved.len(),
            deliveries: self.deliveries.unwrap_or_default(),
        }
    }
}

impl FlowReport {
    /// `true` if every packet sent was resolved by the network.
    pub fn is_complete(&self) -> bool {
        self.unresolved == 0
    }

    pub fn tx_packets(&self) -> u64 {
        self.flows.iter().map(|flow| flow.tx_packets).sum()
    }

    pub fn rx_packets(&self) -> u64 {
        self.flows.iter().map(|flow| flow.rx_packets).sum()
    }

    pub fn lost_packets(&self) -> u64 {
        self.flows.iter().map(|flow| flow.lost_packets).sum()
    }
}
