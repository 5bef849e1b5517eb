//! Packet identity registry.
//!
//! Every packet handed to the network is given a [`PacketId`] and a
//! [`PacketRecord`] remembering when and on which flow it was sent. The
//! record is retired exactly once: when the packet is delivered, when the
//! network reports it lost, or when it is swept as expired.
//!
//! An id the registry does not know about is always reported as
//! [`RegistryError::UnknownPacket`]: it means a packet was resolved twice or
//! a stale id was used, both of which would otherwise silently corrupt the
//! statistics.

use crate::{flow::FlowTuple, time::VirtualTime};
use std::{collections::HashMap, fmt};
use thiserror::Error;
use tracing::warn;

/// # Packet Identifier
///
/// During the lifetime of the packet, this identifier uniquely identifies
/// the packet. Identifiers are never reused within a [`PacketRegistry`].
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(u64);

/// What the registry knows about a packet in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    pub id: PacketId,
    pub tuple: FlowTuple,
    pub size: u32,
    pub send_time: VirtualTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown packet {id}: never sent or already resolved")]
    UnknownPacket { id: PacketId },
}

/// Tracks packets between their emission and their resolution.
#[derive(Debug, Default)]
pub struct PacketRegistry {
    records: HashMap<PacketId, PacketRecord>,

    /// the last assigned ID
    ///
    /// ID 0 is never given
    last: PacketId,
}

impl PacketId {
    /// a _NULL_ packet identifier (i.e. doesn't have a packet to it)
    pub const NULL: Self = Self(0);

    #[must_use = "function does not modify the current value"]
    fn next(self) -> Self {
        let next = self.0.wrapping_add(1);
        debug_assert!(
            next != 0,
            "The only case this can be equal to 0 is if the generator overflowed. If this \
            happens it means we have generated `u64::MAX` unique packet identifiers."
        );
        Self(next)
    }

    pub fn into_u64(self) -> u64 {
        self.0
    }
}

impl Default for PacketId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl PacketRecord {
    /// Time spent in the network if the packet is resolved at `now`.
    pub fn delay_at(&self, now: VirtualTime) -> VirtualTime {
        now.saturating_sub(self.send_time)
    }
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: PacketId) -> Option<&PacketRecord> {
        self.records.get(&id)
    }

    /// Register a packet sent at `now` and return its fresh identifier.
    pub fn on_send(&mut self, tuple: FlowTuple, size: u32, now: VirtualTime) -> PacketId {
        self.last = self.last.next();
        let id = self.last;

        let previous = self.records.insert(
            id,
            PacketRecord {
                id,
                tuple,
                size,
                send_time: now,
            },
        );
        debug_assert!(previous.is_none(), "packet id {id} reused while live");

        id
    }

    /// Retire the record of a delivered packet.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownPacket`] if `id` was never sent or is already
    /// resolved.
    pub fn on_receive(&mut self, id: PacketId) -> Result<PacketRecord, RegistryError> {
        self.retire(id, "receive")
    }

    /// Retire the record of a packet the network reported as lost.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownPacket`] if `id` was never sent or is already
    /// resolved.
    pub fn on_drop(&mut self, id: PacketId) -> Result<PacketRecord, RegistryError> {
        self.retire(id, "drop")
    }

    fn retire(&mut self, id: PacketId, event: &'static str) -> Result<PacketRecord, RegistryError> {
        self.records.remove(&id).ok_or_else(|| {
            warn!(%id, event, "notification for an unknown packet");
            RegistryError::UnknownPacket { id }
        })
    }

    /// Remove and return every record older than `age`, i.e. with
    /// `now - send_time > age`, ordered by [`PacketId`].
    ///
    /// The caller must account the returned records as lost.
    #[must_use = "expired records must be reported as lost"]
    pub fn expire_older_than(&mut self, age: VirtualTime, now: VirtualTime) -> Vec<PacketRecord> {
        let mut expired = Vec::new();
        self.records.retain(|_, record| {
            if record.delay_at(now) > age {
                expired.push(*record);
                false
            } else {
                true
            }
        });
        expired.sort_by_key(|record| record.id);
        expired
    }

    /// Remove and return every live record, ordered by [`PacketId`].
    ///
    /// Unlike `expire_older_than(ZERO, now)` this also returns packets
    /// sent at the current instant.
    #[must_use = "drained records must be reported as lost"]
    pub fn drain(&mut self) -> Vec<PacketRecord> {
        let mut drained: Vec<_> = self.records.drain().map(|(_, record)| record).collect();
        drained.sort_by_key(|record| record.id);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Protocol;
    use std::net::Ipv4Addr;

    fn tuple() -> FlowTuple {
        FlowTuple::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            49153,
            9,
            Protocol::Udp,
        )
    }

    #[test]
    fn packet_id_null() {
        let null = PacketId::NULL;

        assert_eq!(null, PacketId(0));
        assert_eq!(null.to_string(), "0x0000000000000000");
        assert_eq!(format!("{null:?}"), "PacketId(0)");
    }

    #[test]
    fn ids_are_monotonic_and_start_at_one() {
        let mut registry = PacketRegistry::new();
        let ids: Vec<_> = (0..3)
            .map(|_| registry.on_send(tuple(), 100, VirtualTime::ZERO).into_u64())
            .collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn ids_are_not_reused_after_resolution() {
        let mut registry = PacketRegistry::new();
        let first = registry.on_send(tuple(), 100, VirtualTime::ZERO);
        registry.on_receive(first).unwrap();
        let second = registry.on_send(tuple(), 100, VirtualTime::ZERO);
        assert_ne!(first, second);
    }

    #[test]
    fn send_then_receive_same_instant_has_zero_delay() {
        let mut registry = PacketRegistry::new();
        let now = VirtualTime::from_secs(4);
        let id = registry.on_send(tuple(), 512, now);

        let record = registry.on_receive(id).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.size, 512);
        assert_eq!(record.tuple, tuple());
        assert_eq!(record.delay_at(now), VirtualTime::ZERO);
        assert!(registry.is_empty());
    }

    #[test]
    fn delay_is_receive_minus_send() {
        let mut registry = PacketRegistry::new();
        let id = registry.on_send(tuple(), 512, VirtualTime::from_millis(100));
        let record = registry.on_receive(id).unwrap();
        assert_eq!(
            record.delay_at(VirtualTime::from_millis(142)),
            VirtualTime::from_millis(42)
        );
    }

    #[test]
    fn double_receive_is_reported() {
        let mut registry = PacketRegistry::new();
        let id = registry.on_send(tuple(), 100, VirtualTime::ZERO);

        assert!(registry.on_receive(id).is_ok());
        assert_eq!(
            registry.on_receive(id),
            Err(RegistryError::UnknownPacket { id })
        );
    }

    #[test]
    fn double_drop_is_reported() {
        let mut registry = PacketRegistry::new();
        let id = registry.on_send(tuple(), 100, VirtualTime::ZERO);

        assert!(registry.on_drop(id).is_ok());
        assert_eq!(registry.on_drop(id), Err(RegistryError::UnknownPacket { id }));
        assert_eq!(registry.on_receive(id), Err(RegistryError::UnknownPacket { id }));
    }

    #[test]
    fn never_sent_is_reported() {
        let mut registry = PacketRegistry::new();
        assert_eq!(
            registry.on_receive(PacketId(42)),
            Err(RegistryError::UnknownPacket { id: PacketId(42) })
        );
    }

    #[test]
    fn expire_uses_strict_age() {
        let mut registry = PacketRegistry::new();
        let old = registry.on_send(tuple(), 100, VirtualTime::from_secs(1));
        let borderline = registry.on_send(tuple(), 100, VirtualTime::from_secs(2));
        let fresh = registry.on_send(tuple(), 100, VirtualTime::from_secs(3));

        let expired =
            registry.expire_older_than(VirtualTime::from_secs(1), VirtualTime::from_secs(3));
        assert_eq!(expired.iter().map(|r| r.id).collect::<Vec<_>>(), [old]);

        assert!(registry.get(borderline).is_some());
        assert!(registry.get(fresh).is_some());
        assert_eq!(registry.on_receive(old), Err(RegistryError::UnknownPacket { id: old }));
    }

    #[test]
    fn drain_returns_everything_in_id_order() {
        let mut registry = PacketRegistry::new();
        let ids: Vec<_> = (0..5)
            .map(|i| registry.on_send(tuple(), 10, VirtualTime::from_secs(5 - i)))
            .collect();

        let drained = registry.drain();
        assert_eq!(drained.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
        assert!(registry.is_empty());
    }

    #[test]
    fn error_display() {
        let err = RegistryError::UnknownPacket { id: PacketId(255) };
        assert_eq!(
            err.to_string(),
            "Unknown packet 0x00000000000000ff: never sent or already resolved"
        );
    }
}
