use crate::measure::{Bandwidth, Latency, PacketLoss};
use flowsim_core::VirtualTime;
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng as _;

/// A point-to-point link between the sources of an experiment and their
/// sinks.
///
/// This is the smallest model that makes the measurement engine observe
/// something: a fixed [`Latency`], a serialisation delay from the
/// [`Bandwidth`] and a [`PacketLoss`] policy. There is no queueing, no
/// contention and no routing.
///
/// All random decisions come from one [`ChaChaRng`], so a run is fully
/// reproducible for a given seed (see [`Link::set_seed`]).
///
/// ```
/// use flowsim::{link::{Link, Transmission}, measure::{Bandwidth, Latency, PacketLoss}};
/// use flowsim_core::VirtualTime;
///
/// let loss = PacketLoss::list([1]);
/// let mut link = Link::new(Latency::from_millis(2), Bandwidth::from_mbps(8), loss);
///
/// let after = VirtualTime::from_millis(3);
/// assert_eq!(link.transmit(1_000), Transmission::Delivered { after });
/// assert_eq!(link.transmit(1_000), Transmission::Dropped);
/// assert_eq!(link.transmitted(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Link {
    latency: Latency,
    bandwidth: Bandwidth,
    packet_loss: PacketLoss,

    /// number of packets handed to the link so far, the next packet's
    /// sequence number
    transmitted: u64,

    rng: ChaChaRng,
}

/// Fate of a packet handed to a [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    /// The packet reaches the other end `after` this long.
    Delivered { after: VirtualTime },
    /// The packet is lost.
    Dropped,
}

impl Default for Link {
    fn default() -> Self {
        Self::new(Latency::default(), Bandwidth::default(), PacketLoss::default())
    }
}

impl Link {
    pub fn new(latency: Latency, bandwidth: Bandwidth, packet_loss: PacketLoss) -> Self {
        Self {
            latency,
            bandwidth,
            packet_loss,
            transmitted: 0,
            rng: ChaChaRng::seed_from_u64(crate::defaults::DEFAULT_SEED),
        }
    }

    /// Re-seed the loss generator.
    ///
    /// Two links with the same configuration and seed drop exactly the same
    /// packets.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = ChaChaRng::seed_from_u64(seed);
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn packet_loss(&self) -> &PacketLoss {
        &self.packet_loss
    }

    /// Number of packets handed to the link so far.
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    /// Hand a packet of `size` bytes to the link.
    pub fn transmit(&mut self, size: u32) -> Transmission {
        let sequence = self.transmitted;
        self.transmitted += 1;

        if self.packet_loss.should_drop(sequence, &mut self.rng) {
            Transmission::Dropped
        } else {
            let after = self.latency.into_time() + self.bandwidth.transmission_time(size);
            Transmission::Delivered { after }
        }
    }
}
