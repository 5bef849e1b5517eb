//! Five-tuple flow identification.
//!
//! A [`FlowTuple`] is the `(source address, destination address, source
//! port, destination port, protocol)` key of a flow. The [`FlowClassifier`]
//! maps every distinct tuple to a stable [`FlowId`], allocating ids lazily
//! the first time a tuple is seen.
//!
//! Each direction of a bidirectional exchange is its own flow. Callers
//! that want both directions merged must normalise the tuple themselves
//! (see [`FlowTuple::reversed`]).

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    net::IpAddr,
};

/// Transport protocol of a flow.
///
/// Two values are the same protocol if they have the same IANA
/// [`number`](Self::number): `Other(17)` is `Udp`.
///
/// ```
/// # use flowsim_core::Protocol;
/// assert_eq!(Protocol::from(17u8), Protocol::Udp);
/// assert_eq!(Protocol::Other(17), Protocol::Udp);
/// assert_eq!(u8::from(Protocol::Tcp), 6);
/// assert_eq!(Protocol::from(132u8).to_string(), "132");
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Protocol {
    Icmp,
    Tcp,
    Udp,
    Other(u8),
}

/// The identifier of a flow.
///
/// Identifiers are allocated sequentially starting at `1`, in the order
/// the flows are first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowTuple {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

/// Maps [`FlowTuple`]s to [`FlowId`]s.
#[derive(Debug, Default)]
pub struct FlowClassifier {
    ids: HashMap<FlowTuple, FlowId>,

    /// the last assigned ID
    ///
    /// ID 0 is never handed out
    last: FlowId,
}

impl Protocol {
    pub const fn number(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Other(number) => number,
        }
    }
}

impl From<u8> for Protocol {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            other => Self::Other(other),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(value: Protocol) -> Self {
        value.number()
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.number() == other.number()
    }
}

impl Eq for Protocol {}

impl Hash for Protocol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number().hash(state);
    }
}

impl PartialOrd for Protocol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Protocol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number().cmp(&other.number())
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::from(self.number()) {
            Self::Icmp => f.write_str("icmp"),
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
            Self::Other(number) => fmt::Display::fmt(&number, f),
        }
    }
}

impl FlowId {
    pub(crate) const ZERO: Self = Self(0);

    #[must_use = "function does not modify the current value"]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// position of this flow in a dense, 0-based table
    pub(crate) fn index(self) -> usize {
        debug_assert!(self.0 != 0, "FlowId 0 is never allocated");
        (self.0 - 1) as usize
    }

    pub fn into_u32(self) -> u32 {
        self.0
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FlowTuple {
    pub fn new(
        src_addr: impl Into<IpAddr>,
        dst_addr: impl Into<IpAddr>,
        src_port: u16,
        dst_port: u16,
        protocol: impl Into<Protocol>,
    ) -> Self {
        Self {
            src_addr: src_addr.into(),
            dst_addr: dst_addr.into(),
            src_port,
            dst_port,
            protocol: protocol.into(),
        }
    }

    /// The tuple of the opposite direction of the same conversation.
    ///
    /// ```
    /// # use flowsim_core::{FlowTuple, Protocol};
    /// # use std::net::Ipv4Addr;
    /// let (a, b) = (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
    /// let forward = FlowTuple::new(a, b, 49153, 9, Protocol::Udp);
    /// let backward = forward.reversed();
    /// assert_eq!(backward.src_port, 9);
    /// assert_eq!(backward.reversed(), forward);
    /// ```
    #[must_use = "function does not modify the current value"]
    pub fn reversed(&self) -> Self {
        Self {
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FlowTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            std::net::SocketAddr::new(self.src_addr, self.src_port),
            std::net::SocketAddr::new(self.dst_addr, self.dst_port),
            self.protocol,
        )
    }
}

impl FlowClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the [`FlowId`] of `tuple`, allocating a new one the first
    /// time the tuple is seen.
    pub fn classify(&mut self, tuple: &FlowTuple) -> FlowId {
        if let Some(id) = self.ids.get(tuple) {
            return *id;
        }

        self.last = self.last.next();
        self.ids.insert(*tuple, self.last);
        self.last
    }

    /// Returns the [`FlowId`] of `tuple` if it was already classified.
    pub fn get(&self, tuple: &FlowTuple) -> Option<FlowId> {
        self.ids.get(tuple).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
