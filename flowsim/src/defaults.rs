use crate::measure::{Bandwidth, Latency};
use flowsim_core::VirtualTime;

/// Default [`Latency`] of a [`Link`].
///
/// ```
/// # use flowsim::defaults::*;
/// assert_eq!(DEFAULT_LATENCY.to_string(), "5ms");
/// ```
///
/// [`Link`]: crate::link::Link
pub const DEFAULT_LATENCY: Latency = Latency::from_millis(5);

/// Default [`Bandwidth`] of a [`Link`].
///
/// ```
/// # use flowsim::defaults::*;
/// assert_eq!(DEFAULT_BANDWIDTH.to_string(), "100mbps");
/// ```
///
/// [`Link`]: crate::link::Link
pub const DEFAULT_BANDWIDTH: Bandwidth = Bandwidth::from_mbps(100);

/// Seed of the random number generator deciding packet losses.
pub const DEFAULT_SEED: u64 = 0;

/// How long an [`Experiment`] runs when no stop time is configured.
///
/// ```
/// # use flowsim::defaults::*;
/// assert_eq!(DEFAULT_STOP_TIME.to_string(), "10s");
/// ```
///
/// [`Experiment`]: crate::experiment::Experiment
pub const DEFAULT_STOP_TIME: VirtualTime = VirtualTime::from_secs(10);

/// Interval between two throughput samples when sampling is enabled
/// without an explicit interval.
pub const DEFAULT_SAMPLE_INTERVAL: VirtualTime = VirtualTime::from_millis(100);

/// Source port of a [`Source::udp`].
///
/// [`Source::udp`]: crate::source::Source::udp
pub const DEFAULT_SOURCE_PORT: u16 = 49153;

/// Destination port of a [`Source::udp`] (discard).
///
/// [`Source::udp`]: crate::source::Source::udp
pub const DEFAULT_DESTINATION_PORT: u16 = 9;
