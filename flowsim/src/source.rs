//! Traffic sources of an [`Experiment`].
//!
//! [`Experiment`]: crate::experiment::Experiment

use anyhow::{Context as _, Result};
use flowsim_core::{FlowTuple, Protocol, TraceEvent, TrafficPattern, VirtualTime, parse_trace};
use std::{net::IpAddr, path::Path};

/// One application sending on one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub(crate) tuple: FlowTuple,
    pub(crate) pattern: TrafficPattern,
    pub(crate) start: VirtualTime,
    pub(crate) stop: Option<VirtualTime>,
}

impl Source {
    /// A source that starts at time zero and runs until its traffic
    /// pattern is exhausted.
    pub fn new(tuple: FlowTuple, pattern: TrafficPattern) -> Self {
        Self {
            tuple,
            pattern,
            start: VirtualTime::ZERO,
            stop: None,
        }
    }

    /// A UDP source using the default ports.
    ///
    /// ```
    /// # use flowsim::source::Source;
    /// # use flowsim_core::TrafficPattern;
    /// # use std::net::Ipv4Addr;
    /// let (src, dst) = (Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2));
    /// let source = Source::udp(src, dst, TrafficPattern::Trace(vec![]));
    /// assert_eq!(source.tuple().to_string(), "10.1.1.1:49153 -> 10.1.1.2:9 (udp)");
    /// ```
    pub fn udp(src: impl Into<IpAddr>, dst: impl Into<IpAddr>, pattern: TrafficPattern) -> Self {
        let tuple = FlowTuple::new(
            src,
            dst,
            crate::defaults::DEFAULT_SOURCE_PORT,
            crate::defaults::DEFAULT_DESTINATION_PORT,
            Protocol::Udp,
        );
        Self::new(tuple, pattern)
    }

    /// Start the application at `start`.
    pub fn set_start(mut self, start: VirtualTime) -> Self {
        self.start = start;
        self
    }

    /// Stop the application at `stop`, even if its pattern has more to
    /// send.
    pub fn set_stop(mut self, stop: VirtualTime) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn tuple(&self) -> &FlowTuple {
        &self.tuple
    }

    pub fn pattern(&self) -> &TrafficPattern {
        &self.pattern
    }

    pub fn start(&self) -> VirtualTime {
        self.start
    }

    pub fn stop(&self) -> Option<VirtualTime> {
        self.stop
    }
}

/// Read and parse a trace file.
pub fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TraceEvent>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file {}", path.display()))?;
    parse_trace(&content).with_context(|| format!("Failed to parse trace file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write as _, net::Ipv4Addr};

    #[test]
    fn builder() {
        let pattern = TrafficPattern::Trace(vec![]);
        let source = Source::udp(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, pattern)
            .set_start(VirtualTime::from_secs(1))
            .set_stop(VirtualTime::from_secs(9));

        assert_eq!(source.start(), VirtualTime::from_secs(1));
        assert_eq!(source.stop(), Some(VirtualTime::from_secs(9)));
        assert_eq!(source.tuple().protocol, Protocol::Udp);
        assert_eq!(source.tuple().dst_port, crate::defaults::DEFAULT_DESTINATION_PORT);
    }

    #[test]
    fn load_trace_file() {
        let path = std::env::temp_dir().join(format!("flowsim-trace-{}.txt", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# time, size").unwrap();
        writeln!(file, "0.0, 100").unwrap();
        writeln!(file, "0.5, 200").unwrap();
        drop(file);

        let trace = load_trace(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            trace,
            vec![
                TraceEvent::new(VirtualTime::ZERO, 100),
                TraceEvent::new(VirtualTime::from_millis(500), 200),
            ]
        );
    }

    #[test]
    fn load_trace_errors_name_the_file() {
        let err = load_trace("/this/trace/does/not/exist.txt").unwrap_err();
        assert!(err.to_string().contains("/this/trace/does/not/exist.txt"));
    }
}
