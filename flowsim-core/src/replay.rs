//! Trace-driven traffic replay.
//!
//! A [`TraceReplay`] walks a recorded sequence of [`TraceEvent`]s and emits
//! one send per event through a caller-provided sink, driven by the
//! [`Scheduler`].
//!
//! Each event is scheduled relative to the firing of the previous one, not
//! to the trace's absolute timeline. When the scheduler fires an event late
//! the gap to the next send is still the recorded gap; the trace as a whole
//! may drift, individual gaps never do.
//!
//! ```
//! use flowsim_core::{parse_trace, ReplayState, Scheduler, TraceReplay, VirtualTime};
//!
//! type Sends = Vec<(VirtualTime, u32)>;
//!
//! let mut scheduler = Scheduler::<Sends>::new();
//! let mut sends = Sends::new();
//! scheduler.run_until(&mut sends, VirtualTime::from_secs(5)).unwrap();
//!
//! let replay = TraceReplay::new(|scheduler: &mut Scheduler<Sends>, sends: &mut Sends, size| {
//!     sends.push((scheduler.now(), size))
//! });
//! replay.start(&mut scheduler, parse_trace("0 100\n1 200\n3 150").unwrap()).unwrap();
//! scheduler.run(&mut sends).unwrap();
//!
//! assert_eq!(replay.state(), ReplayState::Finished);
//! assert_eq!(
//!     sends,
//!     vec![
//!         (VirtualTime::from_secs(5), 100),
//!         (VirtualTime::from_secs(6), 200),
//!         (VirtualTime::from_secs(8), 150),
//!     ]
//! );
//! ```

use crate::{
    scheduler::{EventHandle, Scheduler, SchedulerError},
    time::VirtualTime,
    trace::TraceEvent,
};
use std::{cell::RefCell, fmt, rc::Rc};
use thiserror::Error;
use tracing::{debug, warn};

/// Receives the size of every packet the replay emits.
pub type Sink<S> = Box<dyn FnMut(&mut Scheduler<S>, &mut S, u32)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Trace is not sorted: event {index} is earlier than the event before it")]
    UnsortedTrace { index: usize },
    #[error("An unbounded constant bit rate needs a non-zero interval")]
    ZeroInterval,
    #[error("Trace replay was already started")]
    AlreadyStarted,
    #[error("{0}")]
    Schedule(#[from] SchedulerError),
}

/// The kinds of traffic a source can generate, resolved once at setup.
///
/// Events are produced one at a time as the replay fires (see
/// [`TrafficPattern::event`]), so an unbounded pattern costs nothing up
/// front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficPattern {
    /// Replay a recorded trace.
    Trace(Vec<TraceEvent>),
    /// Packets of `size` bytes, one every `interval`, the first one
    /// immediately. Stops after `max_packets` if set, otherwise runs until
    /// the replay is stopped.
    ConstantBitRate {
        interval: VirtualTime,
        size: u32,
        max_packets: Option<u64>,
    },
}

/// Replays a trace through a sink.
///
/// This is a cheap handle: clones share the same replay, which lets the
/// sink capture a clone and [`stop`](Self::stop) the replay it belongs to.
pub struct TraceReplay<S> {
    inner: Rc<RefCell<Inner<S>>>,
}

struct Inner<S> {
    state: ReplayState,
    pattern: TrafficPattern,
    /// index of the event to emit on the next firing
    next: u64,
    pending: Option<EventHandle>,
    origin: Option<VirtualTime>,
    /// taken out while it is being called
    sink: Option<Sink<S>>,
    sent: u64,
}

impl TrafficPattern {
    /// A constant bit rate where `max_packets == 0` means no limit.
    ///
    /// ```
    /// # use flowsim_core::{TrafficPattern, VirtualTime};
    /// let interval = VirtualTime::from_millis(10);
    /// assert_eq!(
    ///     TrafficPattern::constant_bit_rate(interval, 512, 0),
    ///     TrafficPattern::ConstantBitRate { interval, size: 512, max_packets: None },
    /// );
    /// ```
    pub fn constant_bit_rate(interval: VirtualTime, size: u32, max_packets: u64) -> Self {
        Self::ConstantBitRate {
            interval,
            size,
            max_packets: (max_packets != 0).then_some(max_packets),
        }
    }

    /// The `index`th event of the pattern, `None` past its end.
    ///
    /// ```
    /// # use flowsim_core::{TrafficPattern, VirtualTime};
    /// let cbr = TrafficPattern::constant_bit_rate(VirtualTime::from_millis(10), 512, 3);
    /// let times: Vec<_> = (0..4)
    ///     .map(|i| cbr.event(i).map(|e| e.relative_time.as_nanos() / 1_000_000))
    ///     .collect();
    /// assert_eq!(times, [Some(0), Some(10), Some(20), None]);
    /// ```
    pub fn event(&self, index: u64) -> Option<TraceEvent> {
        match self {
            Self::Trace(events) => usize::try_from(index)
                .ok()
                .and_then(|index| events.get(index))
                .copied(),
            Self::ConstantBitRate {
                interval,
                size,
                max_packets,
            } => {
                if max_packets.is_some_and(|max| index >= max) {
                    return None;
                }
                let offset = VirtualTime::from_nanos(interval.as_nanos().saturating_mul(index));
                Some(TraceEvent::new(offset, *size))
            }
        }
    }

    /// Check the pattern can be replayed.
    ///
    /// # Errors
    ///
    /// * [`ReplayError::UnsortedTrace`] if a trace's relative times are not
    ///   non-decreasing;
    /// * [`ReplayError::ZeroInterval`] for an unbounded constant bit rate
    ///   that would send forever without virtual time moving.
    pub fn validate(&self) -> Result<(), ReplayError> {
        match self {
            Self::Trace(events) => match events
                .windows(2)
                .position(|pair| pair[1].relative_time < pair[0].relative_time)
            {
                Some(index) => Err(ReplayError::UnsortedTrace { index: index + 1 }),
                None => Ok(()),
            },
            Self::ConstantBitRate {
                interval,
                max_packets: None,
                ..
            } if interval.is_zero() => Err(ReplayError::ZeroInterval),
            Self::ConstantBitRate { .. } => Ok(()),
        }
    }
}

impl<S: 'static> TraceReplay<S> {
    pub fn new<F>(sink: F) -> Self
    where
        F: FnMut(&mut Scheduler<S>, &mut S, u32) + 'static,
    {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: ReplayState::Idle,
                pattern: TrafficPattern::Trace(Vec::new()),
                next: 0,
                pending: None,
                origin: None,
                sink: Some(Box::new(sink)),
                sent: 0,
            })),
        }
    }

    /// Align the trace's time zero with `origin` instead of the time
    /// [`start`](Self::start) is called.
    ///
    /// Starting after `origin` skips the waiting the trace has already
    /// "missed": the first event fires at `origin + relative_time`, or
    /// immediately if that is already past.
    pub fn with_origin(self, origin: VirtualTime) -> Self {
        self.inner.borrow_mut().origin = Some(origin);
        self
    }

    pub fn state(&self) -> ReplayState {
        self.inner.borrow().state
    }

    /// Number of packets emitted so far.
    pub fn sent(&self) -> u64 {
        self.inner.borrow().sent
    }

    /// Start replaying `trace`.
    ///
    /// An empty trace finishes immediately without sending anything.
    ///
    /// # Errors
    ///
    /// * [`ReplayError::UnsortedTrace`] if the relative times are not
    ///   non-decreasing;
    /// * [`ReplayError::AlreadyStarted`] if the replay is not idle.
    pub fn start(
        &self,
        scheduler: &mut Scheduler<S>,
        trace: Vec<TraceEvent>,
    ) -> Result<(), ReplayError> {
        self.start_pattern(scheduler, TrafficPattern::Trace(trace))
    }

    /// Start replaying any [`TrafficPattern`].
    ///
    /// # Errors
    ///
    /// As [`TrafficPattern::validate`], and
    /// [`ReplayError::AlreadyStarted`] if the replay is not idle.
    pub fn start_pattern(
        &self,
        scheduler: &mut Scheduler<S>,
        pattern: TrafficPattern,
    ) -> Result<(), ReplayError> {
        let now = scheduler.now();
        let delay = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ReplayState::Idle {
                return Err(ReplayError::AlreadyStarted);
            }
            pattern.validate()?;

            let Some(first) = pattern.event(0) else {
                inner.state = ReplayState::Finished;
                debug!(%now, "empty trace, replay finished");
                return Ok(());
            };

            let origin = inner.origin.unwrap_or(now);
            let delay = (origin + first.relative_time)
                .delta_since(now)
                .clamp_non_negative();

            debug!(%now, %origin, "trace replay started");
            inner.pattern = pattern;
            inner.next = 0;
            inner.state = ReplayState::Running;
            delay
        };

        let handle = schedule(&self.inner, scheduler, delay)?;
        self.inner.borrow_mut().pending = Some(handle);
        Ok(())
    }

    /// Cancel the pending send, if any, and finish the replay. Idempotent.
    pub fn stop(&self, scheduler: &mut Scheduler<S>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(handle) = inner.pending.take() {
            scheduler.cancel(handle);
        }
        if inner.state != ReplayState::Finished {
            inner.state = ReplayState::Finished;
            debug!(now = %scheduler.now(), sent = inner.sent, "trace replay stopped");
        }
    }
}

fn schedule<S: 'static>(
    inner: &Rc<RefCell<Inner<S>>>,
    scheduler: &mut Scheduler<S>,
    delay: VirtualTime,
) -> Result<EventHandle, SchedulerError> {
    let inner = Rc::clone(inner);
    scheduler.schedule_after(delay, move |scheduler, state| fire(&inner, scheduler, state))
}

fn fire<S: 'static>(inner: &Rc<RefCell<Inner<S>>>, scheduler: &mut Scheduler<S>, state: &mut S) {
    let (current, sink) = {
        let mut me = inner.borrow_mut();
        me.pending = None;
        if me.state != ReplayState::Running {
            return;
        }
        let Some(current) = me.pattern.event(me.next) else {
            me.state = ReplayState::Finished;
            return;
        };
        me.sent += 1;
        (current, me.sink.take())
    };

    // the sink runs without the replay borrowed so it may stop it
    if let Some(mut sink) = sink {
        sink(scheduler, state, current.size);
        inner.borrow_mut().sink = Some(sink);
    }

    let delay = {
        let mut me = inner.borrow_mut();
        if me.state != ReplayState::Running {
            return;
        }
        me.next += 1;
        let Some(next) = me.pattern.event(me.next) else {
            me.state = ReplayState::Finished;
            debug!(now = %scheduler.now(), sent = me.sent, "trace replay finished");
            return;
        };
        next.relative_time
            .delta_since(current.relative_time)
            .clamp_non_negative()
    };

    match schedule(inner, scheduler, delay) {
        Ok(handle) => inner.borrow_mut().pending = Some(handle),
        Err(error) => {
            warn!(%error, "failed to schedule the next trace event");
            inner.borrow_mut().state = ReplayState::Finished;
        }
    }
}

impl<S> Clone for TraceReplay<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for TraceReplay<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TraceReplay")
            .field("state", &inner.state)
            .field("next", &inner.next)
            .field("sent", &inner.sent)
            .finish_non_exhaustive()
    }
}
