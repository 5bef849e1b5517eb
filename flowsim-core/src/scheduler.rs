//! Virtual clock and discrete-event scheduler.
//!
//! The [`Scheduler`] is the only thing that advances [`VirtualTime`]. Every
//! other component of the crate runs inside a callback it invokes.
//!
//! Callbacks receive the scheduler itself (to read [`Scheduler::now`] and to
//! schedule follow-up events) and a mutable reference to a caller-owned
//! state `S`. Owning the measurement state in `S` rather than in globals
//! keeps consecutive runs in the same process independent.
//!
//! ```
//! use flowsim_core::{Scheduler, VirtualTime};
//!
//! let mut scheduler = Scheduler::<Vec<VirtualTime>>::new();
//! scheduler
//!     .schedule_after(VirtualTime::from_millis(10), |scheduler, fired| {
//!         fired.push(scheduler.now())
//!     })
//!     .unwrap();
//!
//! let mut fired = Vec::new();
//! scheduler.run_until(&mut fired, VirtualTime::from_secs(1)).unwrap();
//! assert_eq!(fired, vec![VirtualTime::from_millis(10)]);
//! assert_eq!(scheduler.now(), VirtualTime::from_secs(1));
//! ```

use crate::time::{TimeDelta, VirtualTime};
use core::cmp::Reverse;
use std::{
    collections::{BinaryHeap, HashMap},
    fmt,
};
use thiserror::Error;
use tracing::trace;

/// A callback scheduled to run at a given [`VirtualTime`].
pub type Callback<S> = Box<dyn FnOnce(&mut Scheduler<S>, &mut S)>;

/// Handle to a scheduled event, used to [`cancel`](Scheduler::cancel) it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle(u64);

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for events due at the same time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: VirtualTime,
    sequence: u64,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Negative delays are a programming error, they are never clamped.
    #[error("Cannot schedule an event with a negative delay ({delay})")]
    InvalidDelay { delay: TimeDelta },
    #[error("run_until cannot be called from within a scheduled callback")]
    Reentrant,
}

/// Counters describing the scheduler's activity so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub fired: u64,
    pub cancelled: u64,
}

pub struct Scheduler<S> {
    now: VirtualTime,

    /// next sequence number, doubles as the [`EventHandle`] value
    sequence: u64,

    /// keys of every event ever scheduled and not yet popped, including
    /// cancelled ones (their callback is gone from `callbacks`)
    queue: BinaryHeap<Reverse<EventKey>>,

    /// live callbacks. An event is pending iff its sequence is in here.
    callbacks: HashMap<u64, Callback<S>>,

    running: bool,

    stats: SchedulerStats,
}

impl<S> Scheduler<S> {
    pub fn new() -> Self {
        Self {
            now: VirtualTime::ZERO,
            sequence: 0,
            queue: BinaryHeap::new(),
            callbacks: HashMap::new(),
            running: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Current virtual time. Never decreases.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Number of events scheduled and neither fired nor cancelled.
    #[inline]
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }

    #[inline]
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.callbacks.contains_key(&handle.0)
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Schedule `callback` to run `delay` after [`now`](Self::now).
    ///
    /// The fire time is computed here, once: the event fires at
    /// `now + delay` whatever happens to the clock in between.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidDelay`] if `delay` is negative.
    pub fn schedule_after<D, F>(
        &mut self,
        delay: D,
        callback: F,
    ) -> Result<EventHandle, SchedulerError>
    where
        D: Into<TimeDelta>,
        F: FnOnce(&mut Scheduler<S>, &mut S) + 'static,
    {
        let delay = delay.into();
        let Some(delay) = delay.to_virtual_time() else {
            return Err(SchedulerError::InvalidDelay { delay });
        };
        Ok(self.insert(self.now + delay, Box::new(callback)))
    }

    /// Schedule `callback` at the absolute time `time`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidDelay`] if `time` is already in the past.
    pub fn schedule_at<F>(
        &mut self,
        time: VirtualTime,
        callback: F,
    ) -> Result<EventHandle, SchedulerError>
    where
        F: FnOnce(&mut Scheduler<S>, &mut S) + 'static,
    {
        if time < self.now {
            return Err(SchedulerError::InvalidDelay {
                delay: time.delta_since(self.now),
            });
        }
        Ok(self.insert(time, Box::new(callback)))
    }

    fn insert(&mut self, time: VirtualTime, callback: Callback<S>) -> EventHandle {
        let sequence = self.sequence;
        self.sequence += 1;

        self.queue.push(Reverse(EventKey { time, sequence }));
        self.callbacks.insert(sequence, callback);
        self.stats.scheduled += 1;

        EventHandle(sequence)
    }

    /// Cancel a scheduled event.
    ///
    /// Returns `true` if the event was pending. Cancelling an event that
    /// already fired or was already cancelled is a no-op returning `false`.
    /// Once this returns the callback is guaranteed never to run.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        // the heap entry stays behind as a tombstone and is skipped on pop
        let cancelled = self.callbacks.remove(&handle.0).is_some();
        if cancelled {
            self.stats.cancelled += 1;
            trace!(event = handle.0, now = %self.now, "event cancelled");
        }
        cancelled
    }

    /// Fire time of the earliest pending event.
    pub fn next_event_time(&mut self) -> Option<VirtualTime> {
        self.discard_cancelled_head();
        self.queue.peek().map(|Reverse(key)| key.time)
    }

    fn discard_cancelled_head(&mut self) {
        while let Some(Reverse(key)) = self.queue.peek() {
            if self.callbacks.contains_key(&key.sequence) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Run every pending event due at or before `stop_time`, in time order.
    ///
    /// Events scheduled by callbacks during the run are eligible as long as
    /// they are due by `stop_time`. Once no eligible event remains the clock
    /// is moved forward to `stop_time`.
    ///
    /// Returns the number of callbacks invoked.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Reentrant`] if called from inside a callback.
    ///
    /// # Panics
    ///
    /// A panicking callback is not caught: a bug in the simulated logic
    /// aborts the run.
    pub fn run_until(
        &mut self,
        state: &mut S,
        stop_time: VirtualTime,
    ) -> Result<usize, SchedulerError> {
        let fired = self.drive(state, Some(stop_time))?;
        if stop_time > self.now {
            self.now = stop_time;
        }
        Ok(fired)
    }

    /// Run until there is no pending event left. The clock stays at the
    /// time of the last event fired.
    pub fn run(&mut self, state: &mut S) -> Result<usize, SchedulerError> {
        self.drive(state, None)
    }

    fn drive(
        &mut self,
        state: &mut S,
        stop_time: Option<VirtualTime>,
    ) -> Result<usize, SchedulerError> {
        if self.running {
            return Err(SchedulerError::Reentrant);
        }
        self.running = true;

        let mut fired = 0;
        while let Some(&Reverse(key)) = self.queue.peek() {
            if stop_time.is_some_and(|stop| key.time > stop) {
                break;
            }
            self.queue.pop();

            let Some(callback) = self.callbacks.remove(&key.sequence) else {
                continue;
            };

            debug_assert!(key.time >= self.now, "virtual time must never go backward");
            self.now = key.time;
            self.stats.fired += 1;
            trace!(event = key.sequence, now = %self.now, "firing event");

            callback(self, state);
            fired += 1;
        }

        self.running = false;
        Ok(fired)
    }
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.callbacks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<(&'static str, VirtualTime)>;

    fn push(label: &'static str) -> impl FnOnce(&mut Scheduler<Log>, &mut Log) + 'static {
        move |scheduler: &mut Scheduler<Log>, log: &mut Log| log.push((label, scheduler.now()))
    }

    #[test]
    fn empty() {
        let mut scheduler = Scheduler::<Log>::new();
        let mut log = Log::new();

        assert_eq!(scheduler.now(), VirtualTime::ZERO);
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.next_event_time().is_none());
        assert_eq!(scheduler.run(&mut log).unwrap(), 0);
    }

    #[test]
    fn fires_in_time_order() {
        let mut scheduler = Scheduler::<Log>::new();
        scheduler.schedule_after(VirtualTime::from_millis(30), push("c")).unwrap();
        scheduler.schedule_after(VirtualTime::from_millis(10), push("a")).unwrap();
        scheduler.schedule_after(VirtualTime::from_millis(20), push("b")).unwrap();

        let mut log = Log::new();
        assert_eq!(scheduler.run(&mut log).unwrap(), 3);
        assert_eq!(
            log,
            vec![
                ("a", VirtualTime::from_millis(10)),
                ("b", VirtualTime::from_millis(20)),
                ("c", VirtualTime::from_millis(30)),
            ]
        );
    }

    #[test]
    fn ties_are_fifo() {
        let mut scheduler = Scheduler::<Log>::new();
        for label in ["first", "second", "third"] {
            scheduler.schedule_after(VirtualTime::from_secs(1), push(label)).unwrap();
        }

        let mut log = Log::new();
        scheduler.run(&mut log).unwrap();
        let labels: Vec<_> = log.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, ["first", "second", "third"]);
    }

    #[test]
    fn zero_delay_fires_at_now() {
        let mut scheduler = Scheduler::<Log>::new();
        let mut log = Log::new();
        scheduler.run_until(&mut log, VirtualTime::from_secs(3)).unwrap();

        scheduler.schedule_after(VirtualTime::ZERO, push("now")).unwrap();
        scheduler.run_until(&mut log, VirtualTime::from_secs(3)).unwrap();
        assert_eq!(log, vec![("now", VirtualTime::from_secs(3))]);
    }

    #[test]
    fn negative_delay_is_rejected() {
        let mut scheduler = Scheduler::<Log>::new();
        let err = scheduler
            .schedule_after(TimeDelta::from_millis(-1), push("never"))
            .unwrap_err();
        assert!(
            matches!(
                err,
                SchedulerError::InvalidDelay { delay } if delay == TimeDelta::from_millis(-1)
            ),
            "expected InvalidDelay, got {err:?}"
        );
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn schedule_at_in_the_past_is_rejected() {
        let mut scheduler = Scheduler::<Log>::new();
        let mut log = Log::new();
        scheduler.run_until(&mut log, VirtualTime::from_secs(2)).unwrap();

        assert!(scheduler.schedule_at(VirtualTime::from_secs(1), push("past")).is_err());
        assert!(scheduler.schedule_at(VirtualTime::from_secs(2), push("now")).is_ok());
    }

    #[test]
    fn cancel_before_fire() {
        let mut scheduler = Scheduler::<Log>::new();
        let handle = scheduler
            .schedule_after(VirtualTime::from_secs(1), push("cancelled"))
            .unwrap();
        scheduler.schedule_after(VirtualTime::from_secs(2), push("kept")).unwrap();

        assert!(scheduler.is_pending(handle));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.is_pending(handle));
        assert!(!scheduler.cancel(handle), "second cancel is a no-op");

        let mut log = Log::new();
        assert_eq!(scheduler.run(&mut log).unwrap(), 1);
        assert_eq!(log, vec![("kept", VirtualTime::from_secs(2))]);
        assert_eq!(scheduler.stats().cancelled, 1);
    }

    #[test]
    fn cancel_after_fire_is_a_no_op() {
        let mut scheduler = Scheduler::<Log>::new();
        let handle = scheduler
            .schedule_after(VirtualTime::from_secs(1), push("fired"))
            .unwrap();

        let mut log = Log::new();
        scheduler.run(&mut log).unwrap();
        assert!(!scheduler.cancel(handle));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn cancel_due_event_from_callback() {
        // both events are due at the same time, the first cancels the second
        let mut scheduler = Scheduler::<Log>::new();
        let victim = EventHandle(1);
        scheduler
            .schedule_after(
                VirtualTime::from_secs(1),
                move |scheduler: &mut Scheduler<Log>, log: &mut Log| {
                    assert!(scheduler.cancel(victim));
                    log.push(("killer", scheduler.now()));
                },
            )
            .unwrap();
        let handle = scheduler.schedule_after(VirtualTime::from_secs(1), push("victim")).unwrap();
        assert_eq!(handle, victim);

        let mut log = Log::new();
        scheduler.run(&mut log).unwrap();
        assert_eq!(log, vec![("killer", VirtualTime::from_secs(1))]);
    }

    #[test]
    fn run_until_respects_bound() {
        let mut scheduler = Scheduler::<Log>::new();
        scheduler.schedule_after(VirtualTime::from_secs(1), push("in")).unwrap();
        scheduler.schedule_after(VirtualTime::from_secs(5), push("out")).unwrap();

        let mut log = Log::new();
        assert_eq!(scheduler.run_until(&mut log, VirtualTime::from_secs(3)).unwrap(), 1);
        assert_eq!(scheduler.now(), VirtualTime::from_secs(3));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.next_event_time(), Some(VirtualTime::from_secs(5)));

        scheduler.run_until(&mut log, VirtualTime::from_secs(5)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1], ("out", VirtualTime::from_secs(5)));
    }

    #[test]
    fn callbacks_can_schedule_within_the_same_run() {
        fn tick(scheduler: &mut Scheduler<Log>, log: &mut Log) {
            log.push(("tick", scheduler.now()));
            scheduler.schedule_after(VirtualTime::from_secs(1), tick).unwrap();
        }

        let mut scheduler = Scheduler::<Log>::new();
        scheduler.schedule_after(VirtualTime::ZERO, tick).unwrap();

        let mut log = Log::new();
        scheduler.run_until(&mut log, VirtualTime::from_millis(3_500)).unwrap();
        let times: Vec<_> = log.iter().map(|(_, t)| t.as_nanos() / 1_000_000_000).collect();
        assert_eq!(times, [0, 1, 2, 3]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn fire_time_is_fixed_at_scheduling() {
        let mut scheduler = Scheduler::<Log>::new();
        let mut log = Log::new();
        scheduler.run_until(&mut log, VirtualTime::from_secs(1)).unwrap();
        scheduler.schedule_after(VirtualTime::from_secs(2), push("at-3s")).unwrap();

        // the clock moves before the event fires
        scheduler.run_until(&mut log, VirtualTime::from_secs(2)).unwrap();
        scheduler.run(&mut log).unwrap();
        assert_eq!(log, vec![("at-3s", VirtualTime::from_secs(3))]);
    }

    #[test]
    fn reentrant_run_is_rejected() {
        let mut scheduler = Scheduler::<Vec<bool>>::new();
        scheduler
            .schedule_after(
                VirtualTime::ZERO,
                |scheduler: &mut Scheduler<Vec<bool>>, results: &mut Vec<bool>| {
                    let mut inner = Vec::new();
                    let reentrant = scheduler.run_until(&mut inner, VirtualTime::from_secs(1));
                    results.push(matches!(reentrant, Err(SchedulerError::Reentrant)));
                },
            )
            .unwrap();

        let mut results = Vec::new();
        scheduler.run(&mut results).unwrap();
        assert_eq!(results, [true]);
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let mut a = Scheduler::<Log>::new();
        let b = Scheduler::<Log>::new();
        let handle_a = a.schedule_after(VirtualTime::from_secs(1), push("a")).unwrap();
        let mut log = Log::new();
        a.run(&mut log).unwrap();

        assert_eq!(b.now(), VirtualTime::ZERO);
        assert_eq!(b.pending(), 0);
        assert!(!b.is_pending(handle_a));
    }
}
