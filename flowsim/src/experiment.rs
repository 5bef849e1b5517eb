//! Running a measurement experiment end to end.
//!
//! An [`Experiment`] wires the measurement engine together: every
//! [`Source`] is replayed by a [`TraceReplay`] whose sink hands packets to
//! the [`FlowMonitor`] and to a shared [`Link`]; the link's verdict is fed
//! back to the monitor as a delivery (after the link delay) or as a drop.
//!
//! ```
//! use flowsim::{experiment::Experiment, source::Source, ExperimentConfig};
//! use flowsim_core::{parse_trace, TrafficPattern, VirtualTime};
//! use std::net::Ipv4Addr;
//!
//! let trace = parse_trace("0 100\n0.5 200\n1 300").unwrap();
//! let (src, dst) = (Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2));
//! let source = Source::udp(src, dst, TrafficPattern::Trace(trace));
//!
//! let config = ExperimentConfig::new().set_stop_time(VirtualTime::from_secs(2));
//! let mut experiment = Experiment::new(config);
//! experiment.add_source(source).unwrap();
//! let report = experiment.run().unwrap();
//!
//! assert_eq!(report.flows.tx_packets(), 3);
//! assert_eq!(report.flows.rx_packets(), 3);
//! ```

use crate::{
    config::ExperimentConfig,
    link::{Link, Transmission},
    sampler::{Sample, Sampler},
    source::Source,
};
use flowsim_core::{
    EventHandle, FlowMetrics, FlowMonitor, FlowRecord, FlowReport, FlowTuple, ReplayError,
    Scheduler, SchedulerError, SchedulerStats, TraceReplay, VirtualTime,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Source {index} ({tuple}) cannot be replayed")]
    InvalidSource {
        index: usize,
        tuple: FlowTuple,
        #[source]
        error: ReplayError,
    },
    #[error("The {name} cannot be zero")]
    ZeroInterval { name: &'static str },
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),
}

/// Everything the scheduled callbacks of an experiment share.
struct World {
    monitor: FlowMonitor,
    link: Link,
    sampler: Option<Sampler>,
}

#[derive(Debug)]
pub struct Experiment {
    config: ExperimentConfig,
    sources: Vec<Source>,
}

/// Outcome of [`Experiment::run`].
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// Final state of every flow.
    pub flows: FlowReport,
    /// Window the throughput of [`metrics`](Self::metrics) is computed
    /// over.
    pub window: VirtualTime,
    /// Throughput samples, empty unless sampling was enabled.
    pub samples: Vec<Sample>,
    pub scheduler: SchedulerStats,
}

impl World {
    fn send(&mut self, scheduler: &mut Scheduler<World>, tuple: FlowTuple, size: u32) {
        let now = scheduler.now();
        let id = self.monitor.on_send(tuple, size, now);

        match self.link.transmit(size) {
            Transmission::Dropped => {
                trace!(%id, %now, "packet dropped by the link");
                if let Err(error) = self.monitor.notify_dropped(id) {
                    warn!(%error, "failed to report a dropped packet");
                }
            }
            Transmission::Delivered { after } => {
                let delivered =
                    scheduler.schedule_after(after, move |scheduler, world: &mut World| {
                        if let Err(error) = world.monitor.notify_received(id, scheduler.now()) {
                            // already swept as expired
                            debug!(%error, "late delivery ignored");
                        }
                    });
                if let Err(error) = delivered {
                    warn!(%error, %id, "failed to schedule a delivery");
                }
            }
        }
    }
}

/// Run `task` every `interval`, the first time `interval` from now.
fn every<F>(
    scheduler: &mut Scheduler<World>,
    interval: VirtualTime,
    task: F,
) -> Result<EventHandle, SchedulerError>
where
    F: Fn(VirtualTime, &mut World) + 'static,
{
    scheduler.schedule_after(interval, move |scheduler, world: &mut World| {
        task(scheduler.now(), world);
        if let Err(error) = every(scheduler, interval, task) {
            warn!(%error, "failed to reschedule a periodic task");
        }
    })
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Add a traffic source.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::InvalidSource`] if the source's traffic pattern
    /// cannot be replayed (see [`TrafficPattern::validate`]).
    ///
    /// [`TrafficPattern::validate`]: flowsim_core::TrafficPattern::validate
    pub fn add_source(&mut self, source: Source) -> Result<&mut Self, ExperimentError> {
        if let Err(error) = source.pattern.validate() {
            return Err(ExperimentError::InvalidSource {
                index: self.sources.len(),
                tuple: source.tuple,
                error,
            });
        }

        self.sources.push(source);
        Ok(self)
    }

    /// Run the experiment until the configured stop time.
    ///
    /// Packets still in flight at the stop time are counted as lost and
    /// their flows reported incomplete.
    pub fn run(self) -> Result<ExperimentReport, ExperimentError> {
        let Self { config, sources } = self;

        if config.sample_interval.is_some_and(VirtualTime::is_zero) {
            return Err(ExperimentError::ZeroInterval {
                name: "sampling interval",
            });
        }
        if config.expire_after.is_some_and(VirtualTime::is_zero) {
            return Err(ExperimentError::ZeroInterval { name: "expiry age" });
        }

        let mut link = Link::new(config.latency, config.bandwidth, config.packet_loss.clone());
        link.set_seed(config.seed);
        let mut world = World {
            monitor: FlowMonitor::new().record_deliveries(config.record_deliveries),
            link,
            sampler: config.sample_interval.map(Sampler::new),
        };
        let mut scheduler = Scheduler::<World>::new();

        let first_start = sources.iter().map(|source| source.start).min();
        for source in sources {
            schedule_source(&mut scheduler, source)?;
        }

        if let Some(interval) = config.sample_interval {
            every(&mut scheduler, interval, |now, world| {
                let flows = world.monitor.snapshot();
                if let Some(sampler) = world.sampler.as_mut() {
                    sampler.sample(now, &flows);
                }
            })?;
        }
        if let Some(age) = config.expire_after {
            every(&mut scheduler, age, move |now, world| {
                world.monitor.expire_older_than(age, now);
            })?;
        }

        info!(
            stop_time = %config.stop_time,
            link.latency = %config.latency,
            link.bandwidth = %config.bandwidth,
            link.packet_loss = %config.packet_loss,
            "experiment started"
        );
        scheduler.run_until(&mut world, config.stop_time)?;

        let World { monitor, sampler, .. } = world;
        let flows = monitor.finish(scheduler.now());
        let window = config.observation_window.unwrap_or_else(|| {
            config
                .stop_time
                .saturating_sub(first_start.unwrap_or(VirtualTime::ZERO))
        });

        info!(
            flows = flows.flows.len(),
            tx_packets = flows.tx_packets(),
            rx_packets = flows.rx_packets(),
            lost_packets = flows.lost_packets(),
            unresolved = flows.unresolved,
            "experiment finished"
        );

        Ok(ExperimentReport {
            flows,
            window,
            samples: sampler.map(Sampler::into_samples).unwrap_or_default(),
            scheduler: scheduler.stats(),
        })
    }
}

fn schedule_source(
    scheduler: &mut Scheduler<World>,
    source: Source,
) -> Result<(), SchedulerError> {
    let Source {
        tuple,
        pattern,
        start,
        stop,
    } = source;
    let replay = TraceReplay::new(move |scheduler: &mut Scheduler<World>, world: &mut World, size| {
        world.send(scheduler, tuple, size)
    });

    let starting = replay.clone();
    scheduler.schedule_at(start, move |scheduler, _| {
        if let Err(error) = starting.start_pattern(scheduler, pattern) {
            warn!(%error, %tuple, "failed to start the source");
        }
    })?;

    if let Some(stop) = stop {
        scheduler.schedule_at(stop, move |scheduler, _| replay.stop(scheduler))?;
    }
    Ok(())
}

impl ExperimentReport {
    /// Every flow with its derived metrics over [`window`](Self::window).
    pub fn metrics(&self) -> impl Iterator<Item = (&FlowRecord, FlowMetrics)> + '_ {
        self.flows
            .flows
            .iter()
            .map(|flow| (flow, flow.metrics(self.window)))
    }
}
