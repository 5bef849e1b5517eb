//! Experiment configuration.
//!
//! An [`ExperimentConfig`] is built with its setters or parsed from a small
//! `key = value` text format, one setting per line, `#` starting a comment:
//!
//! ```text
//! stop_time = 10s
//! latency = 2ms
//! bandwidth = 5mbps
//! packet_loss = 1%
//! seed = 42
//! sample_interval = 100ms
//! ```
//!
//! Values use the same notation as the `FromStr` implementations of
//! [`VirtualTime`], [`Latency`], [`Bandwidth`] and [`PacketLoss`]. Unset
//! keys keep their [default](crate::defaults) value.

use crate::{
    defaults,
    measure::{Bandwidth, Latency, PacketLoss},
};
use anyhow::{Context as _, anyhow, bail, ensure};
use flowsim_core::VirtualTime;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// The experiment stops at this virtual time.
    pub stop_time: VirtualTime,
    pub latency: Latency,
    pub bandwidth: Bandwidth,
    pub packet_loss: PacketLoss,
    /// Seed of the loss generator.
    pub seed: u64,
    /// Sample every flow's throughput at this interval. Disabled if `None`.
    pub sample_interval: Option<VirtualTime>,
    /// Periodically account packets in flight for longer than this as
    /// lost. Disabled if `None`: unresolved packets are then only swept at
    /// the end of the run.
    pub expire_after: Option<VirtualTime>,
    /// Window the throughput is computed over. Defaults to the time
    /// between the first source's start and the stop time.
    pub observation_window: Option<VirtualTime>,
    /// Keep every delivery, for per-packet reports.
    pub record_deliveries: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            stop_time: defaults::DEFAULT_STOP_TIME,
            latency: defaults::DEFAULT_LATENCY,
            bandwidth: defaults::DEFAULT_BANDWIDTH,
            packet_loss: PacketLoss::None,
            seed: defaults::DEFAULT_SEED,
            sample_interval: None,
            expire_after: None,
            observation_window: None,
            record_deliveries: false,
        }
    }
}

impl ExperimentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stop_time(mut self, stop_time: VirtualTime) -> Self {
        self.stop_time = stop_time;
        self
    }

    pub fn set_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_bandwidth(mut self, bandwidth: Bandwidth) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn set_packet_loss(mut self, packet_loss: PacketLoss) -> Self {
        self.packet_loss = packet_loss;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn set_sample_interval(mut self, interval: VirtualTime) -> Self {
        self.sample_interval = Some(interval);
        self
    }

    /// Sample at [`DEFAULT_SAMPLE_INTERVAL`] unless an interval is already
    /// set.
    ///
    /// [`DEFAULT_SAMPLE_INTERVAL`]: defaults::DEFAULT_SAMPLE_INTERVAL
    pub fn enable_sampling(mut self) -> Self {
        self.sample_interval.get_or_insert(defaults::DEFAULT_SAMPLE_INTERVAL);
        self
    }

    pub fn set_expire_after(mut self, age: VirtualTime) -> Self {
        self.expire_after = Some(age);
        self
    }

    pub fn set_observation_window(mut self, window: VirtualTime) -> Self {
        self.observation_window = Some(window);
        self
    }

    pub fn set_record_deliveries(mut self, enabled: bool) -> Self {
        self.record_deliveries = enabled;
        self
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "stop_time" => self.stop_time = value.parse()?,
            "latency" => self.latency = value.parse()?,
            "bandwidth" => self.bandwidth = value.parse()?,
            "packet_loss" => self.packet_loss = value.parse()?,
            "seed" => self.seed = value.parse()?,
            "sample_interval" => self.sample_interval = Some(parse_interval(value)?),
            "expire_after" => self.expire_after = Some(parse_interval(value)?),
            "observation_window" => self.observation_window = Some(value.parse()?),
            "record_deliveries" => self.record_deliveries = value.parse()?,
            _ => bail!("Unknown setting `{key}'"),
        }
        Ok(())
    }
}

fn parse_interval(value: &str) -> anyhow::Result<VirtualTime> {
    let interval: VirtualTime = value.parse()?;
    ensure!(!interval.is_zero(), "The interval cannot be zero");
    Ok(interval)
}

impl FromStr for ExperimentConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::default();

        for (index, line) in s.lines().enumerate() {
            let line = line.split_once('#').map_or(line, |(content, _)| content).trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("Expecting `key = value'"))
                .with_context(|| format!("line {}", index + 1))?;
            config
                .set(key.trim(), value.trim())
                .with_context(|| format!("line {}: invalid `{}'", index + 1, key.trim()))?;
        }

        Ok(config)
    }
}

impl fmt::Display for ExperimentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stop_time = {}", self.stop_time)?;
        writeln!(f, "latency = {}", self.latency)?;
        writeln!(f, "bandwidth = {}", self.bandwidth)?;
        writeln!(f, "packet_loss = {}", self.packet_loss)?;
        writeln!(f, "seed = {}", self.seed)?;
        if let Some(interval) = self.sample_interval {
            writeln!(f, "sample_interval = {interval}")?;
        }
        if let Some(age) = self.expire_after {
            writeln!(f, "expire_after = {age}")?;
        }
        if let Some(window) = self.observation_window {
            writeln!(f, "observation_window = {window}")?;
        }
        writeln!(f, "record_deliveries = {}", self.record_deliveries)
    }
}
