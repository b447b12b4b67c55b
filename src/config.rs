use crate::error::PipelineError;
use crate::stream::aggregator::{AggregatorConfig, DEFAULT_SUMMARY_INTERVAL, DEFAULT_WINDOW_SIZE};
use crate::stream::pipeline::DEFAULT_CAPACITY;
use crate::stream::reporter::ReportFormat;
use crate::stream::runner::{FullPolicy, RunnerConfig, DEFAULT_TICK_INTERVAL};
use crate::stream::thread_pinning::CoreAssignment;
use crate::stream::wait::WaitStrategy;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RUN_SECS: u64 = 5;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Ring slot count (default: 2048)
    pub buffer_capacity: usize,
    /// Log-returns kept for volatility (default: 100)
    pub window_size: usize,
    /// Summary every N ticks (default: 1000)
    pub summary_interval: u64,
    /// Producer pacing (default: 100µs)
    pub tick_interval: Duration,
    /// Wall-clock run time before shutdown (default: 5s)
    pub run_duration: Duration,
    pub wait_strategy: WaitStrategy,
    pub full_policy: FullPolicy,
    pub drain_on_shutdown: bool,
    pub pin_threads: bool,
    pub producer_core: usize,
    pub consumer_core: usize,
    pub report_format: ReportFormat,
    /// Prefix text summaries with the local time
    pub report_clock: bool,
    /// Fixed RNG seed for a reproducible random walk
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cores = CoreAssignment::default_assignment();
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            window_size: DEFAULT_WINDOW_SIZE,
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
            tick_interval: DEFAULT_TICK_INTERVAL,
            run_duration: Duration::from_secs(DEFAULT_RUN_SECS),
            wait_strategy: WaitStrategy::default(),
            full_policy: FullPolicy::default(),
            drain_on_shutdown: false,
            pin_threads: false,
            producer_core: cores.producer_core.id,
            consumer_core: cores.consumer_core.id,
            report_format: ReportFormat::default(),
            report_clock: false,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take their default,
    /// set-but-invalid keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            buffer_capacity: parse_var(
                &lookup,
                "TICKFLOW_BUFFER_CAPACITY",
                defaults.buffer_capacity,
            )?,
            window_size: parse_var(&lookup, "TICKFLOW_WINDOW_SIZE", defaults.window_size)?,
            summary_interval: parse_var(
                &lookup,
                "TICKFLOW_SUMMARY_INTERVAL",
                defaults.summary_interval,
            )?,
            tick_interval: Duration::from_micros(parse_var(
                &lookup,
                "TICKFLOW_TICK_INTERVAL_US",
                defaults.tick_interval.as_micros() as u64,
            )?),
            run_duration: Duration::from_secs(parse_var(
                &lookup,
                "TICKFLOW_RUN_SECS",
                defaults.run_duration.as_secs(),
            )?),
            wait_strategy: parse_var(&lookup, "TICKFLOW_WAIT_STRATEGY", defaults.wait_strategy)?,
            full_policy: parse_var(&lookup, "TICKFLOW_FULL_POLICY", defaults.full_policy)?,
            drain_on_shutdown: parse_bool(
                &lookup,
                "TICKFLOW_DRAIN_ON_SHUTDOWN",
                defaults.drain_on_shutdown,
            )?,
            pin_threads: parse_bool(&lookup, "TICKFLOW_PIN_THREADS", defaults.pin_threads)?,
            producer_core: parse_var(&lookup, "TICKFLOW_PRODUCER_CORE", defaults.producer_core)?,
            consumer_core: parse_var(&lookup, "TICKFLOW_CONSUMER_CORE", defaults.consumer_core)?,
            report_format: parse_var(&lookup, "TICKFLOW_REPORT_FORMAT", defaults.report_format)?,
            report_clock: parse_bool(&lookup, "TICKFLOW_REPORT_CLOCK", defaults.report_clock)?,
            seed: match lookup("TICKFLOW_SEED") {
                Some(raw) => Some(parse_value("TICKFLOW_SEED", &raw)?),
                None => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.buffer_capacity < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "buffer capacity must be at least 2, got {}",
                self.buffer_capacity
            )));
        }
        if self.run_duration.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "run duration must be at least one second".to_string(),
            ));
        }
        self.aggregator_config().validate()
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            window_size: self.window_size,
            summary_interval: self.summary_interval,
        }
    }

    pub fn core_assignment(&self) -> Option<CoreAssignment> {
        self.pin_threads
            .then(|| CoreAssignment::custom(self.producer_core, self.consumer_core))
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            capacity: self.buffer_capacity,
            aggregator: self.aggregator_config(),
            tick_interval: self.tick_interval,
            wait_strategy: self.wait_strategy,
            full_policy: self.full_policy,
            drain_on_shutdown: self.drain_on_shutdown,
            cores: self.core_assignment(),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| PipelineError::InvalidConfig(format!("{}='{}': {}", key, raw, e)))
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::InvalidConfig(format!(
            "{}='{}': expected a boolean",
            key, raw
        ))),
    }
}
