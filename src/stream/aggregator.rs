//! Streaming statistics over the tick stream.
//!
//! The aggregator is owned by the consumer thread and needs no
//! synchronization: thread safety comes from having a single owner.
//!
//! Per tick, in FIFO order:
//!
//! ```text
//! mid, spread ──▶ cumulative Σ(mid·volume), Σ(volume)        (VWAP)
//!      │
//!      └──────▶ ln(mid / last_mid) ──▶ window of W returns   (volatility)
//! ```
//!
//! Every `N` ticks a [`SummaryRecord`] is produced for the reporter.

use crate::error::PipelineError;
use crate::stream::types::{SummaryRecord, Tick};
use std::collections::VecDeque;
use std::time::Instant;

pub const DEFAULT_WINDOW_SIZE: usize = 100;
pub const DEFAULT_SUMMARY_INTERVAL: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Number of log-returns kept for volatility (`W`)
    pub window_size: usize,

    /// Emit a summary every this many ticks (`N`)
    pub summary_interval: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            summary_interval: DEFAULT_SUMMARY_INTERVAL,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "window size must be at least 1".to_string(),
            ));
        }
        if self.summary_interval == 0 {
            return Err(PipelineError::InvalidConfig(
                "summary interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cumulative VWAP plus rolling realized volatility.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    config: AggregatorConfig,

    /// Σ(mid · volume) since start, never reset
    price_volume_sum: f64,

    /// Σ(volume) since start, never reset
    volume_sum: f64,

    /// Mid of the previous tick, `None` before the first one
    last_mid: Option<f64>,

    tick_count: u64,

    /// Most recent log-returns, oldest at the front
    returns: VecDeque<f64>,
}

impl StatsAggregator {
    /// Build an aggregator. The return window is allocated up front.
    pub fn new(config: AggregatorConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            price_volume_sum: 0.0,
            volume_sum: 0.0,
            last_mid: None,
            tick_count: 0,
            returns: VecDeque::with_capacity(config.window_size + 1),
        })
    }

    /// Process one tick, measuring latency against the current time.
    #[inline]
    pub fn consume(&mut self, tick: &Tick) -> Option<SummaryRecord> {
        self.consume_at(tick, Instant::now())
    }

    /// Process one tick with an explicit clock reading.
    ///
    /// Returns a summary on every `summary_interval`-th tick.
    pub fn consume_at(&mut self, tick: &Tick, now: Instant) -> Option<SummaryRecord> {
        let mid = tick.mid_price();
        let spread = tick.spread();
        let volume = f64::from(tick.volume);

        self.price_volume_sum += mid * volume;
        self.volume_sum += volume;

        // ln() is only defined for positive ratios
        if let Some(last_mid) = self.last_mid {
            if last_mid > 0.0 && mid > 0.0 {
                self.push_return((mid / last_mid).ln());
            }
        }
        self.last_mid = Some(mid);

        let latency = now.saturating_duration_since(tick.timestamp);

        self.tick_count += 1;
        if self.tick_count % self.config.summary_interval != 0 {
            return None;
        }

        Some(SummaryRecord {
            tick_count: self.tick_count,
            vwap: self.vwap(),
            mid,
            spread,
            volatility: self.volatility(),
            latency,
        })
    }

    #[inline(always)]
    fn push_return(&mut self, r: f64) {
        self.returns.push_back(r);
        if self.returns.len() > self.config.window_size {
            self.returns.pop_front();
        }
    }

    /// Cumulative VWAP, or `None` while no volume has been seen.
    pub fn vwap(&self) -> Option<f64> {
        if self.volume_sum > 0.0 {
            Some(self.price_volume_sum / self.volume_sum)
        } else {
            None
        }
    }

    /// Volatility of the current return window.
    pub fn volatility(&self) -> f64 {
        compute_volatility(self.returns.iter().copied())
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_mid(&self) -> Option<f64> {
        self.last_mid
    }

    pub fn window_len(&self) -> usize {
        self.returns.len()
    }

    /// Returns currently in the window, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.returns.iter().copied()
    }
}

/// Population standard deviation of `samples`.
///
/// Returns `0.0` for fewer than two samples.
pub fn compute_volatility<I>(samples: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone + ExactSizeIterator,
{
    let samples = samples.into_iter();
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }

    let mean = samples.clone().sum::<f64>() / n as f64;
    let variance = samples.map(|r| (r - mean) * (r - mean)).sum::<f64>() / n as f64;
    variance.sqrt()
}
