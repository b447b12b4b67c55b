use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

// ============================================================================
// Hot Path Types
// ============================================================================

/// One top-of-book observation moving through the ring buffer.
///
/// `Copy` so the producer can write it into a slot and the consumer can copy
/// it out without touching the allocator. `bid <= ask` is assumed, not checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Best bid price
    pub bid: f64,

    /// Best ask price
    pub ask: f64,

    /// Traded volume attached to this quote
    pub volume: u32,

    /// Monotonic creation time, used for end-to-end latency
    pub timestamp: Instant,
}

impl Tick {
    #[inline(always)]
    pub fn new(bid: f64, ask: f64, volume: u32, timestamp: Instant) -> Self {
        Self {
            bid,
            ask,
            volume,
            timestamp,
        }
    }

    /// Create a tick stamped with the current monotonic time.
    #[inline(always)]
    pub fn now(bid: f64, ask: f64, volume: u32) -> Self {
        Self::new(bid, ask, volume, Instant::now())
    }

    #[inline(always)]
    pub fn mid_price(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }

    #[inline(always)]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

// ============================================================================
// Cold Path Types
// ============================================================================

/// Periodic statistics snapshot produced by the aggregator.
///
/// `vwap` is `None` while no volume has been seen, so a degenerate division
/// never leaks a NaN or infinity into the output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryRecord {
    /// Ticks processed when this record was produced
    pub tick_count: u64,

    /// Cumulative volume-weighted average mid price
    pub vwap: Option<f64>,

    /// Mid price of the triggering tick
    pub mid: f64,

    /// Spread of the triggering tick
    pub spread: f64,

    /// Population standard deviation of the rolling log-return window
    pub volatility: f64,

    /// Time between the triggering tick's creation and its processing
    #[serde(rename = "latency_us", serialize_with = "serialize_micros")]
    pub latency: Duration,
}

impl SummaryRecord {
    pub fn latency_us(&self) -> u128 {
        self.latency.as_micros()
    }
}

fn serialize_micros<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_mid_and_spread() {
        let tick = Tick::now(99.0, 101.0, 10);
        assert_eq!(tick.mid_price(), 100.0);
        assert_eq!(tick.spread(), 2.0);
    }

    #[test]
    fn test_summary_serializes_latency_in_micros() {
        let record = SummaryRecord {
            tick_count: 1000,
            vwap: Some(100.0),
            mid: 100.0,
            spread: 0.02,
            volatility: 0.0,
            latency: Duration::from_micros(42),
        };

        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value["latency_us"], 42);
        assert_eq!(value["tick_count"], 1000);
        assert_eq!(value["vwap"], 100.0);
    }

    #[test]
    fn test_summary_serializes_missing_vwap_as_null() {
        let record = SummaryRecord {
            tick_count: 1,
            vwap: None,
            mid: 100.0,
            spread: 0.0,
            volatility: 0.0,
            latency: Duration::ZERO,
        };

        let value = serde_json::to_value(record).unwrap();
        assert!(value["vwap"].is_null());
    }
}
