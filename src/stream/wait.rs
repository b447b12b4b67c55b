//! Idle policies for the producer (ring full) and consumer (ring empty).
//!
//! Pure spinning gives the lowest handoff latency but burns a full core.
//! The other strategies give the core back after a bounded number of spins.

use crate::error::PipelineError;
use std::hint;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

const DEFAULT_SPINS: u32 = 64;
const DEFAULT_PARK_TIMEOUT: Duration = Duration::from_micros(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Busy-poll with `spin_loop` hints
    #[default]
    Spin,

    /// Spin `spins` times, then `yield_now` on every further idle iteration
    SpinYield { spins: u32 },

    /// Spin `spins` times, then park for at most `timeout`
    Park { spins: u32, timeout: Duration },
}

impl WaitStrategy {
    pub fn waiter(self) -> Waiter {
        Waiter {
            strategy: self,
            idle: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WaitStrategy::Spin => "spin",
            WaitStrategy::SpinYield { .. } => "yield",
            WaitStrategy::Park { .. } => "park",
        }
    }
}

impl FromStr for WaitStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spin" => Ok(WaitStrategy::Spin),
            "yield" => Ok(WaitStrategy::SpinYield {
                spins: DEFAULT_SPINS,
            }),
            "park" => Ok(WaitStrategy::Park {
                spins: DEFAULT_SPINS,
                timeout: DEFAULT_PARK_TIMEOUT,
            }),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown wait strategy '{}', expected spin/yield/park",
                other
            ))),
        }
    }
}

/// Per-loop idle state. Call [`Waiter::wait`] after every failed attempt and
/// [`Waiter::reset`] after every success.
#[derive(Debug)]
pub struct Waiter {
    strategy: WaitStrategy,
    idle: u32,
}

impl Waiter {
    #[inline]
    pub fn wait(&mut self) {
        match self.strategy {
            WaitStrategy::Spin => hint::spin_loop(),
            WaitStrategy::SpinYield { spins } => {
                if self.idle < spins {
                    hint::spin_loop();
                } else {
                    thread::yield_now();
                }
            }
            WaitStrategy::Park { spins, timeout } => {
                if self.idle < spins {
                    hint::spin_loop();
                } else {
                    thread::park_timeout(timeout);
                }
            }
        }
        self.idle = self.idle.saturating_add(1);
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.idle = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_parse_strategies() {
        assert_eq!("spin".parse::<WaitStrategy>().unwrap(), WaitStrategy::Spin);
        assert_eq!(
            " Yield ".parse::<WaitStrategy>().unwrap(),
            WaitStrategy::SpinYield { spins: 64 }
        );
        assert!(matches!(
            "park".parse::<WaitStrategy>().unwrap(),
            WaitStrategy::Park { .. }
        ));
        assert!("sleep".parse::<WaitStrategy>().is_err());
    }

    #[test]
    fn test_waiter_counts_and_resets() {
        let mut waiter = WaitStrategy::Spin.waiter();
        for _ in 0..5 {
            waiter.wait();
        }
        assert_eq!(waiter.idle, 5);

        waiter.reset();
        assert_eq!(waiter.idle, 0);
    }

    #[test]
    fn test_park_is_bounded_by_timeout() {
        let mut waiter = WaitStrategy::Park {
            spins: 0,
            timeout: Duration::from_millis(1),
        }
        .waiter();

        let start = Instant::now();
        waiter.wait();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_names_round_trip() {
        for name in ["spin", "yield", "park"] {
            assert_eq!(name.parse::<WaitStrategy>().unwrap().name(), name);
        }
    }
}
