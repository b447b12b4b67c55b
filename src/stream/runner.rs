//! Pipeline Orchestration
//!
//! Owns the ring buffer and the two worker threads:
//!
//! ```text
//!  TickSource ──▶ tick-producer ──push()──▶ RingBuffer ──pop()──▶ tick-consumer ──▶ SummarySink
//!                       ▲                                              ▲
//!                       └──────────── running: AtomicBool ─────────────┘
//!                                         (orchestrator)
//! ```
//!
//! ## Shutdown Protocol
//!
//! Two phases, no forced termination:
//!
//! 1. **Signal**: the orchestrator clears `running`.
//! 2. **Wait**: both loops observe the flag on their next iteration and
//!    return; the orchestrator joins them and builds a [`RunReport`].
//!
//! The producer also leaves its full-ring retry loop when the flag clears,
//! so a stalled consumer can never keep it alive. Each worker raises a
//! "done" flag when it exits (even by panic) so the other side can stop
//! waiting for it.

use crate::error::PipelineError;
use crate::stream::aggregator::{AggregatorConfig, StatsAggregator};
use crate::stream::latency_tracker::{LatencySnapshot, LatencyStats};
use crate::stream::pipeline::{
    Consumer, Producer, RingBuffer, RingMetrics, RingMonitor, DEFAULT_CAPACITY,
};
use crate::stream::reporter::SummarySink;
use crate::stream::thread_pinning::{spawn_named, CoreAssignment};
use crate::stream::types::Tick;
use crate::stream::wait::WaitStrategy;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default pacing between produced ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_micros(100);

/// What the producer does when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullPolicy {
    /// Retry until the consumer frees a slot. No tick is lost while the
    /// pipeline is running.
    #[default]
    Block,

    /// Discard the tick that did not fit and move on.
    DropNewest,
}

impl FromStr for FullPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(FullPolicy::Block),
            "drop" | "drop-newest" => Ok(FullPolicy::DropNewest),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown full-queue policy '{}', expected block/drop",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Ring slot count (usable capacity is one less)
    pub capacity: usize,

    pub aggregator: AggregatorConfig,

    /// Sleep after every successful push; zero disables pacing
    pub tick_interval: Duration,

    pub wait_strategy: WaitStrategy,

    pub full_policy: FullPolicy,

    /// Keep consuming after shutdown until the producer has exited and the
    /// ring is empty
    pub drain_on_shutdown: bool,

    /// Pin the workers when set
    pub cores: Option<CoreAssignment>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            aggregator: AggregatorConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            wait_strategy: WaitStrategy::default(),
            full_policy: FullPolicy::default(),
            drain_on_shutdown: false,
            cores: None,
        }
    }
}

/// Cloneable handle that requests cooperative shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Sets its flag when dropped, including during a panic unwind.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ProducerStats {
    produced: u64,
    dropped: u64,
    abandoned: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ConsumerStats {
    consumed: u64,
    summaries: u64,
    report_errors: u64,
    final_vwap: Option<f64>,
    final_volatility: f64,
}

/// Final accounting for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// Ticks successfully pushed into the ring
    pub produced: u64,

    /// Ticks discarded under `FullPolicy::DropNewest`
    pub dropped: u64,

    /// Tick left unpushed because shutdown arrived while the ring was full
    pub abandoned: u64,

    /// Ticks popped and aggregated
    pub consumed: u64,

    pub summaries: u64,

    pub report_errors: u64,

    pub final_vwap: Option<f64>,

    pub final_volatility: f64,

    pub ring: RingMetrics,

    pub latency: LatencySnapshot,

    pub elapsed: Duration,
}

impl RunReport {
    /// Ticks pushed but never consumed (left in the ring at shutdown).
    pub fn unconsumed(&self) -> u64 {
        self.produced.saturating_sub(self.consumed)
    }

    /// Consumed ticks per second of wall-clock run time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.consumed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn log(&self) {
        info!(
            produced = self.produced,
            consumed = self.consumed,
            unconsumed = self.unconsumed(),
            dropped = self.dropped,
            abandoned = self.abandoned,
            summaries = self.summaries,
            report_errors = self.report_errors,
            rejected_pushes = self.ring.rejected,
            throughput = format_args!("{:.0}/s", self.throughput()),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "run complete"
        );
        info!(
            p50_us = self.latency.p50_us(),
            p95_us = self.latency.p95_us(),
            p99_us = self.latency.p99_us(),
            max_us = self.latency.max_us(),
            mean_us = self.latency.mean_us(),
            "processing latency"
        );
        if let Some(vwap) = self.final_vwap {
            info!(vwap, volatility = self.final_volatility, "final statistics");
        }
    }
}

/// Builds and starts pipelines from a validated configuration.
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    config: RunnerConfig,
}

impl PipelineRunner {
    pub fn new(config: RunnerConfig) -> Result<Self, PipelineError> {
        if config.capacity < 2 {
            return Err(PipelineError::InvalidCapacity(config.capacity));
        }
        config.aggregator.validate()?;
        Ok(Self { config })
    }

    /// Allocate the ring and spawn both worker threads.
    ///
    /// The producer stops on shutdown or when `source` is exhausted; the
    /// consumer stops on shutdown, or once the producer has exited and the
    /// ring is drained.
    pub fn start<I, S>(&self, source: I, sink: S) -> Result<RunningPipeline, PipelineError>
    where
        I: IntoIterator<Item = Tick>,
        I::IntoIter: Send + 'static,
        S: SummarySink + 'static,
    {
        let ring = RingBuffer::with_capacity(self.config.capacity)?;
        let monitor = ring.monitor();
        let (producer, consumer) = ring.split();
        let aggregator = StatsAggregator::new(self.config.aggregator)?;

        let running = Arc::new(AtomicBool::new(true));
        let producer_done = Arc::new(AtomicBool::new(false));
        let consumer_done = Arc::new(AtomicBool::new(false));
        let latency = Arc::new(LatencyStats::new());

        let producer_worker = ProducerWorker {
            tx: producer,
            running: Arc::clone(&running),
            consumer_done: Arc::clone(&consumer_done),
            done: DoneGuard(Arc::clone(&producer_done)),
            wait: self.config.wait_strategy,
            policy: self.config.full_policy,
            tick_interval: self.config.tick_interval,
        };
        let consumer_worker = ConsumerWorker {
            rx: consumer,
            aggregator,
            sink,
            latency: Arc::clone(&latency),
            running: Arc::clone(&running),
            producer_done,
            done: DoneGuard(consumer_done),
            wait: self.config.wait_strategy,
            drain_on_shutdown: self.config.drain_on_shutdown,
            stats: ConsumerStats::default(),
        };

        let (producer_core, consumer_core) = match self.config.cores {
            Some(cores) => (Some(cores.producer_core), Some(cores.consumer_core)),
            None => (None, None),
        };

        let started = Instant::now();

        // Consumer first so it is polling before the first tick lands
        let consumer_handle = spawn_named("tick-consumer", consumer_core, move || {
            consumer_worker.run()
        })?;

        let source = source.into_iter();
        let producer_handle = match spawn_named("tick-producer", producer_core, move || {
            producer_worker.run(source)
        }) {
            Ok(handle) => handle,
            Err(e) => {
                // Startup failed: bring the consumer down before surfacing the error
                running.store(false, Ordering::Release);
                let _ = consumer_handle.join();
                return Err(e);
            }
        };

        info!(
            capacity = self.config.capacity,
            window = self.config.aggregator.window_size,
            summary_interval = self.config.aggregator.summary_interval,
            wait = self.config.wait_strategy.name(),
            policy = ?self.config.full_policy,
            "pipeline started"
        );

        Ok(RunningPipeline {
            running,
            producer: producer_handle,
            consumer: consumer_handle,
            monitor,
            latency,
            started,
        })
    }
}

/// A started pipeline. Dropping it without calling [`shutdown`] or [`join`]
/// detaches the threads.
///
/// [`shutdown`]: RunningPipeline::shutdown
/// [`join`]: RunningPipeline::join
pub struct RunningPipeline {
    running: Arc<AtomicBool>,
    producer: JoinHandle<ProducerStats>,
    consumer: JoinHandle<ConsumerStats>,
    monitor: RingMonitor<Tick>,
    latency: Arc<LatencyStats>,
    started: Instant,
}

impl RunningPipeline {
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Live ring depth and counters.
    pub fn ring_metrics(&self) -> RingMetrics {
        self.monitor.metrics()
    }

    /// Live processing latency.
    pub fn latency(&self) -> LatencySnapshot {
        self.latency.snapshot()
    }

    /// True once both workers have returned.
    pub fn is_finished(&self) -> bool {
        self.producer.is_finished() && self.consumer.is_finished()
    }

    /// Let the pipeline run for `duration`, then shut it down.
    pub fn run_for(self, duration: Duration) -> Result<RunReport, PipelineError> {
        thread::sleep(duration);
        self.shutdown()
    }

    /// Run until `duration` elapses or Ctrl-C arrives, then shut down.
    ///
    /// Joining happens on the blocking pool so the runtime stays responsive.
    pub async fn run_until_signal(self, duration: Duration) -> Result<RunReport, PipelineError> {
        let interrupted = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "cannot listen for Ctrl-C, waiting for run duration");
                    std::future::pending::<()>().await
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => info!(?duration, "run duration elapsed"),
            _ = interrupted => info!("interrupt received"),
        }

        tokio::task::spawn_blocking(move || self.shutdown())
            .await
            .map_err(|_| PipelineError::ThreadPanicked("orchestrator"))?
    }

    /// Signal shutdown and wait for both workers to exit.
    pub fn shutdown(self) -> Result<RunReport, PipelineError> {
        info!("shutdown requested");
        self.running.store(false, Ordering::Release);
        self.join()
    }

    /// Wait for both workers to exit on their own (finite sources).
    pub fn join(self) -> Result<RunReport, PipelineError> {
        let producer = self
            .producer
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("producer"));
        let consumer = self
            .consumer
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("consumer"));
        let (producer, consumer) = (producer?, consumer?);

        Ok(RunReport {
            produced: producer.produced,
            dropped: producer.dropped,
            abandoned: producer.abandoned,
            consumed: consumer.consumed,
            summaries: consumer.summaries,
            report_errors: consumer.report_errors,
            final_vwap: consumer.final_vwap,
            final_volatility: consumer.final_volatility,
            ring: self.monitor.metrics(),
            latency: self.latency.snapshot(),
            elapsed: self.started.elapsed(),
        })
    }
}

// ============================================================================
// Worker Loops
// ============================================================================

struct ProducerWorker {
    tx: Producer<Tick>,
    running: Arc<AtomicBool>,
    consumer_done: Arc<AtomicBool>,
    done: DoneGuard,
    wait: WaitStrategy,
    policy: FullPolicy,
    tick_interval: Duration,
}

impl ProducerWorker {
    fn run<I: Iterator<Item = Tick>>(mut self, mut source: I) -> ProducerStats {
        let mut stats = ProducerStats::default();
        let mut waiter = self.wait.waiter();

        'ticks: while self.running.load(Ordering::Acquire) {
            let Some(tick) = source.next() else {
                debug!("tick source exhausted");
                break;
            };

            let pushed = loop {
                if self.tx.push(tick) {
                    break true;
                }
                match self.policy {
                    FullPolicy::DropNewest => break false,
                    FullPolicy::Block => {
                        if !self.running.load(Ordering::Acquire)
                            || self.consumer_done.load(Ordering::Acquire)
                        {
                            stats.abandoned += 1;
                            break 'ticks;
                        }
                        waiter.wait();
                    }
                }
            };
            waiter.reset();
            if pushed {
                stats.produced += 1;
            } else {
                stats.dropped += 1;
            }

            // Dropped ticks keep the source cadence too
            if !self.tick_interval.is_zero() {
                thread::sleep(self.tick_interval);
            }
        }

        debug!(produced = stats.produced, "producer exiting");
        drop(self.done);
        stats
    }
}

struct ConsumerWorker<S> {
    rx: Consumer<Tick>,
    aggregator: StatsAggregator,
    sink: S,
    latency: Arc<LatencyStats>,
    running: Arc<AtomicBool>,
    producer_done: Arc<AtomicBool>,
    done: DoneGuard,
    wait: WaitStrategy,
    drain_on_shutdown: bool,
    stats: ConsumerStats,
}

impl<S: SummarySink> ConsumerWorker<S> {
    fn run(mut self) -> ConsumerStats {
        let mut waiter = self.wait.waiter();

        loop {
            if !self.running.load(Ordering::Acquire) && !self.drain_on_shutdown {
                break;
            }

            match self.rx.pop() {
                Some(tick) => {
                    waiter.reset();
                    self.handle(tick);
                }
                None => {
                    // The producer's last push happens-before its done flag,
                    // so one more sweep after seeing the flag catches it
                    if self.producer_done.load(Ordering::Acquire) {
                        while let Some(tick) = self.rx.pop() {
                            self.handle(tick);
                        }
                        break;
                    }
                    waiter.wait();
                }
            }
        }

        self.stats.final_vwap = self.aggregator.vwap();
        self.stats.final_volatility = self.aggregator.volatility();
        debug!(consumed = self.stats.consumed, "consumer exiting");
        drop(self.done);
        self.stats
    }

    #[inline]
    fn handle(&mut self, tick: Tick) {
        let now = Instant::now();
        self.stats.consumed += 1;
        self.latency.record(now.saturating_duration_since(tick.timestamp));

        if let Some(summary) = self.aggregator.consume_at(&tick, now) {
            self.stats.summaries += 1;
            if let Err(e) = self.sink.report(&summary) {
                self.stats.report_errors += 1;
                warn!(error = %e, tick_count = summary.tick_count, "failed to report summary");
            }
        }
    }
}
