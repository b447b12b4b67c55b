//! Summary sinks.
//!
//! The consumer thread hands every [`SummaryRecord`] to a [`SummarySink`].
//! Rendering is cold path (one call per `N` ticks), so sinks may allocate
//! and do I/O. A failing sink is logged by the caller and never stops the
//! pipeline.

use crate::error::PipelineError;
use crate::stream::types::SummaryRecord;
use crate::utils::{ts_hm, ts_rfc3339};
use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait SummarySink: Send {
    fn report(&mut self, record: &SummaryRecord) -> Result<(), PipelineError>;
}

impl<S: SummarySink + ?Sized> SummarySink for Box<S> {
    fn report(&mut self, record: &SummaryRecord) -> Result<(), PipelineError> {
        (**self).report(record)
    }
}

/// Render a record as a single human-readable line (no trailing newline).
pub fn format_line(record: &SummaryRecord) -> String {
    let vwap = match record.vwap {
        Some(vwap) => format!("{:.4}", vwap),
        None => "n/a".to_string(),
    };
    format!(
        "VWAP={}  Spread={:.4}  Volatility={:.6}  Latency={}us",
        vwap,
        record.spread,
        record.volatility,
        record.latency_us()
    )
}

// ============================================================================
// Text / JSON writers
// ============================================================================

/// One line of text per record.
pub struct TextReporter<W: Write + Send> {
    out: W,
    clock: bool,
}

impl TextReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, clock: false }
    }

    /// Prefix each line with the local wall-clock time.
    pub fn with_clock(mut self, clock: bool) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> SummarySink for TextReporter<W> {
    fn report(&mut self, record: &SummaryRecord) -> Result<(), PipelineError> {
        if self.clock {
            writeln!(self.out, "[{}] {}", ts_hm(), format_line(record))?;
        } else {
            writeln!(self.out, "{}", format_line(record))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: String,
    #[serde(flatten)]
    record: &'a SummaryRecord,
}

/// One JSON object per line.
pub struct JsonReporter<W: Write + Send> {
    out: W,
}

impl JsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> SummarySink for JsonReporter<W> {
    fn report(&mut self, record: &SummaryRecord) -> Result<(), PipelineError> {
        let line = JsonLine {
            ts: ts_rfc3339(),
            record,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct LogReporter;

impl SummarySink for LogReporter {
    fn report(&mut self, record: &SummaryRecord) -> Result<(), PipelineError> {
        tracing::info!(
            target: "tickflow::summary",
            tick_count = record.tick_count,
            vwap = ?record.vwap,
            spread = record.spread,
            volatility = record.volatility,
            latency_us = record.latency_us() as u64,
            "summary"
        );
        Ok(())
    }
}

// ============================================================================
// Queue sink
// ============================================================================

/// Bounded lock-free queue of summaries for a reader on another thread
/// (dashboards, tests).
///
/// # Backpressure
///
/// When the queue is full the oldest summary is dropped, so a slow reader
/// always sees the most recent ones and the consumer thread never waits.
pub struct SummaryQueue {
    queue: Arc<ArrayQueue<SummaryRecord>>,
    push_count: Arc<AtomicU64>,
    drop_count: Arc<AtomicU64>,
}

impl SummaryQueue {
    /// Create a queue holding up to `capacity` summaries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            push_count: Arc::new(AtomicU64::new(0)),
            drop_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sink handle to give to the pipeline.
    pub fn reporter(&self) -> QueueReporter {
        QueueReporter {
            queue: Arc::clone(&self.queue),
            push_count: Arc::clone(&self.push_count),
            drop_count: Arc::clone(&self.drop_count),
        }
    }

    pub fn pop(&self) -> Option<SummaryRecord> {
        self.queue.pop()
    }

    /// Pop everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<SummaryRecord> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(record) = self.queue.pop() {
            out.push(record);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total summaries reported, including dropped ones.
    pub fn push_count(&self) -> u64 {
        self.push_count.load(Ordering::Relaxed)
    }

    /// Summaries discarded because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.drop_count.load(Ordering::Relaxed)
    }
}

pub struct QueueReporter {
    queue: Arc<ArrayQueue<SummaryRecord>>,
    push_count: Arc<AtomicU64>,
    drop_count: Arc<AtomicU64>,
}

impl SummarySink for QueueReporter {
    fn report(&mut self, record: &SummaryRecord) -> Result<(), PipelineError> {
        self.push_count.fetch_add(1, Ordering::Relaxed);
        if self.queue.force_push(*record).is_some() {
            self.drop_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

// ============================================================================
// Format selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Log,
}

impl ReportFormat {
    /// Sink writing to stdout (or the log) in this format. `clock` adds a
    /// wall-clock prefix to text lines; JSON lines always carry `ts`.
    pub fn stdout_sink(self, clock: bool) -> Box<dyn SummarySink> {
        match self {
            ReportFormat::Text => Box::new(TextReporter::stdout().with_clock(clock)),
            ReportFormat::Json => Box::new(JsonReporter::stdout()),
            ReportFormat::Log => Box::new(LogReporter),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "log" => Ok(ReportFormat::Log),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown report format '{}', expected text/json/log",
                other
            ))),
        }
    }
}
