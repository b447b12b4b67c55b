use std::time::Duration;
use tickflow::stream::aggregator::{AggregatorConfig, StatsAggregator};
use tickflow::stream::reporter::{format_line, SummaryQueue, SummarySink, TextReporter};
use tickflow::stream::runner::{PipelineRunner, RunnerConfig};
use tickflow::stream::source::{RandomWalkConfig, RandomWalkSource};
use tickflow::stream::types::{SummaryRecord, Tick};

/// Everything but latency, which depends on when each tick was consumed
fn statistics(summary: &SummaryRecord) -> (u64, Option<f64>, f64, f64, f64) {
    (
        summary.tick_count,
        summary.vwap,
        summary.mid,
        summary.spread,
        summary.volatility,
    )
}

fn fast_config(capacity: usize) -> RunnerConfig {
    RunnerConfig {
        capacity,
        tick_interval: Duration::ZERO,
        ..RunnerConfig::default()
    }
}

#[test]
fn test_constant_quotes_through_the_pipeline() {
    let runner = PipelineRunner::new(fast_config(64)).unwrap();
    let queue = SummaryQueue::with_capacity(8);
    let ticks = vec![Tick::now(99.99, 100.01, 10); 1000];

    let report = runner.start(ticks, queue.reporter()).unwrap().join().unwrap();

    assert_eq!(report.consumed, 1000);
    assert_eq!(report.summaries, 1);

    let summary = queue.pop().unwrap();
    assert_eq!(summary.tick_count, 1000);
    assert!((summary.vwap.unwrap() - 100.0).abs() < 1e-9);
    assert!((summary.spread - 0.02).abs() < 1e-9);
    assert_eq!(summary.volatility, 0.0);
    assert!(queue.pop().is_none());
}

#[test]
fn test_constant_quotes_text_output() {
    let mut aggregator = StatsAggregator::new(AggregatorConfig::default()).unwrap();
    let mut reporter = TextReporter::new(Vec::new());

    for _ in 0..1000 {
        if let Some(summary) = aggregator.consume(&Tick::now(99.99, 100.01, 10)) {
            reporter.report(&summary).unwrap();
        }
    }

    let out = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(out.lines().count(), 1);
    assert!(out.starts_with("VWAP=100.0000  Spread=0.0200  Volatility=0.000000  Latency="));
}

#[test]
fn test_seeded_walk_matches_direct_aggregation() {
    let source_config = RandomWalkConfig::default();
    let ticks: Vec<Tick> = RandomWalkSource::with_seed(source_config, 2024)
        .take(5000)
        .collect();

    let mut direct = StatsAggregator::new(AggregatorConfig::default()).unwrap();
    let expected: Vec<_> = ticks
        .iter()
        .filter_map(|t| direct.consume(t))
        .map(|s| statistics(&s))
        .collect();

    let runner = PipelineRunner::new(fast_config(16)).unwrap();
    let queue = SummaryQueue::with_capacity(16);
    let report = runner
        .start(ticks.clone(), queue.reporter())
        .unwrap()
        .join()
        .unwrap();

    let actual: Vec<_> = queue.drain().iter().map(statistics).collect();

    assert_eq!(report.consumed, 5000);
    assert_eq!(actual.len(), 5);
    assert_eq!(actual, expected);
    assert_eq!(report.final_vwap, direct.vwap());
}

#[test]
fn test_summary_lines_have_expected_shape() {
    let runner = PipelineRunner::new(RunnerConfig {
        aggregator: AggregatorConfig {
            window_size: 10,
            summary_interval: 100,
        },
        ..fast_config(32)
    })
    .unwrap();
    let queue = SummaryQueue::with_capacity(64);
    let source = RandomWalkSource::with_seed(RandomWalkConfig::default(), 5).take(1000);

    let report = runner.start(source, queue.reporter()).unwrap().join().unwrap();
    assert_eq!(report.summaries, 10);

    for (i, summary) in queue.drain().iter().enumerate() {
        assert_eq!(summary.tick_count, (i as u64 + 1) * 100);
        assert!(summary.volatility >= 0.0);
        let line = format_line(summary);
        assert!(line.starts_with("VWAP="));
        assert!(line.ends_with("us"));
    }
}
