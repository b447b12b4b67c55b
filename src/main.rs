use tickflow::config::PipelineConfig;
use tickflow::logging::{init_logging, LogFormat};
use tickflow::stream::runner::PipelineRunner;
use tickflow::stream::source::{RandomWalkConfig, RandomWalkSource};
use tickflow::stream::thread_pinning::log_core_assignment;
use tickflow::DynError;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), DynError> {
    dotenv::dotenv().ok();
    init_logging(LogFormat::from_env()?)?;

    let config = PipelineConfig::from_env()?;
    info!(
        capacity = config.buffer_capacity,
        window = config.window_size,
        summary_interval = config.summary_interval,
        tick_interval_us = config.tick_interval.as_micros() as u64,
        run_secs = config.run_duration.as_secs(),
        report = ?config.report_format,
        "tickflow starting"
    );

    if let Some(cores) = config.core_assignment() {
        log_core_assignment(&cores);
    }

    let source = match config.seed {
        Some(seed) => RandomWalkSource::with_seed(RandomWalkConfig::default(), seed),
        None => RandomWalkSource::new(RandomWalkConfig::default()),
    };
    let sink = config.report_format.stdout_sink(config.report_clock);

    let runner = PipelineRunner::new(config.runner_config())?;
    let pipeline = runner.start(source, sink)?;
    info!("press Ctrl-C to stop early");

    let report = pipeline.run_until_signal(config.run_duration).await?;
    report.log();

    Ok(())
}
