//! Diagnostic logging setup.
//!
//! Logs go to stderr so stdout carries only summary lines. Verbosity comes
//! from `RUST_LOG` (default `info`); `TICKFLOW_LOG_FORMAT=json` switches to
//! one JSON object per event.

use crate::error::PipelineError;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `TICKFLOW_LOG_FORMAT`; unset means pretty.
    pub fn from_env() -> Result<Self, PipelineError> {
        match std::env::var("TICKFLOW_LOG_FORMAT") {
            Ok(raw) => raw.parse(),
            Err(_) => Ok(LogFormat::default()),
        }
    }
}

impl FromStr for LogFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown log format '{}', expected pretty/json",
                other
            ))),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), PipelineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_target(false);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| PipelineError::Logging(e.to_string()))
}
