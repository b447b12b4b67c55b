use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid ring capacity {0}: need at least 2 slots")]
    InvalidCapacity(usize),

    #[error("config error: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    #[error("failed to pin {thread} thread to core {core}")]
    Pinning { thread: String, core: usize },

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
