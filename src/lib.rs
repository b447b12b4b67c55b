use std::error::Error;

pub type DynError = Box<dyn Error + Send + Sync>;

pub mod config;
pub mod error;
pub mod logging;
pub mod stream;
pub mod utils;

pub use error::PipelineError;
