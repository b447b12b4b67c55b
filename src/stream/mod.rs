pub mod aggregator;
pub mod latency_tracker;
pub mod pipeline;
pub mod reporter;
pub mod runner;
pub mod source;
pub mod thread_pinning;
pub mod types;
pub mod wait;
