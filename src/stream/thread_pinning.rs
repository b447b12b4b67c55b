//! Thread Pinning for the Producer and Consumer Threads
//!
//! Pinning each side of the ring to its own core keeps its half of the
//! queue state hot in L1/L2 and stops the scheduler migrating a spinning
//! thread mid-run. It is a performance hint only: a failed pin is logged and
//! the pipeline carries on unpinned.
//!
//! ## Kernel Configuration
//!
//! For the lowest jitter, isolate the pipeline cores from the scheduler:
//!
//! ```bash
//! # /etc/default/grub
//! GRUB_CMDLINE_LINUX="isolcpus=1-2 nohz_full=1-2 rcu_nocbs=1-2"
//! ```

use crate::error::PipelineError;
use core_affinity::CoreId;
use std::thread;
use tracing::{info, warn};

/// Core assignments for the two pipeline threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAssignment {
    /// Core for the tick producer
    pub producer_core: CoreId,

    /// Core for the consumer / aggregator (hot path)
    pub consumer_core: CoreId,
}

impl CoreAssignment {
    /// Default core assignment:
    /// - Core 0: Producer
    /// - Core 1: Consumer
    pub fn default_assignment() -> Self {
        Self::custom(0, 1)
    }

    pub fn custom(producer_core: usize, consumer_core: usize) -> Self {
        Self {
            producer_core: CoreId { id: producer_core },
            consumer_core: CoreId { id: consumer_core },
        }
    }

    fn highest_core(&self) -> usize {
        self.producer_core.id.max(self.consumer_core.id)
    }
}

impl Default for CoreAssignment {
    fn default() -> Self {
        Self::default_assignment()
    }
}

/// Pin the current thread to `core`.
///
/// Fails if the OS refuses the affinity change or the core does not exist.
pub fn pin_current_thread(core: CoreId, thread_name: &str) -> Result<(), PipelineError> {
    let exists = core_affinity::get_core_ids()
        .map(|cores| cores.iter().any(|c| c.id == core.id))
        .unwrap_or(false);

    if !exists || !core_affinity::set_for_current(core) {
        return Err(PipelineError::Pinning {
            thread: thread_name.to_string(),
            core: core.id,
        });
    }

    info!(thread = thread_name, core = core.id, "thread pinned");
    Ok(())
}

/// Get the number of available CPU cores.
pub fn get_core_count() -> usize {
    core_affinity::get_core_ids()
        .map(|cores| cores.len())
        .unwrap_or(0)
}

/// True if every core named in `assignment` exists on this machine.
pub fn has_sufficient_cores(assignment: &CoreAssignment) -> bool {
    get_core_count() > assignment.highest_core()
}

/// Log the core layout at startup.
pub fn log_core_assignment(assignment: &CoreAssignment) {
    let core_count = get_core_count();
    info!(
        cores = core_count,
        producer_core = assignment.producer_core.id,
        consumer_core = assignment.consumer_core.id,
        "CPU core assignment"
    );

    if !has_sufficient_cores(assignment) {
        warn!(
            required = assignment.highest_core() + 1,
            available = core_count,
            "insufficient cores for the requested assignment, threads may run unpinned"
        );
    }
    if assignment.producer_core == assignment.consumer_core {
        warn!(
            core = assignment.producer_core.id,
            "producer and consumer share a core; spinning will contend"
        );
    }
}

/// Spawn a named thread, optionally pinned to a core.
///
/// Pinning failures are logged inside the new thread and do not stop it.
pub fn spawn_named<F, T>(
    name: &'static str,
    core: Option<CoreId>,
    f: F,
) -> Result<thread::JoinHandle<T>, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            if let Some(core) = core {
                if let Err(e) = pin_current_thread(core, name) {
                    warn!(thread = name, error = %e, "running unpinned");
                }
            }
            f()
        })
        .map_err(|source| PipelineError::Spawn {
            thread: name,
            source,
        })
}
