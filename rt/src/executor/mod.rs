//! Per-paradigm executors: the objects a caller actually launches work
//! through. Each wraps one or more driver queues and the packet-assembly
//! logic appropriate to its execution paradigm.

pub mod cpu;
pub mod memcpy;
pub mod serial_ordered;
pub mod serial_unordered;

pub use cpu::CpuExecutor;
pub use memcpy::MemcpyExecutor;
pub use serial_ordered::SerialOrderedExecutor;
pub use serial_unordered::SerialUnorderedExecutor;

use dagee_core::signal::Signal;

/// A launched task's completion token.
///
/// Dropping a `TaskHandle` without waiting on it (or handing its `signal` to
/// a later dependency) leaks the underlying driver signal slot until the
/// process exits: this engine does not attempt reference-counted auto-join.
#[must_use = "a TaskHandle's signal must be waited on (or chained as a dependency) or its driver signal leaks"]
pub struct TaskHandle {
    pub signal: Signal,
}

impl TaskHandle {
    /// Blocks the calling thread until this task (or, for a batch, its
    /// terminal task) completes.
    pub fn wait(&self) {
        self.signal.wait();
    }
}
