//! Error type for the kernel registry, argument packing, executors and DAG
//! scheduler.

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced above the driver-contract layer (`dagee-core`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Propagated from `dagee-core`.
    #[error(transparent)]
    Core(#[from] dagee_core::Error),

    /// `register_kernel` was given a name already present in the registry.
    #[error("kernel `{0}` is already registered")]
    DuplicateKernel(String),

    /// A task referenced a kernel name with no matching registry entry.
    #[error("no kernel registered under the name `{0}`")]
    UnknownKernel(String),

    /// An argument list did not match the kernel's registered layout.
    #[error("argument count mismatch for kernel `{kernel}`: expected {expected}, got {got}")]
    ArgCountMismatch { kernel: String, expected: usize, got: usize },

    /// A DAG edge would create a self-loop or duplicate an existing edge.
    #[error("invalid DAG edge: {0}")]
    InvalidEdge(String),

    /// A DAG operation found a cycle where none is permitted.
    #[error("DAG contains a cycle")]
    CyclicGraph,

    /// A buffer handed to a CPU or memcpy task did not have the expected
    /// size.
    #[error("buffer size mismatch: expected {expected} bytes, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    /// A partitioned (out-of-core) DAG was asked to run with zero rotating
    /// buffer slots.
    #[error("partition executor requires at least one device-buffer slot")]
    NoPartitionSlots,
}

/// Formats and logs the `error: <op> failed at <file>:<line>` line mandated
/// by the engine's user-visible error contract.
#[track_caller]
pub fn report_fatal(op: &str, err: &Error) {
    let loc = std::panic::Location::caller();
    log::error!("error: {op} failed at {}:{}: {err}", loc.file(), loc.line());
}
