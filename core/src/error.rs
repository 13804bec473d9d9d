//! Error type for the driver-contract layer.
//!
//! Categories follow the propagation policy of the engine: configuration
//! errors (no code blob, unresolvable symbol), resource exhaustion
//! (region/heap allocation failure), contract violations (packet-size
//! mismatch, double free) and driver errors bubbled up from [`crate::driver`].

/// Result type used throughout `dagee-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the driver contract and its simulated backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No valid code blob was found in any loaded image's offload-bundle
    /// section.
    #[error("no code blob found in embedded binary image")]
    NoCodeBlob,

    /// A device-stub symbol could not be demangled into a kernel name.
    #[error("could not demangle device-stub symbol `{0}`")]
    UndemanglableStub(String),

    /// `register_kernel` was asked to resolve a function pointer that has no
    /// entry in the stub-name lookup table.
    #[error("kernel symbol not resolvable for the given function pointer")]
    SymbolNotResolvable,

    /// No agent matching the requested device kind was enumerated.
    #[error("no agent of the requested kind is available")]
    NoMatchingAgent,

    /// A region/heap/device allocation failed.
    #[error("allocation of {requested} bytes failed in {region}")]
    AllocationFailed {
        /// Requested size, in bytes.
        requested: usize,
        /// Human-readable name of the region or pool.
        region: &'static str,
    },

    /// An operation violated a structural invariant of the data model
    /// (self-edge, duplicate edge, buffer double-free, packet-size
    /// mismatch).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// The simulated driver reported a non-success status.
    #[error("driver error during {op}: {detail}")]
    Driver {
        /// Name of the driver operation that failed.
        op: &'static str,
        /// Driver-provided detail string.
        detail: String,
    },

    /// A malformed embedded binary image (bad magic, truncated bundle).
    #[error("malformed binary image: {0}")]
    MalformedImage(String),
}

/// Formats the `error: <op> failed at <file>:<line>` line mandated by the
/// engine's user-visible error contract, and logs it at `error!` level.
#[track_caller]
pub fn report_fatal(op: &str, err: &Error) {
    let loc = std::panic::Location::caller();
    log::error!("error: {op} failed at {}:{}: {err}", loc.file(), loc.line());
}
