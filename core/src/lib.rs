//! dagee-core
//!
//! The driver-contract layer of the engine: agents, completion signals,
//! command queues, packets, the binary-image loader, and device memory.
//! None of this talks to a real accelerator driver directly — it defines
//! the contract a driver must satisfy and ships one in-tree implementation,
//! [`driver::sim::SimDriver`], that satisfies it with host threads.
//!
//! Higher-level concerns — the kernel registry, argument packing, the
//! per-paradigm executors, and the DAG scheduler — live in the `dagee`
//! crate, which depends on this one the way `ocl` depends on `ocl-core`.
//!
//! ## Safety
//!
//! Kernel bodies run as ordinary Rust closures over raw kernarg and device
//! buffers (see [`mem`]). The guarantee this crate makes is the same one a
//! real backend makes: if a kernel corrupts memory, the fault lies within
//! the kernel. No attempt is made to sanitize or sandbox kernel bodies.

pub mod agent;
pub mod binimage;
pub mod codeobj;
pub mod driver;
pub mod error;
pub mod mem;
pub mod packet;
pub mod queue;
pub mod signal;

#[cfg(test)]
mod tests;

pub use agent::{Agent, DeviceKind};
pub use codeobj::CodeObjectAddr;
pub use error::{report_fatal, Error, Result};
pub use signal::{Signal, SignalFlavor, SignalPool};

/// Maximum number of agents this engine will enumerate, mirroring the
/// HSA_MAX_AGENTS-style bound the original sources assume.
pub const DEVICES_MAX: u32 = 64;
