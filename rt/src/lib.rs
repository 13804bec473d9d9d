//! dagee
//!
//! The task-graph execution engine built on [`dagee_core`]'s driver
//! contract: a kernel registry that resolves symbols out of an embedded
//! binary image, argument-buffer packing, the four task-launch paradigms
//! (ordered, unordered, CPU, memcpy), the DAG scheduler that sequences them
//! by topological launch, and the out-of-core partition executor for DAGs
//! too large to fit in device memory at once.
//!
//! This crate depends on `dagee-core` the way `ocl` depends on `ocl-core`:
//! the core crate defines agents, signals, queues and packets; this crate
//! is where a caller actually builds and runs work.

pub mod dag;
pub mod error;
pub mod executor;
pub mod registry;
pub mod runtime;
pub mod task;

#[cfg(test)]
mod tests;

pub use dag::{Dag, DagExecutor, NodeId, NodeKind, Partition, PartitionExecutor};
pub use error::{report_fatal, Error, Result};
pub use executor::{CpuExecutor, MemcpyExecutor, SerialOrderedExecutor, SerialUnorderedExecutor, TaskHandle};
pub use registry::{KernelInfo, KernelRegistry};
pub use runtime::{DevicePreference, Runtime, RuntimeBuilder};
pub use task::{compute_layout, pack_args, ArgKind, ArgLayout, ArgValue, Dims};

pub use dagee_core::agent::{Agent, DeviceKind};
pub use dagee_core::signal::{Signal, SignalFlavor};
