//! Device-visible memory: raw allocations backing kernarg buffers and
//! kernel I/O buffers.
//!
//! Grounded on `DAGEE-lib/include/dagr/memory.h`'s region abstraction. The
//! simulated backend has no separate device address space, so every
//! [`MemBlock`] is ordinary process heap memory; the region/kind split is
//! kept so a future real backend has the same seams.

mod block;
pub mod device_alloc;
pub mod kernarg_heap;
pub mod region;

pub use block::MemBlock;
pub use device_alloc::DeviceAllocator;
pub use kernarg_heap::KernargHeap;
pub use region::{Region, RegionKind};
