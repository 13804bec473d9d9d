//! Coarse/fine-grained buffer allocation, used for kernel input/output
//! buffers and memcpy staging (distinct from the kernarg heap).

use crate::error::Result;
use crate::mem::block::MemBlock;
use crate::mem::region::{Region, RegionKind};

/// Allocates device I/O buffers from a [`Region`] of the given kind.
pub struct DeviceAllocator {
    region: Region,
}

impl DeviceAllocator {
    /// Binds an allocator to a region. `kind` is normally
    /// [`RegionKind::CoarseGrained`]; fine-grained is reserved for buffers a
    /// CPU task and a GPU task share without an intervening copy.
    pub fn new(region: Region) -> Self {
        debug_assert_ne!(region.kind(), RegionKind::Kernarg, "use KernargHeap for kernarg buffers");
        DeviceAllocator { region }
    }

    /// Allocates `len` zeroed bytes.
    pub fn allocate(&self, len: usize) -> Result<MemBlock> {
        self.region.allocate(len)
    }
}
