//! The kernarg heap: a bucketed, free-list-backed budget for argument-buffer
//! allocations.
//!
//! Grounded on `DAGEE-lib/include/dagr/memory.h`'s `KernArgHeap`/
//! `FixedSizeHeapImpl`: requests are rounded up to a 16-byte size class, a
//! block freed by one dispatch is handed straight back out to the next
//! same-class request in O(1), and only a class with an empty free list
//! falls back to growing the slab budget and carving fresh bytes.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mem::block::MemBlock;

const KERNARG_ALIGN: usize = 16;

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[derive(Default)]
struct Bucket {
    free: Vec<MemBlock>,
}

/// Tracks an outstanding-bytes budget against a growable slab size, bucketed
/// by 16-byte-rounded size class so a deallocated block of a given class is
/// reused by the next same-class request instead of being carved again.
pub struct KernargHeap {
    slab_size: usize,
    capacity: usize,
    outstanding: usize,
    buckets: HashMap<usize, Bucket>,
}

impl KernargHeap {
    /// Creates a heap with one slab's worth of initial capacity.
    pub fn new(slab_size: usize) -> Self {
        KernargHeap { slab_size, capacity: slab_size, outstanding: 0, buckets: HashMap::new() }
    }

    fn grow(&mut self) {
        self.capacity += self.slab_size;
        log::debug!("kernarg heap grown to {} bytes", self.capacity);
    }

    /// Allocates a zeroed, 16-byte-aligned kernarg buffer of `len` bytes,
    /// rounded up to its bucket's size class.
    ///
    /// A free block of the same size class is reused if one is available.
    /// Otherwise, on first exhaustion of that class the heap grows by one
    /// slab and retries once, matching the category-2 policy; a request
    /// that still does not fit after growth fails with
    /// [`Error::AllocationFailed`].
    pub fn allocate(&mut self, len: usize) -> Result<MemBlock> {
        if len == 0 {
            return MemBlock::alloc(0, KERNARG_ALIGN, "kernarg heap");
        }
        let bucket_size = round_up(len, KERNARG_ALIGN);

        if let Some(block) = self.buckets.get_mut(&bucket_size).and_then(|b| b.free.pop()) {
            self.outstanding += bucket_size;
            // SAFETY: a block only sits in a bucket's free list while
            // unshared; popping it here is the only live handle.
            unsafe { block.as_mut_slice().fill(0) };
            return Ok(block);
        }

        if self.outstanding + bucket_size > self.capacity {
            self.grow();
            if self.outstanding + bucket_size > self.capacity {
                return Err(Error::AllocationFailed { requested: len, region: "kernarg heap" });
            }
        }
        let block = MemBlock::alloc(bucket_size, KERNARG_ALIGN, "kernarg heap")?;
        self.outstanding += bucket_size;
        Ok(block)
    }

    /// Returns `block` (originally allocated for a `len`-byte request) to
    /// its size class's free list, so the next same-class [`allocate`] call
    /// reuses it instead of carving fresh bytes.
    ///
    /// [`allocate`]: Self::allocate
    pub fn deallocate(&mut self, len: usize, block: MemBlock) {
        if len == 0 {
            return;
        }
        let bucket_size = round_up(len, KERNARG_ALIGN);
        self.outstanding = self.outstanding.saturating_sub(bucket_size);
        self.buckets.entry(bucket_size).or_default().free.push(block);
    }

    /// Bytes currently charged against the heap's capacity.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Current capacity, in bytes, across all grown slabs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_once_then_fails_on_oversized_request() {
        let mut heap = KernargHeap::new(64);
        let _a = heap.allocate(64).unwrap();
        // exhausted; next allocate triggers growth to 128, which fits 64 more.
        let _b = heap.allocate(64).unwrap();
        assert_eq!(heap.capacity(), 128);
        // a request larger than even the grown capacity still fails.
        let mut heap2 = KernargHeap::new(32);
        assert!(heap2.allocate(256).is_err());
    }

    #[test]
    fn freed_block_is_reused_by_a_same_class_request() {
        let mut heap = KernargHeap::new(64);
        let a = heap.allocate(32).unwrap();
        let a_addr = a.addr();
        heap.deallocate(32, a);
        assert_eq!(heap.outstanding(), 0);

        let b = heap.allocate(32).unwrap();
        assert_eq!(b.addr(), a_addr, "a freed block of the same size class should be reused, not reallocated");
        assert_eq!(heap.capacity(), 64, "reuse must not grow the heap");
    }

    #[test]
    fn requests_within_the_same_size_class_share_a_free_list() {
        let mut heap = KernargHeap::new(64);
        let a = heap.allocate(20).unwrap();
        let a_addr = a.addr();
        heap.deallocate(20, a);

        // 17 and 20 both round up to the 32-byte class.
        let b = heap.allocate(17).unwrap();
        assert_eq!(b.addr(), a_addr);
    }

    #[test]
    fn zero_length_requests_are_not_tracked() {
        let mut heap = KernargHeap::new(64);
        let block = heap.allocate(0).unwrap();
        assert_eq!(block.len(), 0);
        assert_eq!(heap.outstanding(), 0);
        heap.deallocate(0, block);
        assert_eq!(heap.outstanding(), 0);
    }
}
