//! The raw allocation handle shared by every region kind.

use std::alloc::{self, Layout};
use std::sync::Arc;

use crate::error::{Error, Result};

struct Inner {
    ptr: *mut u8,
    len: usize,
    layout: Layout,
}

// SAFETY: the allocation is never aliased mutably except through the
// ordering guarantees the DAG executor/queue already enforce (a buffer is
// never written by two packets without an intervening signal wait), the
// same contract real device memory gives callers.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: `ptr` was allocated with `layout` in `MemBlock::alloc`
            // and has not been freed elsewhere; `MemBlock` is the sole owner
            // via `Arc`, so this runs exactly once.
            unsafe { alloc::dealloc(self.ptr, self.layout) };
        }
    }
}

/// A reference-counted handle to a raw, fixed-size allocation.
///
/// Cloning shares the same backing bytes — it models the way a device
/// pointer is copied into multiple kernarg buffers without copying the
/// buffer it points to.
#[derive(Clone)]
pub struct MemBlock {
    inner: Arc<Inner>,
}

impl MemBlock {
    /// Allocates `len` zeroed bytes aligned to `align`.
    pub fn alloc(len: usize, align: usize, region: &'static str) -> Result<MemBlock> {
        if len == 0 {
            return Ok(MemBlock { inner: Arc::new(Inner { ptr: std::ptr::NonNull::dangling().as_ptr(), len: 0, layout: Layout::from_size_align(0, align.max(1)).unwrap() }) });
        }
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| Error::AllocationFailed { requested: len, region })?;
        // SAFETY: `layout` has non-zero size, checked above.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::AllocationFailed { requested: len, region });
        }
        Ok(MemBlock { inner: Arc::new(Inner { ptr, len, layout }) })
    }

    /// Size in bytes of this allocation.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Whether this allocation is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Raw pointer to the start of the allocation. Valid for `len()` bytes.
    pub fn as_ptr(&self) -> *mut u8 {
        self.inner.ptr
    }

    /// Process-local identity, used by the host-side "who owns this buffer"
    /// bookkeeping in the DAG executor's double-free check.
    pub fn addr(&self) -> usize {
        self.inner.ptr as usize
    }

    /// Borrows the allocation as a byte slice.
    ///
    /// # Safety
    /// The caller must ensure no other thread is concurrently writing
    /// through another handle to the same block.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.inner.ptr, self.inner.len)
    }

    /// Borrows the allocation as a mutable byte slice.
    ///
    /// # Safety
    /// The caller must ensure exclusive access: no other handle to this
    /// block is being read or written concurrently.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.inner.ptr, self.inner.len)
    }
}

impl std::fmt::Debug for MemBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemBlock").field("addr", &format_args!("{:#x}", self.addr())).field("len", &self.len()).finish()
    }
}
