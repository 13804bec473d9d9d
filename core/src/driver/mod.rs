//! The driver contract: the interface between the engine and whatever
//! component actually consumes queues and executes packets.
//!
//! A real backend talks to an accelerator driver (ROCr/HSA or similar) over
//! FFI; that driver is out of scope for this crate. [`sim::SimDriver`] is the one in-tree
//! implementation: it runs every invariant a real driver would — ring
//! buffer admission, header publish/acquire ordering, signal counting,
//! barrier-AND semantics — against host threads standing in for device
//! queues, so the rest of the engine is exercised exactly as it would be
//! against real hardware.

pub mod sim;

use std::sync::Arc;

use crate::agent::Agent;
use crate::codeobj::CodeObjectAddr;
use crate::error::Result;
use crate::mem::{MemBlock, Region, RegionKind};
use crate::packet::{Packet, PacketHeader};
use crate::queue::Queue;
use crate::signal::{Signal, SignalFlavor};

/// A kernel's executable body. The simulated backend models both GPU and
/// CPU kernels as Rust closures over a kernarg byte buffer; a real backend
/// would instead hold a code-object address the device program counter
/// jumps to, which is exactly what [`CodeObjectAddr`] is kept opaque for.
pub type KernelBody = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The operations the rest of the engine needs from whatever is consuming
/// queues and running kernels.
pub trait Driver: Send + Sync {
    /// Agents enumerated by this driver.
    fn agents(&self) -> &[Agent];

    /// Registers a kernel body under a freshly allocated code-object
    /// address and returns it.
    fn register_kernel_body(&self, body: KernelBody) -> CodeObjectAddr;

    /// Allocates a completion signal of the given flavor.
    fn allocate_signal(&self, flavor: SignalFlavor) -> Signal;

    /// Returns a signal to its flavor's pool once its last observer has
    /// finished waiting on it.
    fn deallocate_signal(&self, flavor: SignalFlavor, signal: Signal);

    /// Allocates a kernarg buffer from the shared kernarg heap.
    fn allocate_kernarg(&self, len: usize) -> Result<MemBlock>;

    /// Returns a kernarg buffer (originally allocated for a `len`-byte
    /// request) to the heap's free list once its dispatch has finished
    /// reading it.
    fn deallocate_kernarg(&self, len: usize, block: MemBlock);

    /// Returns a region handle for `agent`/`kind`; allocations through it go
    /// straight to the host allocator in the simulated backend.
    fn region(&self, agent: Agent, kind: RegionKind) -> Region;

    /// Starts (if not already running) a consumer for `queue` and submits
    /// `packet`. `header` must already be published on `packet` via
    /// [`Packet::publish`] before this call.
    fn submit(&self, queue: &Arc<Queue>, packet: Arc<Packet>, header: PacketHeader);
}
