//! Packets: fixed-size records submitted to hardware command queues.
//!
//! Grounded on `DAGEE-lib/include/dagr/kernel.h`'s `PacketFactory` and
//! `dagr/queue.h`'s `AqlPacket` union. The header word is modeled as an
//! `AtomicU32` published with a release store only after every other field
//! has been written: the header must never publish before every body field
//! is committed.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::codeobj::CodeObjectAddr;
use crate::mem::MemBlock;
use crate::signal::Signal;

/// The kind of a packet, encoded in its header's low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// A kernel-dispatch packet.
    KernelDispatch,
    /// A barrier-AND packet.
    BarrierAnd,
}

/// Memory-visibility radius of a packet's acquire/release operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceScope {
    /// Agent (device-local) scope: sufficient for GPU-only producer/consumer
    /// pairs, used for non-terminal tasks.
    Agent,
    /// System (host-visible) scope: required whenever a host thread will
    /// read the result; used for the terminal task of a batch or DAG.
    System,
}

/// Whether the hardware must execute this packet strictly after the
/// previous one in the same queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierBit {
    Enable,
    Disable,
}

/// The packet header: kind, acquire/release fence scopes, and barrier bit,
/// packed into a single word so it can be published atomically.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub kind: PacketKind,
    pub acquire_scope: FenceScope,
    pub release_scope: FenceScope,
    pub barrier: BarrierBit,
}

impl PacketHeader {
    fn encode(self) -> u32 {
        let kind = match self.kind {
            PacketKind::KernelDispatch => 1u32,
            PacketKind::BarrierAnd => 2u32,
        };
        let acquire = match self.acquire_scope {
            FenceScope::Agent => 0u32,
            FenceScope::System => 1u32,
        };
        let release = match self.release_scope {
            FenceScope::Agent => 0u32,
            FenceScope::System => 1u32,
        };
        let barrier = match self.barrier {
            BarrierBit::Enable => 1u32,
            BarrierBit::Disable => 0u32,
        };
        kind | (acquire << 4) | (release << 8) | (barrier << 12)
    }
}

/// Body of a kernel-dispatch packet.
#[derive(Debug, Clone)]
pub struct DispatchBody {
    pub grid_size: (u32, u32, u32),
    pub workgroup_size: (u32, u32, u32),
    pub kernel_object: CodeObjectAddr,
    pub kernarg: MemBlock,
    pub completion_signal: Signal,
}

/// Up to five dependency signals; the tree-reduction in
/// [`crate::packet::barrier_tree_size`]/[`make_barrier_tree`] keeps every
/// barrier packet within this bound.
pub const BARRIER_PKT_NUM_PREDS: usize = 5;

/// Body of a barrier-AND packet.
#[derive(Debug, Clone)]
pub struct BarrierAndBody {
    pub dep_signals: Vec<Signal>,
    pub completion_signal: Signal,
}

/// A fully assembled packet: header plus kind-specific body.
///
/// The header is stored separately as an atomic word so that
/// [`Packet::publish`] can perform its release store without requiring the
/// body to itself be `Copy`.
pub struct Packet {
    header: AtomicU32,
    pub body: PacketBody,
}

#[derive(Debug, Clone)]
pub enum PacketBody {
    Dispatch(DispatchBody),
    BarrierAnd(BarrierAndBody),
}

impl Packet {
    fn zeroed(body: PacketBody) -> Self {
        Packet { header: AtomicU32::new(0), body }
    }

    /// Publishes the header with a release store. Must be called only after
    /// every body field has been written; the driver's consumer thread reads
    /// the header with an acquire load before touching the body.
    pub fn publish(&self, header: PacketHeader) {
        self.header.store(header.encode(), Ordering::Release);
    }

    /// Acquire-loads the header, returning `None` until [`publish`] has run.
    ///
    /// [`publish`]: Packet::publish
    pub fn header_word(&self) -> Option<u32> {
        match self.header.load(Ordering::Acquire) {
            0 => None,
            word => Some(word),
        }
    }
}

/// Assembles a kernel-dispatch packet.
///
/// Grid dimensions are `blocks * threads_per_block` componentwise, matching
/// `PacketFactory::init`'s `grid_size_x = numBlks.x * threadsPerBlk.x`.
#[allow(clippy::too_many_arguments)]
pub fn make_dispatch(
    blocks: (u32, u32, u32),
    threads_per_block: (u32, u32, u32),
    kernel_object: CodeObjectAddr,
    kernarg: MemBlock,
    completion_signal: Signal,
    scope: FenceScope,
    barrier: BarrierBit,
) -> (Packet, PacketHeader) {
    let grid_size = (
        blocks.0 * threads_per_block.0,
        blocks.1 * threads_per_block.1,
        blocks.2 * threads_per_block.2,
    );
    let body = DispatchBody { grid_size, workgroup_size: threads_per_block, kernel_object, kernarg, completion_signal };
    let header = PacketHeader { kind: PacketKind::KernelDispatch, acquire_scope: scope, release_scope: scope, barrier };
    (Packet::zeroed(PacketBody::Dispatch(body)), header)
}

/// Assembles a barrier-AND packet with up to [`BARRIER_PKT_NUM_PREDS`]
/// dependency signals.
pub fn make_barrier_and(
    dep_signals: Vec<Signal>,
    completion_signal: Signal,
    scope: FenceScope,
    barrier: BarrierBit,
) -> (Packet, PacketHeader) {
    assert!(dep_signals.len() <= BARRIER_PKT_NUM_PREDS, "barrier packets hold at most {BARRIER_PKT_NUM_PREDS} signals");
    let body = BarrierAndBody { dep_signals, completion_signal };
    let header = PacketHeader { kind: PacketKind::BarrierAnd, acquire_scope: scope, release_scope: scope, barrier };
    (Packet::zeroed(PacketBody::BarrierAnd(body)), header)
}

/// How many barrier packets a tree reduction needs to collapse `num_preds`
/// predecessors into a single terminal barrier. Zero predecessors need no
/// barrier at all; otherwise this walks the same level-by-level reduction
/// [`make_barrier_tree`] performs, stopping once a level's own size (not
/// the packet count it divides down to) is already within
/// [`BARRIER_PKT_NUM_PREDS`] — that level's packet is the root.
pub fn barrier_tree_size(num_preds: usize) -> usize {
    if num_preds == 0 {
        return 0;
    }
    let mut total = 0usize;
    let mut level = num_preds;
    loop {
        let packets_this_level = level.div_ceil(BARRIER_PKT_NUM_PREDS);
        total += packets_this_level;
        if level <= BARRIER_PKT_NUM_PREDS {
            break;
        }
        level = packets_this_level;
    }
    total
}

/// Builds a tree of barrier-AND packets reducing `preds` to a single root
/// packet that signals `root_completion` once every original predecessor
/// has reached 0.
///
/// Each chunk's size is `min(BARRIER_PKT_NUM_PREDS, numPreds - i)` —
/// subtracting the other way round underflows and must not be reintroduced.
pub fn make_barrier_tree(
    preds: &[Signal],
    root_completion: Signal,
    scope: FenceScope,
    mut alloc_signal: impl FnMut() -> Signal,
) -> Vec<(Packet, PacketHeader)> {
    if preds.len() < 2 {
        // Zero or one predecessor: a single barrier packet suffices, no
        // intermediate tree needed.
        let (pkt, hdr) = make_barrier_and(preds.to_vec(), root_completion, scope, BarrierBit::Enable);
        return vec![(pkt, hdr)];
    }

    let mut packets = Vec::new();
    let mut level = preds.to_vec();

    loop {
        let is_final_level = level.len() <= BARRIER_PKT_NUM_PREDS;
        let mut next_level = Vec::new();

        let mut i = 0usize;
        while i < level.len() {
            let remaining = level.len() - i;
            let chunk_len = remaining.min(BARRIER_PKT_NUM_PREDS);
            let chunk = level[i..i + chunk_len].to_vec();

            let completion = if is_final_level && next_level.is_empty() && i + chunk_len == level.len() {
                root_completion.clone()
            } else {
                alloc_signal()
            };

            next_level.push(completion.clone());
            let (pkt, hdr) = make_barrier_and(chunk, completion, scope, BarrierBit::Enable);
            packets.push((pkt, hdr));

            i += chunk_len;
        }

        if is_final_level {
            break;
        }
        level = next_level;
    }

    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalFlavor;

    #[test]
    fn barrier_tree_size_matches_formula() {
        assert_eq!(barrier_tree_size(0), 0);
        assert_eq!(barrier_tree_size(1), 1);
        assert_eq!(barrier_tree_size(4), 1);
        assert_eq!(barrier_tree_size(5), 1);
        assert_eq!(barrier_tree_size(6), 3);
        assert_eq!(barrier_tree_size(25), 6);
        assert_eq!(barrier_tree_size(1024), 258);
    }

    #[test]
    fn barrier_tree_size_matches_make_barrier_tree_packet_count() {
        for &n in &[1usize, 2, 4, 5, 6, 7, 25, 64, 1024] {
            let preds: Vec<Signal> = (0..n).map(|_| Signal::new(SignalFlavor::User)).collect();
            let root = Signal::new(SignalFlavor::User);
            let packets = make_barrier_tree(&preds, root, FenceScope::Agent, || Signal::new(SignalFlavor::User));
            assert_eq!(packets.len(), barrier_tree_size(n), "mismatch for n={n}");
        }
    }

    /// Every barrier-AND packet holds at most `BARRIER_PKT_NUM_PREDS`
    /// dependency signals (`make_barrier_and`'s own assert would panic
    /// otherwise). This is the case the subtraction-order bug in the
    /// original chunk-size expression would have produced a negative (and
    /// thus panicking) chunk length for, since 7 predecessors need more
    /// than one level of reduction.
    #[test]
    fn barrier_tree_chunks_never_exceed_packet_capacity() {
        let preds: Vec<Signal> = (0..7).map(|_| Signal::new(SignalFlavor::User)).collect();
        let root = Signal::new(SignalFlavor::User);
        let packets = make_barrier_tree(&preds, root, FenceScope::Agent, || Signal::new(SignalFlavor::User));

        assert_eq!(packets.len(), barrier_tree_size(7));
        for (packet, _) in &packets {
            if let PacketBody::BarrierAnd(body) = &packet.body {
                assert!(body.dep_signals.len() <= BARRIER_PKT_NUM_PREDS);
            }
        }
    }
}
