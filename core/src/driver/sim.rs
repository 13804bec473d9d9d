//! The simulated backend: host threads standing in for device queue
//! consumers, and Rust closures standing in for compiled kernel code
//! objects.
//!
//! One background thread is spawned per queue the first time a packet is
//! submitted to it; the thread dequeues packets in order (the same order a
//! real device's command processor would), waits for the packet header to
//! be published, and executes the packet's body. This is the engine's
//! simulation boundary: everything upstream of this file — admission,
//! ordering, signal counting, barrier-AND reduction — runs unmodified
//! against real concurrency primitives.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::agent::Agent;
use crate::codeobj::CodeObjectAddr;
use crate::driver::{Driver, KernelBody};
use crate::error::Result;
use crate::mem::{KernargHeap, MemBlock, Region, RegionKind};
use crate::packet::{PacketBody, PacketHeader};
use crate::packet::Packet;
use crate::queue::Queue;
use crate::signal::{Signal, SignalFlavor, SignalPool};

const KERNARG_SLAB_BYTES: usize = 1 << 20;

struct Inner {
    agents: Vec<Agent>,
    next_code_addr: AtomicU64,
    bodies: Mutex<HashMap<CodeObjectAddr, KernelBody>>,
    signal_pools: Mutex<HashMap<SignalFlavor, SignalPool>>,
    kernarg_heap: Mutex<KernargHeap>,
    consumers_spawned: Mutex<HashSet<usize>>,
}

/// The in-tree [`Driver`] implementation, backed by host threads.
#[derive(Clone)]
pub struct SimDriver {
    inner: Arc<Inner>,
}

impl SimDriver {
    /// Creates a driver exposing the given agents. Signal pools and the
    /// kernarg heap start empty and grow on first use.
    pub fn new(agents: Vec<Agent>) -> SimDriver {
        SimDriver {
            inner: Arc::new(Inner {
                agents,
                next_code_addr: AtomicU64::new(1),
                bodies: Mutex::new(HashMap::new()),
                signal_pools: Mutex::new(HashMap::new()),
                kernarg_heap: Mutex::new(KernargHeap::new(KERNARG_SLAB_BYTES)),
                consumers_spawned: Mutex::new(HashSet::new()),
            }),
        }
    }

    fn ensure_consumer(&self, queue: &Arc<Queue>) {
        let key = Arc::as_ptr(queue) as usize;
        let mut spawned = self.inner.consumers_spawned.lock().unwrap();
        if spawned.contains(&key) {
            return;
        }
        spawned.insert(key);
        drop(spawned);

        let inner = self.inner.clone();
        let queue = queue.clone();
        thread::Builder::new()
            .name(format!("dagee-sim-queue-{key:x}"))
            .spawn(move || consumer_loop(inner, queue))
            .expect("failed to spawn simulated queue consumer thread");
    }
}

fn consumer_loop(inner: Arc<Inner>, queue: Arc<Queue>) {
    loop {
        let packet = queue.dequeue();
        while packet.header_word().is_none() {
            std::hint::spin_loop();
        }
        execute(&inner, &packet);
    }
}

fn execute(inner: &Inner, packet: &Packet) {
    match &packet.body {
        PacketBody::Dispatch(d) => {
            let body = inner.bodies.lock().unwrap().get(&d.kernel_object).cloned();
            match body {
                Some(body) => {
                    // SAFETY: the packet's producer finished writing the
                    // kernarg buffer before publishing the header, and no
                    // other packet reads/writes it until this one signals
                    // completion.
                    let args = unsafe { d.kernarg.as_slice() };
                    body(args);
                }
                None => log::error!("dispatch packet references unregistered kernel object {:?}", d.kernel_object),
            }
            // The kernarg buffer is done being read; hand it back to the
            // heap's free list so the next same-size dispatch reuses it.
            inner.kernarg_heap.lock().unwrap().deallocate(d.kernarg.len(), d.kernarg.clone());
            d.completion_signal.signal_one();
        }
        PacketBody::BarrierAnd(b) => {
            for dep in &b.dep_signals {
                dep.wait();
            }
            b.completion_signal.signal_one();
        }
    }
}

impl Driver for SimDriver {
    fn agents(&self) -> &[Agent] {
        &self.inner.agents
    }

    fn register_kernel_body(&self, body: KernelBody) -> CodeObjectAddr {
        let addr = CodeObjectAddr(self.inner.next_code_addr.fetch_add(1, Ordering::Relaxed));
        self.inner.bodies.lock().unwrap().insert(addr, body);
        addr
    }

    fn allocate_signal(&self, flavor: SignalFlavor) -> Signal {
        let mut pools = self.inner.signal_pools.lock().unwrap();
        pools.entry(flavor).or_insert_with(|| SignalPool::new(flavor)).allocate()
    }

    fn deallocate_signal(&self, flavor: SignalFlavor, signal: Signal) {
        let mut pools = self.inner.signal_pools.lock().unwrap();
        pools.entry(flavor).or_insert_with(|| SignalPool::new(flavor)).deallocate(signal);
    }

    fn allocate_kernarg(&self, len: usize) -> Result<MemBlock> {
        self.inner.kernarg_heap.lock().unwrap().allocate(len)
    }

    fn deallocate_kernarg(&self, len: usize, block: MemBlock) {
        self.inner.kernarg_heap.lock().unwrap().deallocate(len, block);
    }

    fn region(&self, agent: Agent, kind: RegionKind) -> Region {
        Region::new(agent, kind)
    }

    fn submit(&self, queue: &Arc<Queue>, packet: Arc<Packet>, header: PacketHeader) {
        debug_assert!(packet.header_word().is_some(), "packet must be published before submit");
        let _ = header;
        self.ensure_consumer(queue);
        queue.enqueue(packet);
    }
}
