//! Command queues: fixed-capacity ring buffers of packets, consumed in
//! order by the driver.
//!
//! Grounded on `DAGEE-lib/include/dagr/queue.h`'s `DispatchQueueSerial` and
//! `HsaQueuePoolState`. The ring holds `Arc<Packet>` slots; the write index
//! is producer-advanced (CAS loop, so multiple producer threads may share a
//! queue), the read index is driver-advanced. A queue is full exactly when
//! `write_index - read_index >= capacity`, matching the HSA AQL queue
//! invariant.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::agent::Agent;
use crate::packet::Packet;

/// Whether a queue accepts submissions from one producer thread only, or
/// must serialize concurrent producers with a CAS loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDiscipline {
    /// Exactly one thread ever calls `enqueue`; skips the CAS retry loop.
    SingleProducer,
    /// Multiple threads may call `enqueue` concurrently.
    MultiProducer,
}

struct Slot(Mutex<Option<Arc<Packet>>>);

/// A fixed power-of-two capacity ring buffer of packets.
pub struct Queue {
    agent: Agent,
    discipline: QueueDiscipline,
    capacity: u64,
    mask: u64,
    slots: Vec<Slot>,
    write_index: AtomicU64,
    read_index: AtomicU64,
    not_empty: (Mutex<()>, Condvar),
    not_full: (Mutex<()>, Condvar),
}

impl Queue {
    /// Creates a queue of the given capacity, which must be a power of two
    /// and within `[agent.min_queue_size(), agent.max_queue_size()]`.
    pub fn new(agent: Agent, capacity: u32, discipline: QueueDiscipline) -> Self {
        assert!(capacity.is_power_of_two(), "queue capacity must be a power of two");
        assert!(capacity >= agent.min_queue_size(), "queue capacity below agent minimum");
        assert!(capacity <= agent.max_queue_size(), "queue capacity exceeds agent maximum");
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, || Slot(Mutex::new(None)));
        Queue {
            agent,
            discipline,
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            slots,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            not_empty: (Mutex::new(()), Condvar::new()),
            not_full: (Mutex::new(()), Condvar::new()),
        }
    }

    /// The agent this queue dispatches on.
    pub fn agent(&self) -> Agent {
        self.agent
    }

    /// Ring capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of packets currently enqueued but not yet consumed.
    pub fn len(&self) -> u64 {
        self.write_index.load(Ordering::Acquire) - self.read_index.load(Ordering::Acquire)
    }

    /// Whether the queue holds no unconsumed packets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Reserves the next write slot, blocking the calling thread while the
    /// queue is full, then stores `packet` and signals the consumer.
    ///
    /// Returns the packet id (monotonic write index) assigned to this
    /// submission.
    pub fn enqueue(&self, packet: Arc<Packet>) -> u64 {
        let idx = match self.discipline {
            QueueDiscipline::SingleProducer => {
                self.wait_for_space();
                let idx = self.write_index.load(Ordering::Relaxed);
                self.write_index.store(idx + 1, Ordering::Release);
                idx
            }
            QueueDiscipline::MultiProducer => loop {
                self.wait_for_space();
                let idx = self.write_index.load(Ordering::Relaxed);
                if self
                    .write_index
                    .compare_exchange(idx, idx + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    break idx;
                }
            },
        };

        let slot = &self.slots[(idx & self.mask) as usize];
        *slot.0.lock().unwrap() = Some(packet);

        let _guard = self.not_empty.0.lock().unwrap();
        self.not_empty.1.notify_all();
        idx
    }

    fn wait_for_space(&self) {
        if !self.is_full() {
            return;
        }
        let mut guard = self.not_full.0.lock().unwrap();
        while self.is_full() {
            guard = self.not_full.1.wait(guard).unwrap();
        }
    }

    /// Blocks until a packet is available, then advances the read index and
    /// returns it. Called only by the driver's consumer thread for this
    /// queue.
    pub fn dequeue(&self) -> Arc<Packet> {
        loop {
            if !self.is_empty() {
                break;
            }
            let mut guard = self.not_empty.0.lock().unwrap();
            while self.is_empty() {
                guard = self.not_empty.1.wait(guard).unwrap();
            }
        }
        let idx = self.read_index.load(Ordering::Relaxed);
        let slot = &self.slots[(idx & self.mask) as usize];
        let packet = slot.0.lock().unwrap().take().expect("slot reserved by enqueue before index advanced");
        self.read_index.store(idx + 1, Ordering::Release);

        let _guard = self.not_full.0.lock().unwrap();
        self.not_full.1.notify_all();
        packet
    }
}

/// A pool of queues on one agent, handed out round-robin and never shrunk
/// below its initial watermark.
pub struct QueuePool {
    agent: Agent,
    discipline: QueueDiscipline,
    queue_capacity: u32,
    queues: Vec<Arc<Queue>>,
    next: AtomicU64,
}

impl QueuePool {
    /// Creates a pool with `watermark` queues already constructed.
    pub fn new(agent: Agent, queue_capacity: u32, discipline: QueueDiscipline, watermark: usize) -> Self {
        let queues = (0..watermark).map(|_| Arc::new(Queue::new(agent, queue_capacity, discipline))).collect();
        QueuePool { agent, discipline, queue_capacity, queues, next: AtomicU64::new(0) }
    }

    /// Number of queues currently held by the pool.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Grows the pool by one queue and returns it.
    pub fn grow(&mut self) -> Arc<Queue> {
        let q = Arc::new(Queue::new(self.agent, self.queue_capacity, self.discipline));
        self.queues.push(q.clone());
        q
    }

    /// Hands out the next queue, round-robin, growing the pool if empty.
    pub fn next_queue(&mut self) -> Arc<Queue> {
        if self.queues.is_empty() {
            return self.grow();
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) as usize % self.queues.len();
        self.queues[idx].clone()
    }

    /// All queues currently in the pool, in creation order.
    pub fn queues(&self) -> &[Arc<Queue>] {
        &self.queues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DeviceKind;
    use crate::packet::{make_barrier_and, BarrierBit, FenceScope};
    use crate::signal::{Signal, SignalFlavor};

    fn test_agent() -> Agent {
        Agent::new(0, DeviceKind::Gpu, 64)
    }

    #[test]
    fn full_and_empty_track_write_minus_read() {
        let agent = test_agent();
        let queue = Queue::new(agent, 64, QueueDiscipline::SingleProducer);
        assert!(queue.is_empty());
        for _ in 0..64 {
            let sig = Signal::new(SignalFlavor::User);
            let (pkt, hdr) = make_barrier_and(vec![], sig, FenceScope::Agent, BarrierBit::Disable);
            pkt.publish(hdr);
            queue.enqueue(Arc::new(pkt));
        }
        assert!(queue.is_full());
        queue.dequeue();
        assert!(!queue.is_full());
    }
}
