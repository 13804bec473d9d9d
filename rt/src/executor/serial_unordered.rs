//! The unordered executor: up to [`MAX_QUEUES`] serial queues, round-robin
//! assigned, with no sequencing promised between tasks routed to different
//! queues.
//!
//! Grounded on `DAGEE-lib/include/dagr/dispatchQueue.h`'s
//! `DispatchQueuePool` and the batch-join pattern in `dagr/kernel.h`: each
//! queue accumulates its own counting completion signal, and a single
//! barrier-AND (or barrier tree, for more than
//! [`dagee_core::packet::BARRIER_PKT_NUM_PREDS`] queues) reduces all of them
//! into one terminal signal.

use std::sync::Arc;

use dagee_core::agent::Agent;
use dagee_core::driver::Driver;
use dagee_core::mem::MemBlock;
use dagee_core::packet::{make_barrier_tree, make_dispatch, BarrierBit, FenceScope};
use dagee_core::queue::{Queue, QueueDiscipline};
use dagee_core::signal::{Signal, SignalFlavor};

use crate::error::Result;
use crate::executor::TaskHandle;
use crate::registry::KernelInfo;
use crate::task::Dims;

/// Queue-pool size ceiling; a barrier tree over more preds than this just
/// grows an extra level, so the limit is a practical default rather than a
/// hard architectural one.
pub const MAX_QUEUES: usize = 64;

/// Round-robins tasks across a fixed pool of serial queues.
pub struct SerialUnorderedExecutor {
    driver: Arc<dyn Driver>,
    queues: Vec<Arc<Queue>>,
}

impl SerialUnorderedExecutor {
    pub fn new(driver: Arc<dyn Driver>, agent: Agent, queue_capacity: u32, num_queues: usize) -> Self {
        assert!(num_queues >= 1 && num_queues <= MAX_QUEUES, "unordered executor supports 1..={MAX_QUEUES} queues");
        let queues = (0..num_queues).map(|_| Arc::new(Queue::new(agent, queue_capacity, QueueDiscipline::SingleProducer))).collect();
        SerialUnorderedExecutor { driver, queues }
    }

    pub fn queues(&self) -> &[Arc<Queue>] {
        &self.queues
    }

    /// Starts a batch whose tasks will be distributed round-robin across
    /// this executor's queues.
    pub fn start_batch(&self) -> UnorderedBatch<'_> {
        UnorderedBatch { executor: self, pending: vec![Vec::new(); self.queues.len()], next: 0 }
    }
}

/// A batch on a [`SerialUnorderedExecutor`]. Dispatches are buffered per
/// queue until [`finish`](UnorderedBatch::finish), so each queue's counting
/// signal can be initialized to its final task count before any task can
/// possibly complete and decrement it.
pub struct UnorderedBatch<'a> {
    executor: &'a SerialUnorderedExecutor,
    pending: Vec<Vec<(Arc<KernelInfo>, MemBlock, Dims)>>,
    next: usize,
}

impl<'a> UnorderedBatch<'a> {
    /// Inserts a barrier depending on `dep` at the front of every queue in
    /// the pool, so every task in this batch implicitly waits on `dep`
    /// without the caller having to thread it through each `add` call.
    pub fn start_with_dep(&mut self, dep: &Signal) {
        for queue in &self.executor.queues {
            let done = self.executor.driver.allocate_signal(SignalFlavor::User);
            let (pkt, hdr) = dagee_core::packet::make_barrier_and(vec![dep.clone()], done, FenceScope::Agent, BarrierBit::Enable);
            let pkt = Arc::new(pkt);
            pkt.publish(hdr);
            self.executor.driver.submit(queue, pkt, hdr);
        }
    }

    /// Queues a task for round-robin assignment to one of the pool's
    /// queues.
    pub fn add(&mut self, kernel: Arc<KernelInfo>, kernarg: MemBlock, dims: Dims) {
        let idx = self.next % self.executor.queues.len();
        self.next += 1;
        self.pending[idx].push((kernel, kernarg, dims));
    }

    /// Submits every queued task, one per-queue counting signal, and the
    /// barrier tree reducing those counters into the batch's terminal
    /// signal.
    pub fn finish(mut self) -> Result<TaskHandle> {
        let mut per_queue_signals = Vec::with_capacity(self.executor.queues.len());

        for (idx, queue) in self.executor.queues.iter().enumerate() {
            let tasks = std::mem::take(&mut self.pending[idx]);
            let counter = self.executor.driver.allocate_signal(SignalFlavor::User);
            counter.store(tasks.len() as i64);
            for (kernel, kernarg, dims) in tasks {
                let (pkt, hdr) = make_dispatch(dims.blocks, dims.threads_per_block, kernel.code_object, kernarg, counter.clone(), FenceScope::Agent, BarrierBit::Enable);
                let pkt = Arc::new(pkt);
                pkt.publish(hdr);
                self.executor.driver.submit(queue, pkt, hdr);
            }
            per_queue_signals.push(counter);
        }

        let terminal = self.executor.driver.allocate_signal(SignalFlavor::InterruptCapable);
        let driver = &self.executor.driver;
        let packets = make_barrier_tree(&per_queue_signals, terminal.clone(), FenceScope::System, || driver.allocate_signal(SignalFlavor::User));
        for (pkt, hdr) in packets {
            let pkt = Arc::new(pkt);
            pkt.publish(hdr);
            self.executor.driver.submit(&self.executor.queues[0], pkt, hdr);
        }

        Ok(TaskHandle { signal: terminal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagee_core::agent::DeviceKind;
    use dagee_core::driver::sim::SimDriver;

    #[test]
    fn empty_queue_counter_does_not_block_the_barrier() {
        // A counter initialized to 0 (no tasks routed to that queue) must
        // already satisfy the barrier-AND wait, matching the "reaches 0 or
        // below" completion rule in `Signal::wait`.
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new(vec![Agent::new(0, DeviceKind::Gpu, 64)]));
        let sig = driver.allocate_signal(SignalFlavor::User);
        sig.store(0);
        sig.wait();
    }
}
