//! The ordered executor: one serial queue, every dispatch carries the
//! barrier bit so the driver strictly sequences them.
//!
//! Grounded on `DAGEE-lib/include/dagr/dispatchQueue.h`'s
//! `DispatchQueueSerial` and the batch-submission path in `dagr/kernel.h`,
//! where only the last packet of a batch uses the caller-visible completion
//! signal and system-wide fence scope.

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

/// Launches tasks one at a time, or as a batch, onto a single
/// single-producer queue.
pub struct SerialOrderedExecutor {
    driver: Arc<dyn Driver>,
    queue: Arc<Queue>,
}

impl SerialOrderedExecutor {
    pub fn new(driver: Arc<dyn Driver>, agent: Agent, queue_capacity: u32) -> Self {
        let queue = Arc::new(Queue::new(agent, queue_capacity, QueueDiscipline::SingleProducer));
        SerialOrderedExecutor { driver, queue }
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    fn gate_on(&self, preds: &[Signal]) {
        if preds.is_empty() {
            return;
        }
        let throwaway = self.driver.allocate_signal(SignalFlavor::User);
        let driver = &self.driver;
        for (pkt, hdr) in make_barrier_tree(preds, throwaway, FenceScope::Agent, || driver.allocate_signal(SignalFlavor::User)) {
            let pkt = Arc::new(pkt);
            pkt.publish(hdr);
            self.driver.submit(&self.queue, pkt, hdr);
        }
    }

    /// Launches a single task, optionally after a barrier waiting on
    /// `preds`. `scope` controls whether the completion fence is
    /// agent-local or system-wide; callers launching a standalone task
    /// (not inside a DAG) should pass [`FenceScope::System`].
    pub fn launch_task(
        &self,
        kernel: &KernelInfo,
        kernarg: MemBlock,
        dims: Dims,
        preds: &[Signal],
        scope: FenceScope,
    ) -> TaskHandle {
        self.gate_on(preds);
        let completion = self.driver.allocate_signal(SignalFlavor::InterruptCapable);
        let (pkt, hdr) = make_dispatch(dims.blocks, dims.threads_per_block, kernel.code_object, kernarg, completion.clone(), scope, BarrierBit::Enable);
        let pkt = Arc::new(pkt);
        pkt.publish(hdr);
        self.driver.submit(&self.queue, pkt, hdr);
        TaskHandle { signal: completion }
    }

    /// Starts a batch: a sequence of same-queue dispatches sharing one
    /// terminal completion signal.
    pub fn start_batch(&self) -> SerialBatch<'_> {
        SerialBatch { executor: self, pending: Vec::new() }
    }
}

/// A batch of launches on a [`SerialOrderedExecutor`], buffered until
/// [`finish`](SerialBatch::finish) so the last one added can be marked
/// terminal.
pub struct SerialBatch<'a> {
    executor: &'a SerialOrderedExecutor,
    pending: Vec<(Arc<KernelInfo>, MemBlock, Dims)>,
}

impl<'a> SerialBatch<'a> {
    pub fn add(&mut self, kernel: Arc<KernelInfo>, kernarg: MemBlock, dims: Dims) {
        self.pending.push((kernel, kernarg, dims));
    }

    /// Submits the batch: a leading no-op gate dispatch (so the queue
    /// always starts from a known, barrier-ordered state, matching the
    /// partition executor's gate pattern generalized to plain batches),
    /// then every queued task in order. Every packet but the last uses the
    /// null signal and agent-scope fences; the last uses the batch's
    /// terminal signal and system-wide scope.
    pub fn finish(self) -> Result<TaskHandle> {
        let terminal = self.executor.driver.allocate_signal(SignalFlavor::InterruptCapable);
        let null = Signal::null();

        if let Some((first_kernel, _, first_dims)) = self.pending.first() {
            let gate_kernarg = self.executor.driver.allocate_kernarg(0)?;
            let (pkt, hdr) = make_dispatch(first_dims.blocks, first_dims.threads_per_block, first_kernel.code_object, gate_kernarg, null.clone(), FenceScope::Agent, BarrierBit::Enable);
            let pkt = Arc::new(pkt);
            pkt.publish(hdr);
            self.executor.driver.submit(&self.executor.queue, pkt, hdr);
        }

        let n = self.pending.len();
        for (i, (kernel, kernarg, dims)) in self.pending.into_iter().enumerate() {
            let is_last = i + 1 == n;
            let (signal, scope) = if is_last { (terminal.clone(), FenceScope::System) } else { (null.clone(), FenceScope::Agent) };
            let (pkt, hdr) = make_dispatch(dims.blocks, dims.threads_per_block, kernel.code_object, kernarg, signal, scope, BarrierBit::Enable);
            let pkt = Arc::new(pkt);
            pkt.publish(hdr);
            self.executor.driver.submit(&self.executor.queue, pkt, hdr);
        }

        Ok(TaskHandle { signal: terminal })
    }
}
