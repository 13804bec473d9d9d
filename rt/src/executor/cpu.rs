//! The CPU executor: submits host callbacks through the same queue/packet
//! machinery as a GPU dispatch, so CPU tasks can sit in a mixed-paradigm DAG
//! without a separate scheduling path.
//!
//! Grounded on `DAGEE-lib/include/dagr/kernel.h`'s CPU-agent specialization,
//! which wraps a user lambda in a trampoline that dereferences its pointer
//! arguments before calling it — here, the trampoline is handed the task's
//! device buffers directly rather than re-deriving them from raw kernarg
//! bytes, since the simulated backend never leaves process memory anyway.

use std::sync::Arc;

use dagee_core::agent::Agent;
use dagee_core::driver::Driver;
use dagee_core::mem::MemBlock;
use dagee_core::packet::{make_barrier_tree, make_dispatch, BarrierBit, FenceScope};
use dagee_core::queue::{Queue, QueueDiscipline};
use dagee_core::signal::{Signal, SignalFlavor};

use crate::error::Result;
use crate::executor::TaskHandle;
use crate::task::Dims;

/// A host callback run as a task: it receives the (already-dereferenced)
/// buffers it was launched with.
pub type CpuBody = Arc<dyn Fn(&[MemBlock]) + Send + Sync>;

/// Launches CPU callbacks on a single serial queue.
pub struct CpuExecutor {
    driver: Arc<dyn Driver>,
    queue: Arc<Queue>,
}

impl CpuExecutor {
    pub fn new(driver: Arc<dyn Driver>, agent: Agent, queue_capacity: u32) -> Self {
        let queue = Arc::new(Queue::new(agent, queue_capacity, QueueDiscipline::SingleProducer));
        CpuExecutor { driver, queue }
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

    /// Launches `callback` with `buffers`, after a barrier on `preds`.
    pub fn launch(&self, callback: CpuBody, buffers: Vec<MemBlock>, preds: &[Signal], scope: FenceScope) -> Result<TaskHandle> {
        self.gate_on(preds);
        let completion = self.driver.allocate_signal(SignalFlavor::InterruptCapable);
        let trampoline_buffers = buffers.clone();
        let code_object = self.driver.register_kernel_body(Arc::new(move |_kernarg: &[u8]| {
            (callback)(&trampoline_buffers);
        }));
        let kernarg = self.driver.allocate_kernarg(0)?;
        let (pkt, hdr) = make_dispatch((1, 1, 1), (1, 1, 1), code_object, kernarg, completion.clone(), scope, BarrierBit::Enable);
        let pkt = Arc::new(pkt);
        pkt.publish(hdr);
        self.driver.submit(&self.queue, pkt, hdr);
        Ok(TaskHandle { signal: completion })
    }
}
