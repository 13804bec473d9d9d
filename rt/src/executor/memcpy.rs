//! The memcpy executor: driver-mediated copies, launched the same way as
//! any other task so they can appear as DAG nodes in a mixed-paradigm graph.
//!
//! Grounded on `DAGEE-lib/include/dagr/memory.h`'s async-copy path, which is
//! itself just a dispatch against a copy-engine "kernel" — modeled here with
//! an ordinary kernel body that does the copy directly, since the simulated
//! backend has no separate DMA engine to target.

use std::sync::Arc;

use dagee_core::agent::Agent;
use dagee_core::driver::Driver;
use dagee_core::mem::MemBlock;
use dagee_core::packet::{make_barrier_tree, make_dispatch, BarrierBit, FenceScope};
use dagee_core::queue::{Queue, QueueDiscipline};
use dagee_core::signal::{Signal, SignalFlavor};

use crate::error::{Error, Result};
use crate::executor::TaskHandle;

/// Launches host-to-device, device-to-host, or device-to-device copies.
pub struct MemcpyExecutor {
    driver: Arc<dyn Driver>,
    queue: Arc<Queue>,
}

impl MemcpyExecutor {
    pub fn new(driver: Arc<dyn Driver>, agent: Agent, queue_capacity: u32) -> Self {
        let queue = Arc::new(Queue::new(agent, queue_capacity, QueueDiscipline::SingleProducer));
        MemcpyExecutor { driver, queue }
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

    /// Copies `len` bytes from `src` to `dst`, after a barrier on `preds`.
    pub fn launch(&self, src: MemBlock, dst: MemBlock, len: usize, preds: &[Signal], scope: FenceScope) -> Result<TaskHandle> {
        if src.len() < len {
            return Err(Error::BufferSizeMismatch { expected: len, got: src.len() });
        }
        if dst.len() < len {
            return Err(Error::BufferSizeMismatch { expected: len, got: dst.len() });
        }

        self.gate_on(preds);
        let completion = self.driver.allocate_signal(SignalFlavor::InterruptCapable);
        let code_object = self.driver.register_kernel_body(Arc::new(move |_kernarg: &[u8]| {
            // SAFETY: the barrier above guarantees every producer of `src`
            // and every prior consumer of `dst` has already completed.
            let src_bytes = unsafe { src.as_slice() };
            let dst_bytes = unsafe { dst.as_mut_slice() };
            dst_bytes[..len].copy_from_slice(&src_bytes[..len]);
        }));
        let kernarg = self.driver.allocate_kernarg(0)?;
        let (pkt, hdr) = make_dispatch((1, 1, 1), (1, 1, 1), code_object, kernarg, completion.clone(), scope, BarrierBit::Enable);
        let pkt = Arc::new(pkt);
        pkt.publish(hdr);
        self.driver.submit(&self.queue, pkt, hdr);
        Ok(TaskHandle { signal: completion })
    }
}
