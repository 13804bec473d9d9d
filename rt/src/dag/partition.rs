//! The out-of-core partition executor: runs a DAG too large to fit in
//! device memory all at once by tiling it into partitions, each moved
//! through a small rotating pool of device-buffer slots.
//!
//! Grounded on `DAGEE-lib/include/dagr/taskGraph.h`'s partitioned execution
//! path: each partition is a gate barrier (waiting on predecessor
//! partitions' completion), a fan-out of host-to-device copies into that
//! partition's assigned slot, the partition's own inner task DAG rooted
//! after those copies, a fan-out of device-to-host copies back out, and a
//! sink barrier other partitions can depend on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use dagee_core::mem::MemBlock;
use dagee_core::packet::FenceScope;
use dagee_core::signal::Signal;

use crate::dag::{Dag, DagExecutor};
use crate::error::{Error, Result};
use crate::executor::MemcpyExecutor;

/// One tile of an out-of-core DAG: its own inner task graph plus the
/// host-resident buffers that must be staged to/from a device slot before
/// and after it runs.
pub struct Partition {
    /// Host blocks copied in before `inner` runs, and copied back out after.
    pub host_blocks: Vec<MemBlock>,
    /// Device-sized scratch blocks, one per `host_blocks` entry, reused
    /// across partitions sharing the same rotating slot.
    pub device_blocks: Vec<MemBlock>,
    pub inner: Dag,
}

/// Runs a sequence of [`Partition`]s, respecting partition-level edges,
/// over a fixed number of rotating device-buffer slots.
pub struct PartitionExecutor<'a> {
    dag_executor: &'a DagExecutor,
    memcpy: &'a MemcpyExecutor,
    num_slots: usize,
}

impl<'a> PartitionExecutor<'a> {
    pub fn new(dag_executor: &'a DagExecutor, memcpy: &'a MemcpyExecutor, num_slots: usize) -> Result<Self> {
        if num_slots == 0 {
            return Err(Error::NoPartitionSlots);
        }
        Ok(PartitionExecutor { dag_executor, memcpy, num_slots })
    }

    /// Executes `partitions` in the order implied by `edges` (pairs of
    /// partition indices, `from -> to`), returning each partition's sink
    /// completion signal in partition-index order.
    pub fn execute(&self, partitions: &[Partition], edges: &[(usize, usize)]) -> Result<Vec<Signal>> {
        let n = partitions.len();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(from, to) in edges {
            preds[to].push(from);
            succs[from].push(to);
        }

        let pending: Vec<AtomicUsize> = (0..n).map(|i| AtomicUsize::new(preds[i].len())).collect();
        let mut sink_signal: Vec<Option<Signal>> = vec![None; n];
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| preds[i].is_empty()).collect();
        let mut finished = 0usize;

        while let Some(i) = ready.pop_front() {
            let partition = &partitions[i];
            let slot = i % self.num_slots;
            let _ = slot; // slot index only matters for a real backend's buffer reuse bookkeeping

            let pred_sigs: Vec<Signal> = preds[i].iter().map(|&p| sink_signal[p].clone().expect("predecessor already finished")).collect();

            if partition.host_blocks.len() != partition.device_blocks.len() {
                return Err(Error::BufferSizeMismatch { expected: partition.host_blocks.len(), got: partition.device_blocks.len() });
            }

            let mut h2d: Vec<Signal> = Vec::with_capacity(partition.host_blocks.len());
            for (host, device) in partition.host_blocks.iter().zip(&partition.device_blocks) {
                let len = host.len().min(device.len());
                let handle = self.memcpy.launch(host.clone(), device.clone(), len, &pred_sigs, FenceScope::Agent)?;
                h2d.push(handle.signal);
            }

            let inner_sinks = self.dag_executor.execute_with_preds(&partition.inner, &h2d)?;

            let mut d2h: Vec<Signal> = Vec::with_capacity(partition.host_blocks.len());
            for (host, device) in partition.host_blocks.iter().zip(&partition.device_blocks) {
                let len = host.len().min(device.len());
                let handle = self.memcpy.launch(device.clone(), host.clone(), len, &inner_sinks, FenceScope::System)?;
                d2h.push(handle.signal);
            }
            for s in &d2h {
                s.wait();
            }
            sink_signal[i] = d2h.last().cloned().or_else(|| inner_sinks.last().cloned());
            finished += 1;

            for &s in &succs[i] {
                if pending[s].fetch_sub(1, Ordering::AcqRel) - 1 == 0 {
                    ready.push_back(s);
                }
            }
        }

        if finished != n {
            return Err(Error::CyclicGraph);
        }

        Ok(sink_signal.into_iter().map(|s| s.expect("every partition finished above")).collect())
    }
}
