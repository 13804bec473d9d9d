//! The task-graph data model: a node set with predecessor/successor edges,
//! each node holding whichever task paradigm it represents.
//!
//! Grounded on `DAGEE-lib/include/dagr/taskGraph.h`'s `TaskDag`. A mixed-type
//! DAG is modeled as a plain Rust enum over the supported task kinds rather
//! than the tag-in-pointer trick the original uses to erase task types
//! behind a single pointer field.

pub mod executor;
pub mod partition;

pub use executor::DagExecutor;
pub use partition::{Partition, PartitionExecutor};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dagee_core::mem::MemBlock;
use dagee_core::signal::Signal;

use crate::error::{Error, Result};
use crate::executor::cpu::CpuBody;
use crate::registry::KernelInfo;
use crate::task::Dims;

/// A node's index within its owning [`Dag`]. Stable for the lifetime of the
/// DAG; never reused after removal (the engine does not support removing
/// nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// The task paradigm a [`Node`] carries.
#[derive(Clone)]
pub enum NodeKind {
    /// A GPU kernel dispatch.
    Gpu { kernel: Arc<KernelInfo>, kernarg: MemBlock, dims: Dims },
    /// A host callback, given its (already-dereferenced) buffers.
    Cpu { callback: CpuBody, buffers: Vec<MemBlock> },
    /// A driver-mediated memory copy.
    Copy { src: MemBlock, dst: MemBlock, len: usize },
}

/// One node of a [`Dag`]: its task and its edges.
///
/// The dependency counter and completion signal use interior mutability so
/// [`DagExecutor::execute`] can run against a shared `&Dag` — the graph's
/// edges are structurally frozen once built, but launch-time state still
/// has to mutate during a run (and reset for an idempotent re-run — running
/// the same static DAG twice must produce identical side effects).
pub struct Node {
    pub kind: NodeKind,
    preds: Vec<NodeId>,
    succs: Vec<NodeId>,
    pending: AtomicUsize,
    signal: Mutex<Option<Signal>>,
}

/// A directed acyclic graph of tasks.
pub struct Dag {
    nodes: Vec<Node>,
}

impl Dag {
    pub fn new() -> Self {
        Dag { nodes: Vec::new() }
    }

    /// Adds a node with no edges yet, returning its id.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, preds: Vec::new(), succs: Vec::new(), pending: AtomicUsize::new(0), signal: Mutex::new(None) });
        id
    }

    /// Adds a directed edge `from -> to`, meaning `to` may not launch until
    /// `from` completes.
    ///
    /// Rejects self-edges and duplicate edges; does
    /// not itself detect cycles introduced across more than one edge — use
    /// [`DagExecutor::execute`], which fails with [`Error::CyclicGraph`] if
    /// a run cannot make progress.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from == to {
            return Err(Error::InvalidEdge(format!("node {} cannot depend on itself", from.0)));
        }
        if self.nodes[to.0].preds.contains(&from) {
            return Err(Error::InvalidEdge(format!("edge {}->{} already exists", from.0, to.0)));
        }
        self.nodes[from.0].succs.push(to);
        self.nodes[to.0].preds.push(from);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// The completion signal recorded for `id` by the most recent
    /// [`DagExecutor::execute`] run, if any.
    pub fn signal_of(&self, id: NodeId) -> Option<Signal> {
        self.nodes[id.0].signal.lock().unwrap().clone()
    }

    fn source_ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].preds.is_empty()).map(NodeId).collect()
    }

    fn sink_ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].succs.is_empty()).map(NodeId).collect()
    }

    fn reset_counters(&self) {
        for node in &self.nodes {
            node.pending.store(node.preds.len(), Ordering::SeqCst);
            *node.signal.lock().unwrap() = None;
        }
    }
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_gpu_kind() -> NodeKind {
        NodeKind::Cpu { callback: Arc::new(|_| {}), buffers: Vec::new() }
    }

    #[test]
    fn self_edges_are_rejected() {
        let mut dag = Dag::new();
        let a = dag.add_node(noop_gpu_kind());
        assert!(dag.add_edge(a, a).is_err());
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let mut dag = Dag::new();
        let a = dag.add_node(noop_gpu_kind());
        let b = dag.add_node(noop_gpu_kind());
        dag.add_edge(a, b).unwrap();
        assert!(dag.add_edge(a, b).is_err());
    }

    #[test]
    fn sources_and_sinks_are_computed_from_edges() {
        let mut dag = Dag::new();
        let a = dag.add_node(noop_gpu_kind());
        let b = dag.add_node(noop_gpu_kind());
        let c = dag.add_node(noop_gpu_kind());
        dag.add_edge(a, b).unwrap();
        dag.add_edge(b, c).unwrap();
        assert_eq!(dag.source_ids(), vec![a]);
        assert_eq!(dag.sink_ids(), vec![c]);
    }
}
