//! Agents: opaque handles identifying a compute device.

use std::fmt;

/// Coarse classification of an [`Agent`]'s execution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// A host CPU agent, used by the CPU executor.
    Cpu,
    /// An accelerator (GPU) agent.
    Gpu,
}

/// An accelerator device.
///
/// Mirrors the HSA `hsa_agent_t` opaque handle: cheap to copy, queried for
/// name and queue sizing rather than carrying state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Agent {
    id: u32,
    kind: DeviceKind,
    max_queue_size: u32,
}

impl Agent {
    pub fn new(id: u32, kind: DeviceKind, max_queue_size: u32) -> Self {
        assert!(max_queue_size.is_power_of_two(), "queue size must be a power of two");
        Agent { id, kind, max_queue_size }
    }

    /// A stable, process-local identifier for this agent.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The device kind this agent represents.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Human-readable name, synthesized from kind and id (the simulated
    /// backend has no vendor string to report).
    pub fn name(&self) -> String {
        match self.kind {
            DeviceKind::Cpu => format!("sim-cpu-{}", self.id),
            DeviceKind::Gpu => format!("sim-gpu-{}", self.id),
        }
    }

    /// Maximum queue ring capacity (a power of two) this agent supports.
    pub fn max_queue_size(&self) -> u32 {
        self.max_queue_size
    }

    /// Minimum queue ring capacity this agent will create on request.
    pub fn min_queue_size(&self) -> u32 {
        64
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name(), self.id)
    }
}
