//! The runtime bootstrap facade: picks a backing device, spins up the
//! simulated driver, and hands out the per-paradigm executors and kernel
//! registry built on top of it.
//!
//! Mirrors `ocl`'s `ProQueBuilder` idiom: plain typestate-light structs
//! rather than a deserialized config file, since nothing here is meant to
//! persist across runs.

use std::sync::Arc;

use dagee_core::agent::{Agent, DeviceKind};
use dagee_core::driver::sim::SimDriver;
use dagee_core::driver::Driver;
use dagee_core::Error as CoreError;

use crate::error::Result;
use crate::executor::serial_unordered::MAX_QUEUES;
use crate::executor::{CpuExecutor, MemcpyExecutor, SerialOrderedExecutor, SerialUnorderedExecutor};
use crate::registry::KernelRegistry;

/// Which kind of agent [`RuntimeBuilder`] should prefer when more than one
/// is enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    GpuFirst,
    CpuFirst,
    /// Picks agent `agent_index` directly, failing if out of range. A real
    /// multi-GPU backend would let callers enumerate and choose explicitly;
    /// this is where that selection plugs in.
    Explicit(usize),
}

/// Builds a [`Runtime`] bound to one simulated driver instance.
pub struct RuntimeBuilder {
    agents: Vec<Agent>,
    preference: DevicePreference,
    queue_capacity: u32,
    unordered_queue_count: usize,
    embedded_image: Option<Vec<u8>>,
}

impl RuntimeBuilder {
    /// Starts a builder with a default two-agent topology (one GPU, one
    /// CPU), GPU-first preference, 64-entry queues, and a 4-queue
    /// unordered-executor pool.
    pub fn new() -> Self {
        RuntimeBuilder {
            agents: vec![Agent::new(0, DeviceKind::Gpu, 64), Agent::new(1, DeviceKind::Cpu, 64)],
            preference: DevicePreference::GpuFirst,
            queue_capacity: 64,
            unordered_queue_count: 4,
            embedded_image: None,
        }
    }

    /// Overrides the enumerated agent topology.
    pub fn agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = agents;
        self
    }

    pub fn device_preference(mut self, preference: DevicePreference) -> Self {
        self.preference = preference;
        self
    }

    /// Sets the ring capacity every executor's queues are created with.
    /// Must be a power of two within the chosen agent's bounds.
    pub fn queue_capacity(mut self, capacity: u32) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the unordered executor's queue-pool size, clamped to
    /// [`MAX_QUEUES`].
    pub fn unordered_queue_count(mut self, count: usize) -> Self {
        self.unordered_queue_count = count.clamp(1, MAX_QUEUES);
        self
    }

    /// Supplies the host executable's own bytes so [`build`](Self::build)
    /// loads its embedded offload bundle and device-stub symbol table into
    /// the fresh [`KernelRegistry`] before handing it back. Without this,
    /// the registry starts with an empty stub-symbol table and only
    /// [`KernelRegistry::register_by_name`] is usable until a caller loads
    /// an image explicitly.
    pub fn embedded_image(mut self, elf_bytes: Vec<u8>) -> Self {
        self.embedded_image = Some(elf_bytes);
        self
    }

    fn pick_agent(&self, kind: DeviceKind) -> Result<Agent> {
        match self.preference {
            DevicePreference::Explicit(idx) => self.agents.get(idx).copied().ok_or_else(|| CoreError::NoMatchingAgent.into()),
            DevicePreference::GpuFirst | DevicePreference::CpuFirst => {
                self.agents.iter().find(|a| a.kind() == kind).copied().ok_or_else(|| CoreError::NoMatchingAgent.into())
            }
        }
    }

    /// Builds the runtime: a [`SimDriver`] over the configured agents, a
    /// fresh [`KernelRegistry`], and one executor of each paradigm.
    pub fn build(self) -> Result<Runtime> {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new(self.agents.clone()));
        let gpu_agent = self.pick_agent(DeviceKind::Gpu)?;
        let cpu_agent = self.pick_agent(DeviceKind::Cpu).unwrap_or(gpu_agent);

        let mut registry = KernelRegistry::new(driver.clone());
        if let Some(image) = &self.embedded_image {
            registry.load_embedded_image(image)?;
        }
        let gpu = Arc::new(SerialOrderedExecutor::new(driver.clone(), gpu_agent, self.queue_capacity));
        let cpu = Arc::new(CpuExecutor::new(driver.clone(), cpu_agent, self.queue_capacity));
        let memcpy = Arc::new(MemcpyExecutor::new(driver.clone(), gpu_agent, self.queue_capacity));
        let unordered = Arc::new(SerialUnorderedExecutor::new(driver.clone(), gpu_agent, self.queue_capacity, self.unordered_queue_count));

        Ok(Runtime { driver, registry, gpu, cpu, memcpy, unordered })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bootstrapped driver plus the registry and executors built on top of
/// it. The unit of composition callers build a [`crate::dag::Dag`] against.
pub struct Runtime {
    pub driver: Arc<dyn Driver>,
    pub registry: KernelRegistry,
    pub gpu: Arc<SerialOrderedExecutor>,
    pub cpu: Arc<CpuExecutor>,
    pub memcpy: Arc<MemcpyExecutor>,
    pub unordered: Arc<SerialUnorderedExecutor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_resolves_both_default_agents() {
        let runtime = RuntimeBuilder::new().build().unwrap();
        assert_eq!(runtime.driver.agents().len(), 2);
    }

    #[test]
    fn explicit_preference_out_of_range_fails() {
        let result = RuntimeBuilder::new().device_preference(DevicePreference::Explicit(9)).build();
        assert!(result.is_err());
    }

    #[test]
    fn malformed_embedded_image_fails_build() {
        let result = RuntimeBuilder::new().embedded_image(vec![0u8; 16]).build();
        assert!(result.is_err());
    }
}
