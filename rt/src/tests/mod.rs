//! Crate-level wiring tests: registry, argument packing, executors and the
//! DAG scheduler used together, the way `rt/tests/` exercises them from
//! outside the crate but scoped to a single module boundary at a time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dagee_core::agent::{Agent, DeviceKind};
use dagee_core::driver::sim::SimDriver;
use dagee_core::driver::Driver;
use dagee_core::packet::FenceScope;

use crate::dag::{Dag, DagExecutor, NodeKind};
use crate::executor::{CpuExecutor, MemcpyExecutor, SerialOrderedExecutor};
use crate::registry::KernelRegistry;
use crate::task::{compute_layout, pack_args, ArgKind, ArgValue, Dims};

fn gpu_agent() -> Agent {
    Agent::new(0, DeviceKind::Gpu, 64)
}

fn cpu_agent() -> Agent {
    Agent::new(1, DeviceKind::Cpu, 64)
}

#[test]
fn registered_kernel_launches_through_the_ordered_executor() {
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new(vec![gpu_agent()]));
    let mut registry = KernelRegistry::new(driver.clone());
    let ran = Arc::new(AtomicU32::new(0));
    let ran_body = ran.clone();

    let info = registry
        .register_by_name("increment", Arc::new(move |_args: &[u8]| { ran_body.fetch_add(1, Ordering::SeqCst); }), &[ArgKind::U32])
        .unwrap();

    let layout = compute_layout(&[ArgKind::U32]);
    let kernarg = pack_args(&*driver, &layout, &[ArgValue::U32(7)]).unwrap();

    let executor = SerialOrderedExecutor::new(driver, gpu_agent(), 64);
    let handle = executor.launch_task(&info, kernarg, Dims::trivial(), &[], FenceScope::System);
    handle.wait();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn mixed_paradigm_dag_runs_gpu_cpu_and_copy_nodes() {
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new(vec![gpu_agent(), cpu_agent()]));
    let mut registry = KernelRegistry::new(driver.clone());
    let gpu_ticks = Arc::new(AtomicU32::new(0));
    let gpu_ticks_body = gpu_ticks.clone();

    let kernel = registry.register_by_name("tick", Arc::new(move |_args: &[u8]| { gpu_ticks_body.fetch_add(1, Ordering::SeqCst); }), &[]).unwrap();
    let empty_layout = compute_layout(&[]);

    let gpu = Arc::new(SerialOrderedExecutor::new(driver.clone(), gpu_agent(), 64));
    let cpu = Arc::new(CpuExecutor::new(driver.clone(), cpu_agent(), 64));
    let memcpy = Arc::new(MemcpyExecutor::new(driver.clone(), gpu_agent(), 64));
    let dag_executor = DagExecutor::new(gpu, cpu, memcpy);

    let src = driver.region(gpu_agent(), dagee_core::mem::RegionKind::CoarseGrained).allocate(4).unwrap();
    let dst = driver.region(gpu_agent(), dagee_core::mem::RegionKind::CoarseGrained).allocate(4).unwrap();

    let cpu_hits = Arc::new(AtomicU32::new(0));
    let cpu_hits_body = cpu_hits.clone();

    let mut dag = Dag::new();
    let gpu_kernarg_a = pack_args(&*driver, &empty_layout, &[]).unwrap();
    let gpu_kernarg_b = pack_args(&*driver, &empty_layout, &[]).unwrap();
    let n1 = dag.add_node(NodeKind::Gpu { kernel: kernel.clone(), kernarg: gpu_kernarg_a, dims: Dims::trivial() });
    let n2 = dag.add_node(NodeKind::Copy { src, dst, len: 4 });
    let n3 = dag.add_node(NodeKind::Cpu { callback: Arc::new(move |_bufs| { cpu_hits_body.fetch_add(1, Ordering::SeqCst); }), buffers: Vec::new() });
    let n4 = dag.add_node(NodeKind::Gpu { kernel, kernarg: gpu_kernarg_b, dims: Dims::trivial() });
    dag.add_edge(n1, n2).unwrap();
    dag.add_edge(n1, n3).unwrap();
    dag.add_edge(n2, n4).unwrap();
    dag.add_edge(n3, n4).unwrap();

    let sinks = dag_executor.execute(&dag).unwrap();
    assert_eq!(sinks.len(), 1);
    assert_eq!(gpu_ticks.load(Ordering::SeqCst), 2);
    assert_eq!(cpu_hits.load(Ordering::SeqCst), 1);
}
