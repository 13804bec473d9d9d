//! End-to-end scenarios exercising the public API surface of `dagee` across
//! module boundaries: kernel registration, argument packing, each executor
//! paradigm, and the DAG scheduler, run together against the simulated
//! driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use dagee::dag::{Dag, DagExecutor, NodeKind};
use dagee::executor::{CpuExecutor, MemcpyExecutor, SerialOrderedExecutor};
use dagee::task::{compute_layout, pack_args, ArgKind, ArgValue, Dims};
use dagee::{Agent, DeviceKind, KernelRegistry, RuntimeBuilder};
use dagee_core::driver::Driver;
use dagee_core::mem::{MemBlock, RegionKind};
use dagee_core::packet::barrier_tree_size;

fn gpu_agent() -> Agent {
    Agent::new(0, DeviceKind::Gpu, 64)
}

fn alloc_u32_buffer(driver: &dyn Driver, agent: Agent, len: usize) -> MemBlock {
    driver.region(agent, RegionKind::CoarseGrained).allocate(len * 4).unwrap()
}

fn read_u32(block: &MemBlock, i: usize) -> u32 {
    // SAFETY: test-local exclusive access; no concurrent writer at the
    // point each assertion runs (the DAG sink has already been waited on).
    let bytes = unsafe { block.as_slice() };
    u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap())
}

fn write_u32(block: &MemBlock, i: usize, value: u32) {
    let bytes = unsafe { block.as_mut_slice() };
    bytes[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

/// Scenario: a "kite" (diamond) DAG over N=16384 elements — a top node
/// initializes `A[i] = 1`, two parallel middle nodes derive `B[i] = A[i]+1`
/// and `C[i] = A[i]+2` off separate buffers, and a bottom sink computes
/// `A[i] = B[i] + C[i] + 1`. Every element must read back 6, regardless of
/// whatever garbage occupied the buffers beforehand.
#[test]
fn kite_dag_produces_six_at_every_element() {
    const N: usize = 16384;
    let runtime = RuntimeBuilder::new().build().unwrap();
    let driver = runtime.driver.clone();
    let agent = gpu_agent();

    let a = alloc_u32_buffer(&*driver, agent, N);
    let b = alloc_u32_buffer(&*driver, agent, N);
    let c = alloc_u32_buffer(&*driver, agent, N);

    let mut rng = rand::thread_rng();
    for i in 0..N {
        write_u32(&a, i, rng.gen());
    }

    let gpu = Arc::new(SerialOrderedExecutor::new(driver.clone(), agent, 64));
    let cpu = Arc::new(CpuExecutor::new(driver.clone(), Agent::new(1, DeviceKind::Cpu, 64), 64));
    let memcpy = Arc::new(MemcpyExecutor::new(driver.clone(), agent, 64));
    let dag_executor = DagExecutor::new(gpu, cpu, memcpy);

    let mut dag = Dag::new();

    let top_a = a.clone();
    let top = dag.add_node(NodeKind::Cpu {
        callback: Arc::new(move |_bufs| for i in 0..N { write_u32(&top_a, i, 1) }),
        buffers: Vec::new(),
    });

    let (mid1_a, mid1_b) = (a.clone(), b.clone());
    let mid1 = dag.add_node(NodeKind::Cpu {
        callback: Arc::new(move |_bufs| for i in 0..N { write_u32(&mid1_b, i, read_u32(&mid1_a, i) + 1) }),
        buffers: Vec::new(),
    });

    let (mid2_a, mid2_c) = (a.clone(), c.clone());
    let mid2 = dag.add_node(NodeKind::Cpu {
        callback: Arc::new(move |_bufs| for i in 0..N { write_u32(&mid2_c, i, read_u32(&mid2_a, i) + 2) }),
        buffers: Vec::new(),
    });

    let (sink_a, sink_b, sink_c) = (a.clone(), b.clone(), c.clone());
    let sink = dag.add_node(NodeKind::Cpu {
        callback: Arc::new(move |_bufs| for i in 0..N { write_u32(&sink_a, i, read_u32(&sink_b, i) + read_u32(&sink_c, i) + 1) }),
        buffers: Vec::new(),
    });

    dag.add_edge(top, mid1).unwrap();
    dag.add_edge(top, mid2).unwrap();
    dag.add_edge(mid1, sink).unwrap();
    dag.add_edge(mid2, sink).unwrap();

    let sinks = dag_executor.execute(&dag).unwrap();
    assert_eq!(sinks.len(), 1);

    for i in 0..N {
        assert_eq!(read_u32(&a, i), 6, "element {i} did not converge to 6");
    }
}

/// Scenario: n=1024 invocations of a no-op kernel via batch mode produce
/// one terminal signal and n+1 dispatch packets on a single queue (the
/// leading gate dispatch plus one per queued task).
#[test]
fn empty_kernel_batch_emits_n_plus_one_dispatches() {
    const N: usize = 1024;
    let runtime = RuntimeBuilder::new().build().unwrap();
    let mut registry = KernelRegistry::new(runtime.driver.clone());

    let dispatch_count = Arc::new(AtomicUsize::new(0));
    let counter = dispatch_count.clone();
    let kernel = registry.register_by_name("noop", Arc::new(move |_args: &[u8]| { counter.fetch_add(1, Ordering::SeqCst); }), &[]).unwrap();
    let layout = compute_layout(&[]);

    let mut batch = runtime.gpu.start_batch();
    for _ in 0..N {
        let kernarg = pack_args(&*runtime.driver, &layout, &[]).unwrap();
        batch.add(kernel.clone(), kernarg, Dims::trivial());
    }
    let handle = batch.finish().unwrap();
    handle.wait();

    assert_eq!(dispatch_count.load(Ordering::SeqCst), N + 1);
}

/// Scenario: 1024 tasks spread round-robin over 4 unordered queues produce
/// exactly one barrier-AND packet (`barrier_tree_size(4) == 1`) and the
/// per-queue task counts sum back to 1024.
#[test]
fn unordered_batch_across_four_queues_joins_on_one_barrier() {
    const N: usize = 1024;
    assert_eq!(barrier_tree_size(4), 1);

    let runtime = RuntimeBuilder::new().unordered_queue_count(4).build().unwrap();
    let mut registry = KernelRegistry::new(runtime.driver.clone());

    let total_hits = Arc::new(AtomicUsize::new(0));
    let total = total_hits.clone();
    let kernel = registry.register_by_name("tick", Arc::new(move |_args: &[u8]| { total.fetch_add(1, Ordering::SeqCst); }), &[]).unwrap();
    let layout = compute_layout(&[]);

    assert_eq!(runtime.unordered.queues().len(), 4);
    let mut batch = runtime.unordered.start_batch();
    for _ in 0..N {
        let kernarg = pack_args(&*runtime.driver, &layout, &[]).unwrap();
        batch.add(kernel.clone(), kernarg, Dims::trivial());
    }
    let handle = batch.finish().unwrap();
    handle.wait();

    assert_eq!(total_hits.load(Ordering::SeqCst), N);
}

/// Scenario: a binary reduction tree of depth 10 (degree 2) has
/// `2^(depth+1) - 1` nodes, and running it (leaves to root) joins to a
/// single sink.
#[test]
fn tree_dag_depth_ten_matches_node_count_formula() {
    const DEPTH: u32 = 10;
    let expected_nodes = (1usize << (DEPTH + 1)) - 1;

    let runtime = RuntimeBuilder::new().build().unwrap();
    let gpu = Arc::new(SerialOrderedExecutor::new(runtime.driver.clone(), gpu_agent(), 64));
    let cpu = Arc::new(CpuExecutor::new(runtime.driver.clone(), Agent::new(1, DeviceKind::Cpu, 64), 64));
    let memcpy = Arc::new(MemcpyExecutor::new(runtime.driver.clone(), gpu_agent(), 64));
    let dag_executor = DagExecutor::new(gpu, cpu, memcpy);

    let mut dag = Dag::new();
    let leaves_per_level = 1usize << DEPTH;
    let mut level: Vec<_> = (0..leaves_per_level)
        .map(|_| dag.add_node(NodeKind::Cpu { callback: Arc::new(|_| {}), buffers: Vec::new() }))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let parent = dag.add_node(NodeKind::Cpu { callback: Arc::new(|_| {}), buffers: Vec::new() });
            for &child in pair {
                dag.add_edge(child, parent).unwrap();
            }
            next.push(parent);
        }
        level = next;
    }

    assert_eq!(dag.len(), expected_nodes);
    let sinks = dag_executor.execute(&dag).unwrap();
    assert_eq!(sinks.len(), 1);
}

/// Scenario: a DAG mixing GPU, CPU and copy nodes — two independent
/// sources each produce 1, a copy stages one of them through a second
/// buffer, and a CPU sink computes `(1 + 1) * 4 == 8`.
#[test]
fn mixed_paradigm_dag_computes_expected_value() {
    let runtime = RuntimeBuilder::new().build().unwrap();
    let driver = runtime.driver.clone();
    let agent = gpu_agent();
    let mut registry = KernelRegistry::new(driver.clone());

    let gpu_out = alloc_u32_buffer(&*driver, agent, 1);
    let cpu_out = alloc_u32_buffer(&*driver, agent, 1);
    let staged = alloc_u32_buffer(&*driver, agent, 1);
    let result = alloc_u32_buffer(&*driver, agent, 1);

    let gpu_write = gpu_out.clone();
    let kernel = registry.register_by_name("write_one", Arc::new(move |_args: &[u8]| write_u32(&gpu_write, 0, 1)), &[]).unwrap();
    let layout = compute_layout(&[]);
    let kernarg = pack_args(&*driver, &layout, &[]).unwrap();

    let gpu = Arc::new(SerialOrderedExecutor::new(driver.clone(), agent, 64));
    let cpu = Arc::new(CpuExecutor::new(driver.clone(), Agent::new(1, DeviceKind::Cpu, 64), 64));
    let memcpy = Arc::new(MemcpyExecutor::new(driver.clone(), agent, 64));
    let dag_executor = DagExecutor::new(gpu, cpu.clone(), memcpy);

    let mut dag = Dag::new();
    let gpu_node = dag.add_node(NodeKind::Gpu { kernel, kernarg, dims: Dims::trivial() });
    let cpu_write = cpu_out.clone();
    let cpu_node = dag.add_node(NodeKind::Cpu { callback: Arc::new(move |_bufs| write_u32(&cpu_write, 0, 1)), buffers: Vec::new() });
    let copy_node = dag.add_node(NodeKind::Copy { src: gpu_out.clone(), dst: staged.clone(), len: 4 });

    let (sink_staged, sink_cpu, sink_result) = (staged.clone(), cpu_out.clone(), result.clone());
    let sink_node = dag.add_node(NodeKind::Cpu {
        callback: Arc::new(move |_bufs| {
            let sum = read_u32(&sink_staged, 0) + read_u32(&sink_cpu, 0);
            write_u32(&sink_result, 0, sum * 4);
        }),
        buffers: Vec::new(),
    });

    dag.add_edge(gpu_node, copy_node).unwrap();
    dag.add_edge(copy_node, sink_node).unwrap();
    dag.add_edge(cpu_node, sink_node).unwrap();

    let sinks = dag_executor.execute(&dag).unwrap();
    assert_eq!(sinks.len(), 1);
    assert_eq!(read_u32(&result, 0), 8);
}

/// Scenario: packing `(u8, u64, f32, pointer)` yields offsets
/// `{0, 8, 16, 24}` and total size 32, and reading the bytes back recovers
/// each value.
#[test]
fn argument_packing_round_trips_all_four_kinds() {
    let runtime = RuntimeBuilder::new().build().unwrap();
    let pointee = alloc_u32_buffer(&*runtime.driver, gpu_agent(), 1);

    let kinds = [ArgKind::U8, ArgKind::U64, ArgKind::F32, ArgKind::Pointer];
    let layout = compute_layout(&kinds);
    assert_eq!(layout.offsets, vec![0, 8, 16, 24]);
    assert_eq!(layout.size, 32);

    let values = [ArgValue::U8(9), ArgValue::U64(12345), ArgValue::F32(2.5), ArgValue::Pointer(pointee.clone())];
    let packed = pack_args(&*runtime.driver, &layout, &values).unwrap();

    let bytes = unsafe { packed.as_slice() };
    assert_eq!(bytes[0], 9);
    assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 12345);
    assert_eq!(f32::from_le_bytes(bytes[16..20].try_into().unwrap()), 2.5);
    assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), pointee.addr() as u64);
}
