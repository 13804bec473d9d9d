//! Crate-level invariant tests that don't fit naturally beside a single
//! module: cross-module wiring between signals, queues and packets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agent::{Agent, DeviceKind};
use crate::driver::sim::SimDriver;
use crate::driver::Driver;
use crate::mem::RegionKind;
use crate::packet::{make_dispatch, BarrierBit, FenceScope};
use crate::queue::{Queue, QueueDiscipline};
use crate::signal::SignalFlavor;

fn gpu_agent() -> Agent {
    Agent::new(0, DeviceKind::Gpu, 64)
}

#[test]
fn signal_conservation_across_a_batch() {
    let driver = SimDriver::new(vec![gpu_agent()]);
    let agent = gpu_agent();
    let queue = Arc::new(Queue::new(agent, 64, QueueDiscipline::SingleProducer));
    let region = driver.region(agent, RegionKind::CoarseGrained);
    let counter = Arc::new(AtomicUsize::new(0));

    let n = 32;
    let completion = driver.allocate_signal(SignalFlavor::InterruptCapable);
    completion.store(n as i64);

    for _ in 0..n {
        let counter = counter.clone();
        let code_obj = driver.register_kernel_body(Arc::new(move |_args: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let kernarg = driver.allocate_kernarg(8).unwrap();
        let _ = &region;
        let (pkt, hdr) = make_dispatch(
            (1, 1, 1),
            (1, 1, 1),
            code_obj,
            kernarg,
            completion.clone(),
            FenceScope::Agent,
            BarrierBit::Disable,
        );
        let pkt = Arc::new(pkt);
        pkt.publish(hdr);
        driver.submit(&queue, pkt, hdr);
    }

    completion.wait();
    assert_eq!(counter.load(Ordering::SeqCst), n);
}

#[test]
fn queue_admission_respects_agent_bounds() {
    let agent = Agent::new(1, DeviceKind::Gpu, 128);
    let queue = Queue::new(agent, 128, QueueDiscipline::MultiProducer);
    assert_eq!(queue.capacity(), 128);
    assert!(queue.is_empty());
}
