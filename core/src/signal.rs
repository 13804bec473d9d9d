//! Completion signals: counting tokens that reach 0 when their packet(s)
//! finish. Grounded on `DAGEE-lib/include/dagr/hsaCore.h`'s signal handling
//! and the pool batching described in `dagr/queue.h`'s `HsaQueuePoolState`
//! sibling, `SignalPoolState`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// The three signal flavors a real backend distinguishes. The simulated
/// backend treats them identically at the data-structure level; the flavor
/// only selects the pool's batch-creation size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalFlavor {
    /// Wakes host threads via a condvar; used whenever a host thread will
    /// join on the signal.
    InterruptCapable,
    /// GPU-only, lowest cost; in the simulated backend this still uses a
    /// condvar (there is no busy-device to avoid waking), but callers are
    /// expected to reserve it for producer/consumer pairs that never join
    /// from the host.
    User,
    /// Shareable across process boundaries. The simulated backend does not
    /// implement real IPC; this flavor exists so the pool/registry shapes
    /// have a slot ready for a future out-of-process backend.
    Ipc,
}

struct SignalInner {
    value: AtomicI64,
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// A driver-provided counting completion token.
///
/// Created with value 1; reaching 0 signals completion. Cheap to clone (it's
/// a handle, like the HSA `hsa_signal_t`); clones refer to the same
/// underlying counter.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
    flavor: SignalFlavor,
}

impl Signal {
    pub(crate) fn new(flavor: SignalFlavor) -> Self {
        Signal {
            inner: Arc::new(SignalInner {
                value: AtomicI64::new(1),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
            flavor,
        }
    }

    /// A signal with no backing store — used as the "null signal" for
    /// non-terminal packets in a batch, matching `impl::NULL_SIGNAL` in the
    /// original sources.
    pub fn null() -> Self {
        Signal::new(SignalFlavor::User)
    }

    /// This signal's flavor.
    pub fn flavor(&self) -> SignalFlavor {
        self.flavor
    }

    /// Loads the current value (relaxed — callers needing ordering should
    /// use [`Signal::wait`]).
    pub fn load(&self) -> i64 {
        self.inner.value.load(Ordering::Relaxed)
    }

    /// Resets the signal to 1. A recycled signal must be reset before it is
    /// returned to its pool, or the next borrower would inherit a stale
    /// value.
    pub fn reset(&self) {
        self.inner.value.store(1, Ordering::Release);
    }

    /// Sets the signal to an arbitrary value. Used by executors that reuse
    /// one signal as a per-queue counter (see `SerialUnorderedExecutor`'s
    /// batch state).
    pub fn store(&self, value: i64) {
        self.inner.value.store(value, Ordering::Release);
    }

    /// Adds `delta` to the signal's value, waking any waiters if it reaches
    /// zero or below.
    pub fn add(&self, delta: i64) {
        let prev = self.inner.value.fetch_add(delta, Ordering::AcqRel);
        if prev + delta <= 0 {
            let _guard = self.inner.mutex.lock().unwrap();
            self.inner.condvar.notify_all();
        }
    }

    /// Decrements the signal by one, waking waiters if it reaches zero or
    /// below. This is what the simulated driver calls when a packet
    /// completes.
    pub fn signal_one(&self) {
        self.add(-1);
    }

    /// Blocks the calling thread until the signal's value reaches 0 or
    /// below. One of the engine's host suspension points.
    pub fn wait(&self) {
        if self.inner.value.load(Ordering::Acquire) <= 0 {
            return;
        }
        let mut guard = self.inner.mutex.lock().unwrap();
        while self.inner.value.load(Ordering::Acquire) > 0 {
            guard = self.inner.condvar.wait(guard).unwrap();
        }
    }

    /// Identity check used by the driver to special-case the null signal
    /// (no dependency to wait on, no completion signal to fire).
    pub fn is_null_of(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("value", &self.load())
            .field("flavor", &self.flavor)
            .finish()
    }
}

/// Per-flavor batch size used when a [`SignalPool`] needs to grow.
fn batch_size(flavor: SignalFlavor) -> usize {
    match flavor {
        SignalFlavor::InterruptCapable => 4096,
        SignalFlavor::User => 65536,
        SignalFlavor::Ipc => 256,
    }
}

/// Creates/recycles completion signals in batches, one pool per flavor kept
/// by the caller (typically inside [`crate::driver::Driver`]).
pub struct SignalPool {
    flavor: SignalFlavor,
    free: Vec<Signal>,
}

impl SignalPool {
    /// Creates an empty pool for the given flavor. The first [`allocate`]
    /// call fills it with one batch.
    ///
    /// [`allocate`]: SignalPool::allocate
    pub fn new(flavor: SignalFlavor) -> Self {
        SignalPool { flavor, free: Vec::new() }
    }

    fn grow(&mut self) {
        let n = batch_size(self.flavor);
        log::trace!("growing signal pool ({:?}) by {n}", self.flavor);
        self.free.reserve(n);
        for _ in 0..n {
            self.free.push(Signal::new(self.flavor));
        }
    }

    /// Takes one signal from the pool, growing it first if empty.
    pub fn allocate(&mut self) -> Signal {
        if self.free.is_empty() {
            self.grow();
        }
        let sig = self.free.pop().expect("pool just grown");
        sig.reset();
        sig
    }

    /// Returns a signal to the pool. The caller is responsible for having
    /// already observed completion; the pool resets the value on the next
    /// allocation for defense in depth.
    pub fn deallocate(&mut self, signal: Signal) {
        self.free.push(signal);
    }

    /// Number of signals currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.free.len()
    }
}
