//! Coalescing change notification.
//!
//! Producers mark an entity dirty and request a scan; consumers subscribed at
//! one of three priorities observe the change on that priority's worker
//! thread. The notifier itself never coalesces: callers own a `changing`
//! flag (or per-priority mask) and call [`Notifier::request`] only on the
//! quiescent-to-dirty transition, clearing it when the change has been
//! consumed.

mod hub;

use std::sync::{Arc, Mutex};

pub use hub::flush;

/// Scan priorities, lowest first.
pub const NUM_PRIORITIES: usize = 3;

/// One bit per priority; bit `p` is set when a scan was posted at `p`.
pub type PriorityMask = u8;

type Consumer = dyn Fn() + Send + Sync;
type CompleteFn = dyn Fn(usize) + Send + Sync;

#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<Inner>,
}

#[derive(Default)]
pub(crate) struct Inner {
    subs: Mutex<Subs>,
}

#[derive(Default)]
struct Subs {
    consumers: [Vec<Arc<Consumer>>; NUM_PRIORITIES],
    on_complete: Option<Arc<CompleteFn>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer scanned at `priority` on every request.
    ///
    /// # Panics
    ///
    /// Panics when `priority >= NUM_PRIORITIES`.
    pub fn subscribe(&self, priority: usize, consumer: impl Fn() + Send + Sync + 'static) {
        assert!(priority < NUM_PRIORITIES, "priority out of range");
        let mut subs = self.inner.subs.lock().expect("notifier lock");
        subs.consumers[priority].push(Arc::new(consumer));
    }

    /// Install the completion hook, invoked with the priority once every
    /// consumer at that priority has observed a request.
    pub fn on_complete(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        let mut subs = self.inner.subs.lock().expect("notifier lock");
        subs.on_complete = Some(Arc::new(hook));
    }

    /// Post one scan per subscribed priority.
    ///
    /// Each consumer subscribed at a posted priority runs exactly once per
    /// request, asynchronously on that priority's worker. Returns the mask of
    /// priorities posted; 0 when nothing is subscribed.
    pub fn request(&self) -> PriorityMask {
        let subs = self.inner.subs.lock().expect("notifier lock");
        let mut mask = 0;
        for (priority, consumers) in subs.consumers.iter().enumerate() {
            if consumers.is_empty() {
                continue;
            }
            hub::post(priority, Arc::downgrade(&self.inner));
            mask |= 1 << priority;
        }
        mask
    }

    pub(crate) fn run_scan(inner: &Inner, priority: usize) {
        let (consumers, hook) = {
            let subs = inner.subs.lock().expect("notifier lock");
            (subs.consumers[priority].clone(), subs.on_complete.clone())
        };
        for consumer in consumers {
            (*consumer)();
        }
        if let Some(hook) = hook {
            (*hook)(priority);
        }
    }
}
