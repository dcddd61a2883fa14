use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, OnceLock, Weak},
};

use evr_notify::{Notifier, PriorityMask};
use evr_types::{EventCode, TimeStamp};
use tracing::trace;

use crate::LogError;

/// Receiver-side overflow marker on the event word: entries were lost
/// upstream before this one.
const OVERFLOW_FLAG: u32 = 1 << 30;

/// One shared receiver event log and its per-code queues.
///
/// A single mutex covers the log counters, the queues, and the listener
/// index; it is the only lock any operation takes.
pub struct EventLog {
    name: String,
    inner: Mutex<LogInner>,
}

struct LogInner {
    n_overflows: u32,
    nsec_per_tick: f64,
    queues: HashMap<String, Queue>,
    /// event code -> names of subscribed queues
    listeners: BTreeMap<EventCode, Vec<String>>,
}

struct Queue {
    /// Free slots. `unused` plus `que` always hold `capacity` stamps; every
    /// mutation splices between the two, so the steady state never
    /// allocates.
    unused: VecDeque<TimeStamp>,
    /// Buffered stamps, oldest first.
    que: VecDeque<TimeStamp>,
    last: TimeStamp,
    capacity: usize,
    event: EventCode,
    /// Scan priorities still in flight, for notification coalescing.
    changing: PriorityMask,
    notifier: Notifier,
}

impl Queue {
    fn new() -> Self {
        Queue {
            unused: VecDeque::new(),
            que: VecDeque::new(),
            last: TimeStamp::default(),
            capacity: 0,
            event: EventCode::NONE,
            changing: 0,
            notifier: Notifier::new(),
        }
    }
}

impl EventLog {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(EventLog {
            name: name.to_string(),
            inner: Mutex::new(LogInner {
                n_overflows: 0,
                nsec_per_tick: 1.0,
                queues: HashMap::new(),
                listeners: BTreeMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().expect("log lock")
    }

    /// Create `queue` on first use and hand back its change notifier.
    ///
    /// The completion hook clears the queue's in-flight bit, re-arming the
    /// next push to request a scan.
    pub fn queue_notifier(self: &Arc<Self>, queue: &str) -> Notifier {
        let mut inner = self.lock();
        if !inner.queues.contains_key(queue) {
            let q = Queue::new();
            let log = Arc::downgrade(self);
            let name = queue.to_string();
            q.notifier.on_complete(move |priority| {
                Self::scan_complete(&log, &name, priority);
            });
            inner.queues.insert(queue.to_string(), q);
        }
        inner.queues[queue].notifier.clone()
    }

    fn scan_complete(log: &Weak<EventLog>, queue: &str, priority: usize) {
        let Some(log) = log.upgrade() else {
            return;
        };
        let mut inner = log.lock();
        if let Some(q) = inner.queues.get_mut(queue) {
            let bit = 1 << priority;
            debug_assert!(q.changing & bit != 0, "completion without outstanding scan");
            q.changing &= !bit;
        }
    }

    /// Tick scale for subsequent pushes; stamps already queued are not
    /// rewritten.
    pub fn set_tick_scale(&self, nsec_per_tick: f64) -> Result<(), LogError> {
        if !nsec_per_tick.is_finite() || nsec_per_tick <= 0.0 {
            return Err(LogError::ScaleRange);
        }
        self.lock().nsec_per_tick = nsec_per_tick;
        Ok(())
    }

    /// Switch `queue`'s subscription to `code`; `NONE` just unsubscribes.
    pub fn set_queue_event(&self, queue: &str, code: EventCode) {
        let mut inner = self.lock();
        let LogInner {
            queues, listeners, ..
        } = &mut *inner;
        let q = queues.get_mut(queue).expect("queue exists");

        if !q.event.is_none() {
            if let Some(subscribed) = listeners.get_mut(&q.event) {
                if let Some(pos) = subscribed.iter().position(|name| name == queue) {
                    subscribed.remove(pos);
                }
                if subscribed.is_empty() {
                    listeners.remove(&q.event);
                }
            }
            q.event = EventCode::NONE;
        }
        if !code.is_none() {
            listeners.entry(code).or_default().push(queue.to_string());
            q.event = code;
        }
    }

    /// Dispatch complete `(event, seconds, ticks)` triples to every queue
    /// subscribed to the carried code; a trailing partial triple is ignored.
    ///
    /// Queues with an exhausted free pool drop the entry and count an
    /// overflow; the last-seen stamp is updated either way.
    pub fn push_words(&self, words: &[u32]) {
        let mut inner = self.lock();
        let LogInner {
            n_overflows,
            nsec_per_tick,
            queues,
            listeners,
        } = &mut *inner;

        for triple in words.chunks_exact(3) {
            let evtst = triple[0];
            let event = EventCode((evtst & 0xff) as u8);
            if event.is_none() {
                continue;
            }
            if evtst & OVERFLOW_FLAG != 0 {
                *n_overflows += 1;
            }
            let ts = TimeStamp::from_log(triple[1], triple[2], *nsec_per_tick);

            let Some(subscribed) = listeners.get(&event) else {
                continue;
            };
            for name in subscribed {
                let q = queues.get_mut(name).expect("listener without queue");
                q.last = ts;

                if q.unused.pop_front().is_some() {
                    q.que.push_back(ts);
                } else {
                    trace!(log = %self.name, queue = %name, "queue full, dropping event");
                    *n_overflows += 1;
                }

                if q.changing == 0 {
                    q.changing = q.notifier.request();
                }
            }
        }
    }

    /// Recycle everything queued. Returns false when there was nothing to
    /// do; otherwise a scan is requested unconditionally.
    pub fn clear_queue(&self, queue: &str) -> bool {
        let notifier = {
            let mut inner = self.lock();
            let q = inner.queues.get_mut(queue).expect("queue exists");
            if q.que.is_empty() {
                return false;
            }
            q.unused.append(&mut q.que);
            q.notifier.clone()
        };
        notifier.request();
        true
    }

    /// Last stamp observed for `queue`, whether or not it was buffered.
    pub fn queue_last(&self, queue: &str) -> TimeStamp {
        self.lock().queues.get(queue).expect("queue exists").last
    }

    /// Copy up to `out.len()` buffered stamps as seconds relative to the
    /// oldest one, which is returned alongside the count. `autoclear`
    /// recycles the copied prefix; otherwise entries stay queued until
    /// [`EventLog::clear_queue`].
    pub fn read_queue(
        &self,
        queue: &str,
        out: &mut [f64],
        autoclear: bool,
    ) -> (usize, Option<TimeStamp>) {
        let mut inner = self.lock();
        let q = inner.queues.get_mut(queue).expect("queue exists");
        let Some(&t0) = q.que.front() else {
            return (0, None);
        };

        let count = out.len().min(q.que.len());
        for (slot, &ts) in out.iter_mut().zip(q.que.iter()) {
            *slot = ts - t0;
        }
        if autoclear {
            for _ in 0..count {
                let ts = q.que.pop_front().expect("counted entry");
                q.unused.push_back(ts);
            }
        }
        (count, Some(t0))
    }

    /// Grow `queue`'s free pool to hold at least `nelm` stamps. Pools are
    /// sized before any traffic reaches the queue and never shrink.
    pub fn reserve_queue(&self, queue: &str, nelm: usize) {
        let mut inner = self.lock();
        let q = inner.queues.get_mut(queue).expect("queue exists");
        debug_assert!(q.que.is_empty(), "pool sized after traffic started");
        if q.unused.len() < nelm {
            q.unused.resize(nelm, TimeStamp::default());
        }
        q.capacity = q.unused.len() + q.que.len();
        q.que.reserve(q.capacity);
    }

    /// Total entries dropped, by the receiver upstream or by full queues.
    /// Never decreases.
    pub fn overflow_count(&self) -> u32 {
        self.lock().n_overflows
    }
}

/// Process-wide log registry. Entries are pinned until process exit; there
/// is no deregistration path.
#[derive(Default)]
pub struct EventLogs {
    inner: Mutex<HashMap<String, Arc<EventLog>>>,
}

impl EventLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, creating the log on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<EventLog> {
        let mut logs = self.inner.lock().expect("registry lock");
        logs.entry(name.to_string())
            .or_insert_with(|| EventLog::new(name))
            .clone()
    }
}

/// Registry shared by records bound without an explicit one.
pub fn event_logs() -> &'static EventLogs {
    static LOGS: OnceLock<EventLogs> = OnceLock::new();
    LOGS.get_or_init(EventLogs::default)
}
