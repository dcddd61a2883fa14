//! Priority worker threads that deliver scans.
//!
//! One thread per priority, spawned on first use and alive for the process
//! lifetime. Jobs on one priority are delivered in post order.

use std::{
    sync::{
        mpsc::{self, Sender},
        OnceLock, Weak,
    },
    thread,
};

use tracing::debug;

use crate::{Inner, Notifier, NUM_PRIORITIES};

enum Job {
    Scan {
        notifier: Weak<Inner>,
        priority: usize,
    },
    Flush(mpsc::SyncSender<()>),
}

struct Hub {
    senders: [Sender<Job>; NUM_PRIORITIES],
}

static HUB: OnceLock<Hub> = OnceLock::new();

fn hub() -> &'static Hub {
    HUB.get_or_init(|| {
        let senders = std::array::from_fn(|priority| {
            let (tx, rx) = mpsc::channel();
            thread::Builder::new()
                .name(format!("evr-notify{priority}"))
                .spawn(move || worker(rx))
                .expect("spawn notify worker");
            tx
        });
        Hub { senders }
    })
}

fn worker(rx: mpsc::Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Scan { notifier, priority } => {
                let Some(inner) = notifier.upgrade() else {
                    debug!(priority, "scan target dropped before delivery");
                    continue;
                };
                Notifier::run_scan(&inner, priority);
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

pub(crate) fn post(priority: usize, notifier: Weak<Inner>) {
    let _ = hub().senders[priority].send(Job::Scan { notifier, priority });
}

/// Block until every scan posted before this call has been delivered on
/// every priority.
pub fn flush() {
    let hub = hub();
    let (tx, rx) = mpsc::sync_channel(NUM_PRIORITIES);
    for sender in &hub.senders {
        let _ = sender.send(Job::Flush(tx.clone()));
    }
    drop(tx);
    while rx.recv().is_ok() {}
}
