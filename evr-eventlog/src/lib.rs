//! Timestamped event demultiplexer.
//!
//! A shared receiver log of `(event, seconds, ticks)` triples fans out to
//! per-event-code queues. Each queue keeps a fixed pool of timestamp slots
//! split between a free list and the in-flight buffer, a last-seen stamp, and
//! a coalescing change notifier; exhausting the pool counts an overflow and
//! drops the entry.

mod dev;
mod log;

use evr_types::alarm::{Condition, Stat};

pub use dev::EventDev;
pub use log::{event_logs, EventLog, EventLogs};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// Tick scale must be finite and positive.
    #[error("Out of range")]
    ScaleRange,
    /// Array payload has the wrong element type.
    #[error("Bad FTVL")]
    BadElemType,
    /// The record failed to bind at init.
    #[error("No Init")]
    NoInit,
}

impl Condition for LogError {
    fn stat(&self) -> Stat {
        match self {
            LogError::ScaleRange => Stat::Write,
            LogError::BadElemType => Stat::Read,
            LogError::NoInit => Stat::Comm,
        }
    }
}
