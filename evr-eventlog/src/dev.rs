use std::sync::Arc;

use evr_notify::Notifier;
use evr_types::{
    link::{self, LinkError},
    record::{ArrayRecord, LongRecord, Record},
    EventCode,
};
use tracing::error;

use crate::{
    log::{EventLog, EventLogs},
    LogError,
};

/// Per-record handle onto one queue of one log.
///
/// A record whose link failed to parse keeps an unbound handle and answers
/// every operation with "No Init".
pub struct EventDev {
    bound: Option<Binding>,
}

impl std::fmt::Debug for EventDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDev")
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

struct Binding {
    log: Arc<EventLog>,
    queue: String,
    notifier: Notifier,
    autoclear: bool,
}

impl EventDev {
    /// Parse `log=<name> [queue=<name>] [autoclear=yes|no]` and attach,
    /// creating log and queue on first use. The queue name defaults to the
    /// empty string; records naming the same queue within a log share it.
    pub fn try_bind(logs: &EventLogs, link: &str) -> Result<Self, LinkError> {
        let mut log_name: Option<&str> = None;
        let mut queue_name = "";
        let mut autoclear = true;
        for param in link::params(link) {
            let (key, value) = param?;
            match key {
                "log" => log_name = Some(value),
                "queue" => queue_name = value,
                "autoclear" => {
                    autoclear = if value.eq_ignore_ascii_case("yes") {
                        true
                    } else if value.eq_ignore_ascii_case("no") {
                        false
                    } else {
                        return Err(LinkError::Autoclear);
                    };
                }
                _ => return Err(LinkError::Unexpected(key.to_string())),
            }
        }
        match log_name {
            Some(name) if !name.is_empty() => {
                let log = logs.get_or_create(name);
                let notifier = log.queue_notifier(queue_name);
                Ok(EventDev {
                    bound: Some(Binding {
                        log,
                        queue: queue_name.to_string(),
                        notifier,
                        autoclear,
                    }),
                })
            }
            _ => Err(LinkError::Missing("log=")),
        }
    }

    /// Record-init entry point: failures are logged once and leave the
    /// handle unbound.
    pub fn bind(logs: &EventLogs, rec: &Record, link: &str) -> Self {
        match Self::try_bind(logs, link) {
            Ok(dev) => dev,
            Err(err) => {
                error!(record = %rec.name, link, %err, "event log binding failed");
                EventDev { bound: None }
            }
        }
    }

    /// Buffer-consumer init: additionally sizes the queue's free pool to the
    /// record's declared capacity. Re-binding never shrinks the pool.
    pub fn bind_buffer(logs: &EventLogs, arr: &ArrayRecord, link: &str) -> Self {
        let dev = Self::bind(logs, &arr.record, link);
        if let Some(bound) = &dev.bound {
            bound.log.reserve_queue(&bound.queue, arr.nelm());
        }
        dev
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Change notifier of the bound queue, for consumer subscription.
    pub fn notifier(&self) -> Option<&Notifier> {
        self.bound.as_ref().map(|bound| &bound.notifier)
    }

    /// The log this record attached to.
    pub fn log(&self) -> Option<&Arc<EventLog>> {
        self.bound.as_ref().map(|bound| &bound.log)
    }

    /// Commit a new tick-to-nanosecond scale.
    pub fn set_tick_scale(&self, rec: &mut Record, value: f64) -> Result<(), LogError> {
        rec.alarm.reset();
        let Some(bound) = &self.bound else {
            return rec.reject(LogError::NoInit);
        };
        bound
            .log
            .set_tick_scale(value)
            .or_else(|err| rec.reject(err))
    }

    /// Switch this record's queue to `value`'s event code; values outside
    /// [0, 255] unsubscribe.
    pub fn set_event(&self, rec: &mut Record, value: i32) -> Result<(), LogError> {
        rec.alarm.reset();
        let Some(bound) = &self.bound else {
            return rec.reject(LogError::NoInit);
        };
        bound
            .log
            .set_queue_event(&bound.queue, EventCode::from_clamped(i64::from(value)));
        Ok(())
    }

    /// Feed a packed triple log into the demultiplexer.
    pub fn push_log(&self, arr: &mut ArrayRecord) -> Result<(), LogError> {
        arr.record.alarm.reset();
        let ArrayRecord { record, value, nord } = arr;
        let Some(words) = value.as_u32() else {
            return record.reject(LogError::BadElemType);
        };
        let Some(bound) = &self.bound else {
            return record.reject(LogError::NoInit);
        };

        let valid = (*nord).min(words.len());
        bound.log.push_words(&words[..valid]);
        Ok(())
    }

    /// Recycle everything queued when `value` is non-zero.
    pub fn clear(&self, rec: &mut Record, value: i32) -> Result<(), LogError> {
        rec.alarm.reset();
        let Some(bound) = &self.bound else {
            return rec.reject(LogError::NoInit);
        };
        if value != 0 {
            bound.log.clear_queue(&bound.queue);
        }
        Ok(())
    }

    /// Count one observation and stamp the record with the queue's last
    /// event time.
    pub fn read_last(&self, rec: &mut LongRecord) -> Result<(), LogError> {
        rec.record.alarm.reset();
        let Some(bound) = &self.bound else {
            return rec.record.reject(LogError::NoInit);
        };
        rec.val += 1;
        rec.record.time = bound.log.queue_last(&bound.queue);
        Ok(())
    }

    /// Copy the buffered stamps as seconds relative to the oldest one, which
    /// becomes the record timestamp. An empty queue reads zero elements and
    /// leaves the timestamp alone.
    pub fn read_buffer(&self, arr: &mut ArrayRecord) -> Result<(), LogError> {
        arr.record.alarm.reset();
        let ArrayRecord { record, value, nord } = arr;
        let Some(out) = value.as_f64_mut() else {
            return record.reject(LogError::BadElemType);
        };
        let Some(bound) = &self.bound else {
            return record.reject(LogError::NoInit);
        };

        let (count, first) = bound
            .log
            .read_queue(&bound.queue, out, bound.autoclear);
        *nord = count;
        if let Some(t0) = first {
            record.time = t0;
        }
        Ok(())
    }
}
