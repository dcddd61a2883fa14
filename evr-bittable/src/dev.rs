use std::sync::Arc;

use evr_notify::Notifier;
use evr_types::{
    alarm::{Severity, Stat},
    link::{self, LinkError},
    record::{ArrayRecord, Record},
    EventCode, N_EVENTS,
};
use tracing::error;

use crate::{
    table::{BitTable, BitTables},
    TableError,
};

/// Per-record handle onto one table.
///
/// A record whose link failed to parse keeps an unbound handle and answers
/// every operation with "No Init".
pub struct BitDev {
    bound: Option<Binding>,
}

impl std::fmt::Debug for BitDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitDev")
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

struct Binding {
    table: Arc<BitTable>,
    /// Action bit index; negative means this record drives no action.
    action: i32,
    /// Event code this binding currently maps its action to.
    prev_event: EventCode,
}

impl BitDev {
    /// Parse `table=<name> [action=<int>]` and attach, creating the table on
    /// first use. The action index defaults to -1 (unbound) and accepts
    /// hex/octal/decimal with the usual prefixes.
    pub fn try_bind(tables: &BitTables, link: &str) -> Result<Self, LinkError> {
        let mut table_name: Option<&str> = None;
        let mut action = -1;
        for param in link::params(link) {
            let (key, value) = param?;
            match key {
                "table" => table_name = Some(value),
                "action" => {
                    action = link::parse_int(value).ok_or_else(|| LinkError::BadValue {
                        key: "action",
                        value: value.to_string(),
                    })?;
                }
                _ => return Err(LinkError::Unexpected(key.to_string())),
            }
        }
        match table_name {
            Some(name) if !name.is_empty() => Ok(BitDev {
                bound: Some(Binding {
                    table: tables.get_or_create(name),
                    action,
                    prev_event: EventCode::NONE,
                }),
            }),
            _ => Err(LinkError::Missing("table=")),
        }
    }

    /// Record-init entry point: failures are logged once and leave the
    /// handle unbound.
    pub fn bind(tables: &BitTables, rec: &Record, link: &str) -> Self {
        match Self::try_bind(tables, link) {
            Ok(dev) => dev,
            Err(err) => {
                error!(record = %rec.name, link, %err, "bit table binding failed");
                BitDev { bound: None }
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Change notifier of the bound table, for consumer subscription.
    pub fn notifier(&self) -> Option<&Notifier> {
        self.bound.as_ref().map(|bound| bound.table.notifier())
    }

    /// Commit a new row width in bits.
    pub fn set_width(&self, rec: &mut Record, value: i32) -> Result<(), TableError> {
        rec.alarm.reset();
        let Some(bound) = &self.bound else {
            return rec.reject(TableError::NoInit);
        };
        if value <= 0 {
            return rec.reject(TableError::Range);
        }

        if bound.table.store_width(value as u32) {
            bound.table.notifier().request();
        }
        Ok(())
    }

    /// Re-associate this binding's action with `value`'s event code; values
    /// outside [0, 255] clear the mapping.
    ///
    /// The previous mapping is cleared before the new cell is claimed, so a
    /// "Duplicate" rejection leaves the binding unmapped until a later update
    /// succeeds.
    pub fn update(&mut self, rec: &mut Record, value: i32) -> Result<(), TableError> {
        rec.alarm.reset();
        let Some(bound) = &mut self.bound else {
            return rec.reject(TableError::NoInit);
        };
        let new_event = EventCode::from_clamped(i64::from(value));
        if bound.action < 0 {
            return rec.reject(TableError::NoAction);
        }
        let action = bound.action as u32;

        let request = {
            let mut inner = bound.table.lock();

            if new_event == bound.prev_event {
                return Ok(());
            }
            if !bound.prev_event.is_none() {
                if let Some(row) = inner.table.get_mut(&bound.prev_event) {
                    let removed = row.remove(&action);
                    debug_assert!(removed.is_some(), "binding mapping out of sync");
                    if row.is_empty() {
                        inner.table.remove(&bound.prev_event);
                    }
                }
                bound.prev_event = EventCode::NONE;
            }
            if !new_event.is_none() {
                let cell = inner
                    .table
                    .entry(new_event)
                    .or_default()
                    .entry(action)
                    .or_insert(false);
                if *cell {
                    return rec.reject(TableError::Duplicate);
                }
                *cell = true;
            }
            bound.prev_event = new_event;

            !std::mem::replace(&mut inner.changing, true)
        };
        if request {
            bound.table.notifier().request();
        }
        Ok(())
    }

    /// Render the packed image and mark the table quiescent.
    ///
    /// Actions at or beyond the committed width are skipped with a MAJOR
    /// "OoR" advisory on the record; advisories never abort the render.
    pub fn render(&self, arr: &mut ArrayRecord) -> Result<(), TableError> {
        arr.record.alarm.reset();
        let ArrayRecord { record, value, nord } = arr;
        let Some(out) = value.as_u32_mut() else {
            return record.reject(TableError::BadElemType);
        };
        let Some(bound) = &self.bound else {
            return record.reject(TableError::NoInit);
        };

        let mut inner = bound.table.lock();
        inner.changing = false;

        let words = inner.words_per_event as usize;
        let bits = inner.bits_per_event;
        let cap = N_EVENTS * words;
        if out.len() < cap {
            return record.reject(TableError::BadCapacity);
        }
        out[..cap].fill(0);
        *nord = 0;

        for (event, row) in &inner.table {
            let base = event.0 as usize * words;
            for (&action, &active) in row {
                if !active {
                    continue;
                }
                if action >= bits {
                    record
                        .alarm
                        .raise(Stat::Read, Severity::Major, format_args!("OoR {action}"));
                    continue;
                }
                let word = base + words - 1 - action as usize / 32;
                out[word] |= 1 << (action % 32);
            }
        }
        *nord = cap;

        Ok(())
    }
}
