use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use evr_notify::Notifier;
use evr_types::EventCode;
use itertools::Itertools;

/// One event-receiver action table.
///
/// The mapping is expected to stay sparse: rows exist only for event codes
/// with at least one bound action, and are erased when they empty out.
pub struct BitTable {
    name: String,
    notifier: Notifier,
    inner: Mutex<TableInner>,
}

#[derive(Default)]
pub(crate) struct TableInner {
    /// Row size in bits, as committed by the width record.
    pub(crate) bits_per_event: u32,
    /// 32-bit words used to store a row; derived from `bits_per_event`.
    pub(crate) words_per_event: u32,
    /// event -> action -> active
    pub(crate) table: BTreeMap<EventCode, BTreeMap<u32, bool>>,
    /// Dirty flag for notification coalescing; cleared by render.
    pub(crate) changing: bool,
}

impl BitTable {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(BitTable {
            name: name.to_string(),
            notifier: Notifier::new(),
            inner: Mutex::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change notifier; consumers of the rendered image subscribe here.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().expect("table lock")
    }

    /// Commit a new row width; the word width rounds up to whole 32-bit
    /// words. Returns true on the quiescent-to-dirty transition.
    pub(crate) fn store_width(&self, bits: u32) -> bool {
        let mut inner = self.lock();
        inner.bits_per_event = bits;
        inner.words_per_event = (bits + 31) / 32;
        !std::mem::replace(&mut inner.changing, true)
    }
}

/// Process-wide table registry. Entries are pinned until process exit; there
/// is no deregistration path.
#[derive(Default)]
pub struct BitTables {
    inner: Mutex<HashMap<String, Arc<BitTable>>>,
}

impl BitTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, creating the table on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<BitTable> {
        let mut tables = self.inner.lock().expect("registry lock");
        tables
            .entry(name.to_string())
            .or_insert_with(|| BitTable::new(name))
            .clone()
    }

    /// Write the diagnostic report: one line per table with its width, and at
    /// `level > 0` the active action indices of every event row.
    pub fn report(&self, level: i32, out: &mut impl fmt::Write) -> fmt::Result {
        // snapshot the registry first; its lock is never held across a
        // table lock
        let mut tables: Vec<Arc<BitTable>> = {
            let map = self.inner.lock().expect("registry lock");
            map.values().cloned().collect()
        };
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        for table in tables {
            let inner = table.lock();
            writeln!(
                out,
                "  {:?} : width: {} bits / {} words",
                table.name, inner.bits_per_event, inner.words_per_event
            )?;
            if level <= 0 {
                continue;
            }
            writeln!(out, "    EVT# = action bit indices")?;
            for (event, row) in &inner.table {
                writeln!(
                    out,
                    "    {:>3} - {}",
                    event,
                    row.iter()
                        .filter(|(_, &active)| active)
                        .map(|(action, _)| action)
                        .format(" ")
                )?;
            }
        }
        Ok(())
    }
}

/// Registry shared by records bound without an explicit one.
pub fn bit_tables() -> &'static BitTables {
    static TABLES: OnceLock<BitTables> = OnceLock::new();
    TABLES.get_or_init(BitTables::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_returns_the_same_table_per_name() {
        let tables = BitTables::new();
        let a = tables.get_or_create("evr0");
        let b = tables.get_or_create("evr0");
        let c = tables.get_or_create("evr1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.name(), "evr0");
    }

    #[test]
    fn width_rounds_up_to_whole_words() {
        let tables = BitTables::new();
        let table = tables.get_or_create("evr0");
        for (bits, words) in [(1, 1), (4, 1), (32, 1), (33, 2), (40, 2), (64, 2), (65, 3)] {
            table.store_width(bits);
            let inner = table.lock();
            assert_eq!(inner.bits_per_event, bits);
            assert_eq!(inner.words_per_event, words, "bits = {bits}");
        }
    }

    #[test]
    fn store_width_reports_the_dirty_transition_once() {
        let tables = BitTables::new();
        let table = tables.get_or_create("evr0");
        assert!(table.store_width(4));
        assert!(!table.store_width(8));
        table.lock().changing = false;
        assert!(table.store_width(16));
    }

    #[test]
    fn report_lists_width_and_rows() {
        let tables = BitTables::new();
        let table = tables.get_or_create("evr0");
        table.store_width(40);
        {
            let mut inner = table.lock();
            inner.table.entry(EventCode(100)).or_default().insert(0, true);
            inner.table.entry(EventCode(100)).or_default().insert(3, true);
            inner.table.entry(EventCode(255)).or_default().insert(1, true);
        }

        let mut brief = String::new();
        tables.report(0, &mut brief).unwrap();
        assert_eq!(brief, "  \"evr0\" : width: 40 bits / 2 words\n");

        let mut full = String::new();
        tables.report(1, &mut full).unwrap();
        assert!(full.contains("    100 - 0 3\n"));
        assert!(full.contains("    255 - 1\n"));
    }
}
