//! Mock and stub invocation counters.
//!
//! A name is only observed once it has been tracked. Replacements that were
//! never tracked still call [`Registry::mock_entered`], but nothing is
//! recorded, so tests opt in per mock.

use crate::error::{HarnessError, Table};
use crate::report::Diagnostics;
use log::{debug, trace};
use std::cell::RefCell;
use std::rc::Rc;

/// One tracked name and how often it has been entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCounter {
    pub name: String,
    pub count: u32,
}

/// An ordered table of named counters with an optional capacity.
#[derive(Debug, Clone)]
pub struct CounterTable {
    table: Table,
    capacity: Option<usize>,
    entries: Vec<NamedCounter>,
}

impl CounterTable {
    pub fn new(table: Table, capacity: Option<usize>) -> Self {
        Self {
            table,
            capacity,
            entries: Vec::new(),
        }
    }

    /// Track `name`, or reset its count if it is already tracked.
    pub fn track(&mut self, name: &str) -> Result<(), HarnessError> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            debug!("{} name \"{}\" is already being tracked", self.table, name);
            entry.count = 0;
            return Ok(());
        }
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                log::warn!("cannot track \"{}\": {} table is full", name, self.table);
                return Err(HarnessError::CapacityExceeded {
                    table: self.table,
                    capacity,
                });
            }
        }
        debug!("tracking {} name = \"{}\"", self.table, name);
        self.entries.push(NamedCounter {
            name: name.to_string(),
            count: 0,
        });
        Ok(())
    }

    /// Count one entry into `name` and return the new count. Untracked names
    /// are ignored.
    pub fn record_hit(&mut self, name: &str) -> Option<u32> {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.count += 1;
                trace!("{} \"{}\" entered ({})", self.table, name, entry.count);
                Some(entry.count)
            }
            None => {
                trace!("{} \"{}\" not tracked", self.table, name);
                None
            }
        }
    }

    /// Current count for `name`; zero when untracked.
    pub fn query_count(&self, name: &str) -> u32 {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map_or(0, |e| e.count)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Zero every count, keeping the tracked names.
    pub fn reset_counts(&mut self) {
        for entry in &mut self.entries {
            entry.count = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NamedCounter] {
        &self.entries
    }
}

#[derive(Debug)]
struct Tables {
    mocks: CounterTable,
    stubs: CounterTable,
}

const REGISTRY_ORIGIN: &str = "registry";

type Select = fn(&mut Tables) -> &mut CounterTable;

fn mocks(tables: &mut Tables) -> &mut CounterTable {
    &mut tables.mocks
}

fn stubs(tables: &mut Tables) -> &mut CounterTable {
    &mut tables.stubs
}

/// Shared handle to the mock and stub tables.
///
/// Cloning is cheap; every clone sees the same counters. Doubles handed to the
/// unit under test hold a clone and record into it.
#[derive(Debug, Clone)]
pub struct Registry {
    tables: Rc<RefCell<Tables>>,
    diagnostics: Diagnostics,
}

impl Registry {
    pub fn new(max_mocks: Option<usize>, max_stubs: Option<usize>) -> Self {
        Self {
            tables: Rc::new(RefCell::new(Tables {
                mocks: CounterTable::new(Table::Mocks, max_mocks),
                stubs: CounterTable::new(Table::Stubs, max_stubs),
            })),
            diagnostics: Diagnostics::detached(),
        }
    }

    /// Echo tracking and lookups into `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn track_mock(&self, name: &str) -> Result<(), HarnessError> {
        self.track(Table::Mocks, mocks, name)
    }

    pub fn track_stub(&self, name: &str) -> Result<(), HarnessError> {
        self.track(Table::Stubs, stubs, name)
    }

    pub fn mock_entered(&self, name: &str) {
        self.entered(Table::Mocks, mocks, name);
    }

    pub fn stub_entered(&self, name: &str) {
        self.entered(Table::Stubs, stubs, name);
    }

    fn track(&self, table: Table, select: Select, name: &str) -> Result<(), HarnessError> {
        let (retracked, result) = {
            let mut tables = self.tables.borrow_mut();
            let counters = select(&mut tables);
            (counters.is_tracked(name), counters.track(name))
        };
        match (&result, retracked) {
            (Err(err), _) => self
                .diagnostics
                .emit(REGISTRY_ORIGIN, format_args!("{}: \"{}\": {}", table, name, err)),
            (Ok(()), true) => self.diagnostics.emit(
                REGISTRY_ORIGIN,
                format_args!("{}: \"{}\" is already being tracked", table, name),
            ),
            (Ok(()), false) => self
                .diagnostics
                .emit(REGISTRY_ORIGIN, format_args!("{}: track \"{}\"", table, name)),
        }
        result
    }

    fn entered(&self, table: Table, select: Select, name: &str) {
        let count = select(&mut self.tables.borrow_mut()).record_hit(name);
        match count {
            Some(count) => self.diagnostics.emit(
                REGISTRY_ORIGIN,
                format_args!("{}: \"{}\" entered ({})", table, name, count),
            ),
            None => self
                .diagnostics
                .emit(REGISTRY_ORIGIN, format_args!("{}: \"{}\" not tracked", table, name)),
        }
    }

    pub fn mock_count(&self, name: &str) -> u32 {
        self.tables.borrow().mocks.query_count(name)
    }

    pub fn stub_count(&self, name: &str) -> u32 {
        self.tables.borrow().stubs.query_count(name)
    }

    /// Zero all mock and stub counts. Called before every test.
    pub fn reset_counts(&self) {
        let mut tables = self.tables.borrow_mut();
        tables.mocks.reset_counts();
        tables.stubs.reset_counts();
    }

    pub fn mock_len(&self) -> usize {
        self.tables.borrow().mocks.len()
    }

    pub fn stub_len(&self) -> usize {
        self.tables.borrow().stubs.len()
    }

    /// Snapshot of `(mocks, stubs)` for reporting.
    pub fn snapshot(&self) -> (Vec<NamedCounter>, Vec<NamedCounter>) {
        let tables = self.tables.borrow();
        (
            tables.mocks.entries().to_vec(),
            tables.stubs.entries().to_vec(),
        )
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(None, None)
    }
}
