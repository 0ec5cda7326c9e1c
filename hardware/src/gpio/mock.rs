//! In-memory GPIO lines for tests and hardware-free runs.
//!
//! Every write is counted and every level change is recorded with a
//! timestamp, so tests can check both what a PWM worker drove and when.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{LineDriver, OutputLine};
use crate::error::{ControlError, ControlResult};

/// Level changes kept per line before the oldest are discarded.
const HISTORY_LIMIT: usize = 4096;

/// One recorded transition of a mock line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelChange {
    pub high: bool,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct LineRecord {
    claimed: bool,
    level: bool,
    opens: u64,
    high_writes: u64,
    low_writes: u64,
    changes: VecDeque<LevelChange>,
}

#[derive(Debug, Default)]
struct MockState {
    lines: HashMap<u32, LineRecord>,
    failing: HashSet<u32>,
    failing_writes: HashSet<u32>,
}

/// Line driver that keeps all state in memory.
///
/// Cloning shares the underlying state, so a test can hand one clone to the
/// code under test and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MockLineDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockLineDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` of `line` fail.
    pub fn fail_line(&self, line: u32) {
        self.state.lock().unwrap().failing.insert(line);
    }

    /// Make writes to `line` fail (`true`) or succeed again (`false`).
    pub fn set_write_failure(&self, line: u32, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_writes.insert(line);
        } else {
            state.failing_writes.remove(&line);
        }
    }

    /// Whether `line` is currently claimed by an open handle.
    pub fn is_claimed(&self, line: u32) -> bool {
        self.with_record(line, |r| r.claimed)
    }

    /// Last level written to `line` (LOW if never written).
    pub fn level(&self, line: u32) -> bool {
        self.with_record(line, |r| r.level)
    }

    /// How many times `line` has been opened.
    pub fn open_count(&self, line: u32) -> u64 {
        self.with_record(line, |r| r.opens)
    }

    /// Number of writes that drove `line` HIGH.
    pub fn high_writes(&self, line: u32) -> u64 {
        self.with_record(line, |r| r.high_writes)
    }

    /// Number of writes that drove `line` LOW.
    pub fn low_writes(&self, line: u32) -> u64 {
        self.with_record(line, |r| r.low_writes)
    }

    /// Recorded level changes of `line`, oldest first.
    pub fn changes(&self, line: u32) -> Vec<LevelChange> {
        self.with_record(line, |r| r.changes.iter().copied().collect())
    }

    fn with_record<T>(&self, line: u32, f: impl FnOnce(&LineRecord) -> T) -> T {
        let state = self.state.lock().unwrap();
        match state.lines.get(&line) {
            Some(record) => f(record),
            None => f(&LineRecord::default()),
        }
    }
}

impl LineDriver for MockLineDriver {
    fn open(&self, line: u32) -> ControlResult<Box<dyn OutputLine>> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&line) {
            return Err(ControlError::hardware(line, "mock line configured to fail"));
        }

        let record = state.lines.entry(line).or_default();
        if record.claimed {
            return Err(ControlError::hardware(line, "line busy"));
        }
        record.claimed = true;
        record.opens += 1;
        record.level = false;

        Ok(Box::new(MockLine {
            line,
            state: self.state.clone(),
        }))
    }
}

struct MockLine {
    line: u32,
    state: Arc<Mutex<MockState>>,
}

impl OutputLine for MockLine {
    fn write(&mut self, high: bool) -> ControlResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_writes.contains(&self.line) {
            return Err(ControlError::hardware(self.line, "mock write failure"));
        }
        let record = state.lines.entry(self.line).or_default();

        if high {
            record.high_writes += 1;
        } else {
            record.low_writes += 1;
        }

        if record.level != high || record.changes.is_empty() {
            if record.changes.len() == HISTORY_LIMIT {
                record.changes.pop_front();
            }
            record.changes.push_back(LevelChange {
                high,
                at: Instant::now(),
            });
        }
        record.level = high;
        Ok(())
    }
}

impl Drop for MockLine {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(record) = state.lines.get_mut(&self.line) {
                record.claimed = false;
            }
        }
    }
}
