//! NEXT result merging
//!
//! A range scan goes to every device of the pool. Each device answers with
//! its own sorted list of records per start key, and a key stored with
//! redundancy shows up in several lists. The merge turns the per-target lists
//! of one start key into a single sorted, duplicate-free window of at most
//! the requested number of records.

use dix_core::{CasError, Record};

use crate::error::DixError;

/// Per-target reply to a NEXT: one record list per start key
pub type TargetWindows = Vec<Vec<Result<Record, CasError>>>;

/// Merged records of one start key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextWindow {
    /// Sorted by key, no duplicates
    pub records: Vec<Record>,
    /// Set when fewer records than requested were found: `NotFound` when the
    /// index simply ran out, otherwise the error that hid the next record
    pub terminal: Option<DixError>,
}

impl NextWindow {
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.records.iter().map(|r| r.key.as_slice())
    }

    /// True when the scan reached the end of the index
    pub fn is_exhausted(&self) -> bool {
        matches!(self.terminal, Some(DixError::NotFound))
    }
}

/// Replies of all targets to one NEXT request
#[derive(Debug)]
pub struct NextResultSet {
    counts: Vec<u32>,
    targets: Vec<Option<TargetWindows>>,
}

impl NextResultSet {
    /// Empty set for `targets` targets and the requested per-start-key counts
    pub fn new(counts: Vec<u32>, targets: usize) -> Self {
        Self {
            counts,
            targets: (0..targets).map(|_| None).collect(),
        }
    }

    /// Record the reply of the target at `position`
    pub fn set_reply(&mut self, position: usize, windows: TargetWindows) {
        if let Some(slot) = self.targets.get_mut(position) {
            *slot = Some(windows);
        }
    }

    pub fn replied(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    /// Merge into one window per start key, in start key order
    ///
    /// Targets without a reply are skipped. Records are moved out of the set.
    pub fn merge(self) -> Vec<NextWindow> {
        let Self { counts, targets } = self;
        let mut per_target: Vec<std::vec::IntoIter<Vec<Result<Record, CasError>>>> =
            targets.into_iter().flatten().map(|w| w.into_iter()).collect();

        counts
            .iter()
            .map(|&count| {
                let cursors = per_target
                    .iter_mut()
                    .map(|windows| Cursor::new(windows.next().unwrap_or_default()))
                    .collect();
                merge_window(cursors, count as usize)
            })
            .collect()
    }
}

struct Cursor {
    records: std::vec::IntoIter<Result<Record, CasError>>,
    head: Option<Record>,
}

impl Cursor {
    fn new(records: Vec<Result<Record, CasError>>) -> Self {
        Self {
            records: records.into_iter(),
            head: None,
        }
    }

    /// Move to the next record, skipping errors; `NotFound` ends the list
    fn advance(&mut self, first_error: &mut Option<CasError>) {
        self.head = None;
        for item in self.records.by_ref() {
            match item {
                Ok(record) => {
                    self.head = Some(record);
                    return;
                }
                Err(CasError::NotFound) => break,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        self.records = Vec::new().into_iter();
    }
}

fn merge_window(mut cursors: Vec<Cursor>, count: usize) -> NextWindow {
    let mut first_error = None;
    for cursor in cursors.iter_mut() {
        cursor.advance(&mut first_error);
    }

    let mut records = Vec::with_capacity(count);
    while records.len() < count {
        let mut winner: Option<usize> = None;
        for (i, cursor) in cursors.iter().enumerate() {
            let Some(head) = &cursor.head else { continue };
            let smaller = match winner.and_then(|w| cursors[w].head.as_ref()) {
                Some(best) => head.key < best.key,
                None => true,
            };
            if smaller {
                winner = Some(i);
            }
        }
        let Some(w) = winner else { break };
        let Some(record) = cursors[w].head.take() else { break };

        cursors[w].advance(&mut first_error);
        for cursor in cursors.iter_mut() {
            while cursor.head.as_ref().is_some_and(|h| h.key == record.key) {
                cursor.advance(&mut first_error);
            }
        }
        records.push(record);
    }

    let terminal = if records.len() < count {
        Some(first_error.map(DixError::from).unwrap_or(DixError::NotFound))
    } else {
        None
    };
    NextWindow { records, terminal }
}
