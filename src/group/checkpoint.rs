//! Checkpoint sub-engine
//!
//! Tracks the FIFO of outstanding checkpoints, which readers still owe
//! positions on each, everything reported so far, and the last completed
//! checkpoint whose positions survive clearing. Lives inside
//! [`ReaderGroupState`](crate::group::ReaderGroupState) and is only ever
//! mutated through state updates.

use crate::model::{Segment, Stream};
use std::collections::{HashMap, HashSet};

/// Suffix marking a checkpoint as silent.
///
/// Silent checkpoints exist only to compute a consistent stream-cut; readers
/// report positions on them but never surface them as application-visible
/// checkpoint events.
pub const SILENT_SUFFIX: &str = "_SILENT_";

/// The last checkpoint that completed and was consumed from the FIFO.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletedCheckpoint {
    pub id: String,
    /// Reported positions, grouped by stream
    pub positions: HashMap<Stream, HashMap<Segment, i64>>,
}

/// Per-group checkpoint bookkeeping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckpointState {
    /// Outstanding checkpoint ids, oldest first
    outstanding: Vec<String>,
    /// Readers that have not yet reported, per outstanding checkpoint
    pending: HashMap<String, HashSet<String>>,
    /// Positions reported so far: checkpoint → reader → segment → offset
    reported: HashMap<String, HashMap<String, HashMap<Segment, i64>>>,
    /// The most recently cleared complete checkpoint
    last_completed: Option<CompletedCheckpoint>,
}

impl CheckpointState {
    /// Whether an id names a silent checkpoint
    pub fn is_silent(id: &str) -> bool {
        id.ends_with(SILENT_SUFFIX)
    }

    /// Outstanding checkpoint ids, oldest first
    pub fn outstanding(&self) -> &[String] {
        &self.outstanding
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, id: &str) -> bool {
        self.outstanding.iter().any(|c| c == id)
    }

    /// The last completed checkpoint consumed from the FIFO, if any
    pub fn last_completed(&self) -> Option<&CompletedCheckpoint> {
        self.last_completed.as_ref()
    }

    /// Begin a checkpoint, snapshotting the readers that must report.
    ///
    /// A checkpoint created while no reader is online is complete
    /// immediately, with empty positions.
    pub(crate) fn begin(&mut self, id: &str, readers: HashSet<String>) {
        self.outstanding.push(id.to_string());
        self.pending.insert(id.to_string(), readers);
        self.reported.insert(id.to_string(), HashMap::new());
    }

    /// Record one reader's slice of an outstanding checkpoint.
    pub(crate) fn report(&mut self, id: &str, reader: &str, positions: HashMap<Segment, i64>) {
        if !self.is_outstanding(id) {
            return;
        }
        if let Some(pending) = self.pending.get_mut(id) {
            pending.remove(reader);
        }
        self.reported
            .entry(id.to_string())
            .or_default()
            .insert(reader.to_string(), positions);
    }

    /// A reader went offline: it implicitly reports its final positions on
    /// every checkpoint still waiting on it.
    pub(crate) fn reader_removed(&mut self, reader: &str, final_positions: &HashMap<Segment, i64>) {
        let waiting: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, readers)| readers.contains(reader))
            .map(|(id, _)| id.clone())
            .collect();
        for id in waiting {
            self.report(&id, reader, final_positions.clone());
        }
    }

    /// Completion predicate: every snapshotted reader has reported (or has
    /// gone offline, which substitutes its last known positions).
    ///
    /// Ids no longer outstanding count as complete so that waiters always
    /// make progress; whether their positions are still retrievable is a
    /// separate question answered by [`positions_for`](Self::positions_for).
    pub fn is_complete(&self, id: &str) -> bool {
        match self.pending.get(id) {
            Some(pending) => pending.is_empty(),
            None => true,
        }
    }

    /// The oldest outstanding checkpoint a reader still owes positions on
    pub fn pending_for(&self, reader: &str) -> Option<&str> {
        self.outstanding
            .iter()
            .find(|id| {
                self.pending
                    .get(*id)
                    .is_some_and(|readers| readers.contains(reader))
            })
            .map(String::as_str)
    }

    /// Positions of a completed checkpoint, keyed by segment.
    ///
    /// Returns `None` when the checkpoint is incomplete or its results were
    /// already cleared past.
    pub fn positions_for(&self, id: &str) -> Option<HashMap<Segment, i64>> {
        if self.is_outstanding(id) {
            if !self.is_complete(id) {
                return None;
            }
            let mut union = HashMap::new();
            if let Some(by_reader) = self.reported.get(id) {
                for positions in by_reader.values() {
                    union.extend(positions.iter().map(|(s, o)| (s.clone(), *o)));
                }
            }
            Some(union)
        } else {
            self.last_completed
                .as_ref()
                .filter(|c| c.id == id)
                .map(|c| {
                    c.positions
                        .values()
                        .flat_map(|m| m.iter().map(|(s, o)| (s.clone(), *o)))
                        .collect()
                })
        }
    }

    /// Like [`positions_for`](Self::positions_for), grouped by stream.
    pub fn stream_positions_for(&self, id: &str) -> Option<HashMap<Stream, HashMap<Segment, i64>>> {
        if !self.is_outstanding(id) {
            return self
                .last_completed
                .as_ref()
                .filter(|c| c.id == id)
                .map(|c| c.positions.clone());
        }
        self.positions_for(id).map(group_by_stream)
    }

    /// Pop the FIFO through `id`. Of the popped entries, the last complete
    /// one becomes [`last_completed`](Self::last_completed).
    pub(crate) fn clear_through(&mut self, id: &str) {
        let Some(upto) = self.outstanding.iter().position(|c| c == id) else {
            return;
        };
        let cleared: Vec<String> = self.outstanding.drain(..=upto).collect();
        for cleared_id in cleared {
            let complete = self
                .pending
                .get(&cleared_id)
                .is_some_and(|pending| pending.is_empty());
            if complete {
                let mut union = HashMap::new();
                if let Some(by_reader) = self.reported.get(&cleared_id) {
                    for positions in by_reader.values() {
                        union.extend(positions.iter().map(|(s, o)| (s.clone(), *o)));
                    }
                }
                self.last_completed = Some(CompletedCheckpoint {
                    id: cleared_id.clone(),
                    positions: group_by_stream(union),
                });
            }
            self.pending.remove(&cleared_id);
            self.reported.remove(&cleared_id);
        }
    }

    pub(crate) fn from_parts(
        outstanding: Vec<String>,
        pending: HashMap<String, HashSet<String>>,
        reported: HashMap<String, HashMap<String, HashMap<Segment, i64>>>,
        last_completed: Option<CompletedCheckpoint>,
    ) -> Self {
        Self {
            outstanding,
            pending,
            reported,
            last_completed,
        }
    }

    pub(crate) fn pending_map(&self) -> &HashMap<String, HashSet<String>> {
        &self.pending
    }

    pub(crate) fn reported_map(&self) -> &HashMap<String, HashMap<String, HashMap<Segment, i64>>> {
        &self.reported
    }
}

fn group_by_stream(positions: HashMap<Segment, i64>) -> HashMap<Stream, HashMap<Segment, i64>> {
    let mut grouped: HashMap<Stream, HashMap<Segment, i64>> = HashMap::new();
    for (segment, offset) in positions {
        grouped
            .entry(segment.stream.clone())
            .or_default()
            .insert(segment, offset);
    }
    grouped
}
