//! Reader-side surface of the group protocol
//!
//! Readers are peers of the coordinators: they mutate the same replicated
//! state through the same synchronizer. A [`ReaderHandle`] covers one
//! reader's lifecycle — coming online, pulling segments from the unassigned
//! pool, handing them back, reporting checkpoint positions — without any of
//! the coordinator's upstream side effects.

use crate::error::Result;
use crate::group::{CheckpointState, StateUpdate};
use crate::model::{Position, Segment, SegmentWithRange};
use crate::sync::StateSynchronizer;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A checkpoint a reader must participate in.
///
/// `observable` is false for silent checkpoints: the reader still reports
/// positions, but never surfaces the checkpoint as an application-visible
/// event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEvent {
    pub id: String,
    pub observable: bool,
}

/// One reader's handle onto the shared group state.
pub struct ReaderHandle<S> {
    reader_id: String,
    synchronizer: Arc<S>,
}

impl<S: StateSynchronizer> ReaderHandle<S> {
    pub fn new(reader_id: impl Into<String>, synchronizer: Arc<S>) -> Self {
        Self {
            reader_id: reader_id.into(),
            synchronizer,
        }
    }

    pub fn reader_id(&self) -> &str {
        &self.reader_id
    }

    /// Join the group with no assignments.
    ///
    /// # Errors
    ///
    /// Rejected with `IllegalState` if a reader with this id is already
    /// online; the previous instance must be declared offline first.
    pub fn online(&self) -> Result<()> {
        self.synchronizer.update_state(|_| {
            Ok((
                vec![StateUpdate::AddReader {
                    reader: self.reader_id.clone(),
                }],
                (),
            ))
        })
    }

    /// Leave the group. Owned segments return to the unassigned pool at the
    /// offsets of `last_position` when given, else at the last reported
    /// offsets. Idempotent.
    pub fn offline(&self, last_position: Option<Position>) -> Result<()> {
        let positions = last_position.map(Position::into_owned);
        self.synchronizer.update_state(|state| {
            if !state.is_reader_online(&self.reader_id) {
                return Ok((vec![], ()));
            }
            Ok((
                vec![StateUpdate::RemoveReader {
                    reader: self.reader_id.clone(),
                    positions: positions.clone(),
                }],
                (),
            ))
        })
    }

    /// Pull one segment from the unassigned pool.
    ///
    /// Hand-out order is deterministic: the unassigned segment with the
    /// lowest segment id wins. Returns the segment and the offset to resume
    /// from, or `None` when nothing is unassigned.
    pub fn acquire_segment(&self) -> Result<Option<(SegmentWithRange, i64)>> {
        let acquired = self.synchronizer.update_state(|state| {
            let next = state
                .unassigned_segments()
                .iter()
                .min_by_key(|(segment, _)| segment.segment.id)
                .map(|(segment, offset)| (segment.clone(), *offset));
            match next {
                None => Ok((vec![], None)),
                Some((segment, offset)) => Ok((
                    vec![StateUpdate::AcquireSegment {
                        reader: self.reader_id.clone(),
                        segment: segment.clone(),
                    }],
                    Some((segment, offset)),
                )),
            }
        })?;
        if let Some((segment, offset)) = &acquired {
            debug!(reader = %self.reader_id, segment = %segment, offset, "acquired segment");
        }
        Ok(acquired)
    }

    /// Hand a segment back at the given offset.
    pub fn release_segment(&self, segment: &SegmentWithRange, offset: i64) -> Result<()> {
        self.synchronizer.update_state(|_| {
            Ok((
                vec![StateUpdate::ReleaseSegment {
                    reader: self.reader_id.clone(),
                    segment: segment.clone(),
                    offset,
                }],
                (),
            ))
        })
    }

    /// Report a segment read to its end, naming its successors and their
    /// predecessors so split/merge topologies unlock in order.
    pub fn segment_completed(
        &self,
        segment: &SegmentWithRange,
        successors: HashMap<SegmentWithRange, Vec<u64>>,
    ) -> Result<()> {
        self.synchronizer.update_state(|_| {
            Ok((
                vec![StateUpdate::SegmentCompleted {
                    reader: self.reader_id.clone(),
                    segment: segment.clone(),
                    successors: successors.clone(),
                }],
                (),
            ))
        })
    }

    /// The oldest outstanding checkpoint this reader still owes positions
    /// on, if any.
    pub fn next_checkpoint(&self) -> Result<Option<CheckpointEvent>> {
        self.synchronizer.fetch_updates()?;
        let state = self.synchronizer.state()?;
        Ok(state
            .checkpoints()
            .pending_for(&self.reader_id)
            .map(|id| CheckpointEvent {
                id: id.to_string(),
                observable: !CheckpointState::is_silent(id),
            }))
    }

    /// Report this reader's positions for an outstanding checkpoint.
    /// Harmless if the checkpoint has been cleared meanwhile.
    pub fn report_checkpoint(&self, id: &str, positions: HashMap<Segment, i64>) -> Result<()> {
        self.synchronizer
            .update_state_unconditionally(StateUpdate::CheckpointPositions {
                id: id.to_string(),
                reader: self.reader_id.clone(),
                positions,
            })
    }

    /// Refresh this reader's distance-to-tail heuristic and its last read
    /// offsets.
    pub fn update_distance_to_tail(
        &self,
        distance: i64,
        positions: HashMap<SegmentWithRange, i64>,
    ) -> Result<()> {
        self.synchronizer
            .update_state_unconditionally(StateUpdate::UpdateDistanceToTail {
                reader: self.reader_id.clone(),
                distance,
                positions,
            })
    }
}
