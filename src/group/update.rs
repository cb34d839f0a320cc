//! State updates
//!
//! The closed set of mutations a reader group state admits. Every update is
//! a pure function `(state, params) → new state`, applied by the state
//! synchronizer under compare-and-set; nothing here touches the outside
//! world. Updates that carry a generation are no-ops against snapshots at a
//! different generation, which is what makes replays and races harmless.

use crate::config::ReaderGroupConfig;
use crate::error::{Result, RilletError};
use crate::group::checkpoint::CheckpointState;
use crate::group::state::{ConfigState, Lifecycle, ReaderGroupState};
use crate::model::{Segment, SegmentWithRange};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The very first record of a group's state log.
///
/// Establishes the configuration, the initial unassigned segments resolved
/// from the starting cuts, and the end segments; generation starts at 0 in
/// `INITIALIZING`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderGroupInit {
    pub config: ReaderGroupConfig,
    pub segments: HashMap<SegmentWithRange, i64>,
    pub end_segments: HashMap<Segment, i64>,
}

impl ReaderGroupInit {
    pub fn new(
        config: ReaderGroupConfig,
        segments: HashMap<SegmentWithRange, i64>,
        end_segments: HashMap<Segment, i64>,
    ) -> Self {
        Self {
            config,
            segments,
            end_segments,
        }
    }

    /// Materialize the initial snapshot
    pub fn into_state(self) -> ReaderGroupState {
        ReaderGroupState {
            lifecycle: Lifecycle::Initializing {
                config: self.config,
            },
            generation: 0,
            assigned_segments: HashMap::new(),
            unassigned_segments: self.segments,
            future_segments: HashMap::new(),
            end_segments: self.end_segments,
            checkpoints: CheckpointState::default(),
            distance_to_tail: HashMap::new(),
        }
    }
}

/// One mutation of the replicated state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Relabel the lifecycle, installing the carried generation. The carried
    /// value must equal the snapshot generation (label-only change, e.g.
    /// INITIALIZING→READY) or exceed it by one (a fenced bump, e.g.
    /// READY→DELETING); anything else is a stale replay and a no-op.
    ChangeConfigState { target: ConfigState, generation: u64 },
    /// READY → REINITIALIZING: stage a new configuration and bump the
    /// generation to the carried value
    ResetStart {
        new_config: ReaderGroupConfig,
        generation: u64,
    },
    /// REINITIALIZING → READY: install the staged configuration; every new
    /// segment starts unassigned and the checkpoint engine starts fresh
    ResetComplete {
        config: ReaderGroupConfig,
        segments: HashMap<SegmentWithRange, i64>,
        end_segments: HashMap<Segment, i64>,
    },
    /// A reader comes online with no assignments
    AddReader { reader: String },
    /// A reader goes offline; its segments return to the unassigned pool at
    /// the carried offsets, falling back to its last reported ones
    RemoveReader {
        reader: String,
        positions: Option<HashMap<SegmentWithRange, i64>>,
    },
    /// A reader takes ownership of an unassigned segment
    AcquireSegment {
        reader: String,
        segment: SegmentWithRange,
    },
    /// A reader hands a segment back at the given offset
    ReleaseSegment {
        reader: String,
        segment: SegmentWithRange,
        offset: i64,
    },
    /// A reader finished a segment; successors whose predecessors are all
    /// finished become unassigned at offset 0
    SegmentCompleted {
        reader: String,
        segment: SegmentWithRange,
        /// Successor segments mapped to all of their predecessor ids
        successors: HashMap<SegmentWithRange, Vec<u64>>,
    },
    /// Open a checkpoint, snapshotting the online readers that must report
    CreateCheckpoint { id: String },
    /// One reader's positions for an outstanding checkpoint
    CheckpointPositions {
        id: String,
        reader: String,
        positions: HashMap<Segment, i64>,
    },
    /// Consume the checkpoint FIFO through `id`
    ClearCheckpointsBefore { id: String },
    /// Refresh a reader's tail distance and last read offsets
    UpdateDistanceToTail {
        reader: String,
        distance: i64,
        positions: HashMap<SegmentWithRange, i64>,
    },
}

impl StateUpdate {
    /// Apply this update to a snapshot.
    ///
    /// Returns `Ok(None)` when the update does not apply to this snapshot (a
    /// stale generation, an already-departed reader, a cleared checkpoint);
    /// `Err` when the update is inconsistent with the snapshot in a way that
    /// indicates a caller bug (acquiring a segment that is not unassigned,
    /// onlining a reader twice).
    pub fn apply(&self, state: &ReaderGroupState) -> Result<Option<ReaderGroupState>> {
        match self {
            StateUpdate::ChangeConfigState { target, generation } => {
                apply_change_config_state(state, *target, *generation)
            }
            StateUpdate::ResetStart {
                new_config,
                generation,
            } => apply_reset_start(state, new_config, *generation),
            StateUpdate::ResetComplete {
                config,
                segments,
                end_segments,
            } => apply_reset_complete(state, config, segments, end_segments),
            StateUpdate::AddReader { reader } => apply_add_reader(state, reader),
            StateUpdate::RemoveReader { reader, positions } => {
                apply_remove_reader(state, reader, positions.as_ref())
            }
            StateUpdate::AcquireSegment { reader, segment } => {
                apply_acquire_segment(state, reader, segment)
            }
            StateUpdate::ReleaseSegment {
                reader,
                segment,
                offset,
            } => apply_release_segment(state, reader, segment, *offset),
            StateUpdate::SegmentCompleted {
                reader,
                segment,
                successors,
            } => apply_segment_completed(state, reader, segment, successors),
            StateUpdate::CreateCheckpoint { id } => apply_create_checkpoint(state, id),
            StateUpdate::CheckpointPositions {
                id,
                reader,
                positions,
            } => apply_checkpoint_positions(state, id, reader, positions),
            StateUpdate::ClearCheckpointsBefore { id } => apply_clear_checkpoints(state, id),
            StateUpdate::UpdateDistanceToTail {
                reader,
                distance,
                positions,
            } => apply_update_distance(state, reader, *distance, positions),
        }
    }
}

fn apply_change_config_state(
    state: &ReaderGroupState,
    target: ConfigState,
    generation: u64,
) -> Result<Option<ReaderGroupState>> {
    if generation != state.generation && generation != state.generation + 1 {
        debug!(
            carried = generation,
            current = state.generation,
            "stale config-state change ignored"
        );
        return Ok(None);
    }
    let from = state.lifecycle.label();
    let config = state.config().clone();
    let lifecycle = match (from, target) {
        (ConfigState::Initializing, ConfigState::Ready)
        | (ConfigState::Reinitializing, ConfigState::Ready) => Lifecycle::Ready { config },
        (_, ConfigState::Deleting) => Lifecycle::Deleting { config },
        _ => {
            return Err(RilletError::illegal_state(format!(
                "config state transition {:?} -> {:?} is not allowed",
                from, target
            )))
        }
    };
    let mut next = state.clone();
    next.lifecycle = lifecycle;
    next.generation = generation;
    Ok(Some(next))
}

fn apply_reset_start(
    state: &ReaderGroupState,
    new_config: &ReaderGroupConfig,
    generation: u64,
) -> Result<Option<ReaderGroupState>> {
    if state.lifecycle.label() != ConfigState::Ready || generation != state.generation + 1 {
        debug!(
            carried = generation,
            current = state.generation,
            label = ?state.lifecycle.label(),
            "reset-start does not apply to this snapshot"
        );
        return Ok(None);
    }
    let mut next = state.clone();
    next.lifecycle = Lifecycle::Reinitializing {
        current: state.config().clone(),
        pending: new_config.clone(),
    };
    next.generation = generation;
    Ok(Some(next))
}

fn apply_reset_complete(
    state: &ReaderGroupState,
    config: &ReaderGroupConfig,
    segments: &HashMap<SegmentWithRange, i64>,
    end_segments: &HashMap<Segment, i64>,
) -> Result<Option<ReaderGroupState>> {
    match &state.lifecycle {
        Lifecycle::Reinitializing { pending, .. } if pending == config => {}
        _ => return Ok(None),
    }
    let mut next = state.clone();
    next.lifecycle = Lifecycle::Ready {
        config: config.clone(),
    };
    // Readers stay online but own nothing; they pull from the new segment set.
    for owned in next.assigned_segments.values_mut() {
        owned.clear();
    }
    next.unassigned_segments = segments.clone();
    next.future_segments.clear();
    next.end_segments = end_segments.clone();
    next.checkpoints = CheckpointState::default();
    next.distance_to_tail.clear();
    Ok(Some(next))
}

fn apply_add_reader(state: &ReaderGroupState, reader: &str) -> Result<Option<ReaderGroupState>> {
    if state.assigned_segments.contains_key(reader) {
        return Err(RilletError::illegal_state(format!(
            "reader {} is already online",
            reader
        )));
    }
    let mut next = state.clone();
    next.assigned_segments
        .insert(reader.to_string(), HashMap::new());
    Ok(Some(next))
}

fn apply_remove_reader(
    state: &ReaderGroupState,
    reader: &str,
    positions: Option<&HashMap<SegmentWithRange, i64>>,
) -> Result<Option<ReaderGroupState>> {
    let mut next = state.clone();
    let Some(owned) = next.assigned_segments.remove(reader) else {
        // Offline is idempotent; a second shutdown for the same reader is fine.
        return Ok(None);
    };
    let mut final_by_segment = HashMap::new();
    for (segment, last_reported) in owned {
        let offset = positions
            .and_then(|p| p.get(&segment))
            .copied()
            .unwrap_or(last_reported);
        final_by_segment.insert(segment.segment.clone(), offset);
        next.unassigned_segments.insert(segment, offset);
    }
    next.checkpoints.reader_removed(reader, &final_by_segment);
    next.distance_to_tail.remove(reader);
    Ok(Some(next))
}

fn apply_acquire_segment(
    state: &ReaderGroupState,
    reader: &str,
    segment: &SegmentWithRange,
) -> Result<Option<ReaderGroupState>> {
    if !state.assigned_segments.contains_key(reader) {
        return Err(RilletError::illegal_state(format!(
            "reader {} is not online",
            reader
        )));
    }
    let mut next = state.clone();
    let Some(offset) = next.unassigned_segments.remove(segment) else {
        return Err(RilletError::illegal_state(format!(
            "segment {} is not unassigned",
            segment
        )));
    };
    if let Some(owned) = next.assigned_segments.get_mut(reader) {
        owned.insert(segment.clone(), offset);
    }
    Ok(Some(next))
}

fn apply_release_segment(
    state: &ReaderGroupState,
    reader: &str,
    segment: &SegmentWithRange,
    offset: i64,
) -> Result<Option<ReaderGroupState>> {
    let mut next = state.clone();
    let removed = next
        .assigned_segments
        .get_mut(reader)
        .and_then(|owned| owned.remove(segment));
    if removed.is_none() {
        return Err(RilletError::illegal_state(format!(
            "segment {} is not assigned to reader {}",
            segment, reader
        )));
    }
    next.unassigned_segments.insert(segment.clone(), offset);
    Ok(Some(next))
}

fn apply_segment_completed(
    state: &ReaderGroupState,
    reader: &str,
    segment: &SegmentWithRange,
    successors: &HashMap<SegmentWithRange, Vec<u64>>,
) -> Result<Option<ReaderGroupState>> {
    let mut next = state.clone();
    let removed = next
        .assigned_segments
        .get_mut(reader)
        .and_then(|owned| owned.remove(segment));
    if removed.is_none() {
        return Err(RilletError::illegal_state(format!(
            "segment {} is not assigned to reader {}",
            segment, reader
        )));
    }
    next.end_segments.remove(&segment.segment);
    for (successor, predecessors) in successors {
        let already_live = next.unassigned_segments.contains_key(successor)
            || next
                .assigned_segments
                .values()
                .any(|owned| owned.contains_key(successor));
        if already_live {
            continue;
        }
        let all_predecessors_done = {
            let waiting = next
                .future_segments
                .entry(successor.clone())
                .or_insert_with(|| predecessors.iter().copied().collect::<HashSet<u64>>());
            waiting.remove(&segment.segment.id);
            waiting.is_empty()
        };
        if all_predecessors_done {
            next.future_segments.remove(successor);
            next.unassigned_segments.insert(successor.clone(), 0);
        }
    }
    Ok(Some(next))
}

fn apply_create_checkpoint(
    state: &ReaderGroupState,
    id: &str,
) -> Result<Option<ReaderGroupState>> {
    if state.checkpoints.is_outstanding(id) {
        return Ok(None);
    }
    let mut next = state.clone();
    let readers = state
        .online_readers()
        .into_iter()
        .collect::<HashSet<String>>();
    next.checkpoints.begin(id, readers);
    Ok(Some(next))
}

fn apply_checkpoint_positions(
    state: &ReaderGroupState,
    id: &str,
    reader: &str,
    positions: &HashMap<Segment, i64>,
) -> Result<Option<ReaderGroupState>> {
    if !state.checkpoints.is_outstanding(id) {
        return Ok(None);
    }
    let mut next = state.clone();
    next.checkpoints.report(id, reader, positions.clone());
    refresh_assigned_offsets(&mut next, reader, positions);
    Ok(Some(next))
}

fn apply_clear_checkpoints(state: &ReaderGroupState, id: &str) -> Result<Option<ReaderGroupState>> {
    if !state.checkpoints.is_outstanding(id) {
        return Ok(None);
    }
    let mut next = state.clone();
    next.checkpoints.clear_through(id);
    Ok(Some(next))
}

fn apply_update_distance(
    state: &ReaderGroupState,
    reader: &str,
    distance: i64,
    positions: &HashMap<SegmentWithRange, i64>,
) -> Result<Option<ReaderGroupState>> {
    if !state.assigned_segments.contains_key(reader) {
        return Ok(None);
    }
    let mut next = state.clone();
    next.distance_to_tail.insert(reader.to_string(), distance);
    if let Some(owned) = next.assigned_segments.get_mut(reader) {
        for (segment, offset) in positions {
            if let Some(stored) = owned.get_mut(segment) {
                *stored = *offset;
            }
        }
    }
    Ok(Some(next))
}

/// After a reader reports checkpoint positions, its stored offsets advance
/// to match (the report is by bare segment; ranges stay as assigned).
fn refresh_assigned_offsets(
    state: &mut ReaderGroupState,
    reader: &str,
    positions: &HashMap<Segment, i64>,
) {
    if let Some(owned) = state.assigned_segments.get_mut(reader) {
        for (segment, offset) in owned.iter_mut() {
            if let Some(reported) = positions.get(&segment.segment) {
                *offset = *reported;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stream;

    fn stream() -> Stream {
        Stream::of("scope", "a")
    }

    fn swr(id: u64) -> SegmentWithRange {
        SegmentWithRange::unranged(Segment::new(stream(), id))
    }

    fn config() -> ReaderGroupConfig {
        ReaderGroupConfig::builder()
            .stream(stream())
            .build()
            .unwrap()
    }

    fn initial_state() -> ReaderGroupState {
        let segments = HashMap::from([(swr(0), 0i64), (swr(1), 0i64)]);
        ReaderGroupInit::new(config(), segments, HashMap::new()).into_state()
    }

    fn ready_state() -> ReaderGroupState {
        let state = initial_state();
        StateUpdate::ChangeConfigState {
            target: ConfigState::Ready,
            generation: 0,
        }
        .apply(&state)
        .unwrap()
        .unwrap()
    }

    fn apply(state: &ReaderGroupState, update: StateUpdate) -> ReaderGroupState {
        update.apply(state).unwrap().unwrap()
    }

    // ==================== lifecycle transitions ====================

    #[test]
    fn test_init_to_ready_keeps_generation() {
        let state = ready_state();
        assert_eq!(state.config_state(), ConfigState::Ready);
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn test_change_config_state_stale_generation_is_noop() {
        let state = initial_state();
        let update = StateUpdate::ChangeConfigState {
            target: ConfigState::Ready,
            generation: 5,
        };
        assert!(update.apply(&state).unwrap().is_none());
    }

    #[test]
    fn test_delete_bumps_generation() {
        let state = ready_state();
        let deleted = apply(
            &state,
            StateUpdate::ChangeConfigState {
                target: ConfigState::Deleting,
                generation: state.generation() + 1,
            },
        );
        assert_eq!(deleted.config_state(), ConfigState::Deleting);
        assert_eq!(deleted.generation(), 1);
    }

    #[test]
    fn test_ready_to_initializing_rejected() {
        let state = ready_state();
        let err = StateUpdate::ChangeConfigState {
            target: ConfigState::Initializing,
            generation: state.generation(),
        }
        .apply(&state)
        .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn test_reset_start_and_complete() {
        let state = ready_state();
        let new_config = ReaderGroupConfig::builder()
            .stream(stream())
            .max_outstanding_checkpoint_request(7)
            .build()
            .unwrap();

        let mid = apply(
            &state,
            StateUpdate::ResetStart {
                new_config: new_config.clone(),
                generation: 1,
            },
        );
        assert_eq!(mid.config_state(), ConfigState::Reinitializing);
        assert_eq!(mid.generation(), 1);
        assert_eq!(mid.new_config(), Some(&new_config));

        let done = apply(
            &mid,
            StateUpdate::ResetComplete {
                config: new_config.clone(),
                segments: HashMap::from([(swr(5), 0i64)]),
                end_segments: HashMap::new(),
            },
        );
        assert_eq!(done.config_state(), ConfigState::Ready);
        assert_eq!(done.generation(), 1);
        assert_eq!(done.config(), &new_config);
        assert!(done.new_config().is_none());
        assert_eq!(done.unassigned_segments().len(), 1);
    }

    #[test]
    fn test_reset_start_requires_ready_at_prior_generation() {
        let state = initial_state();
        let update = StateUpdate::ResetStart {
            new_config: config(),
            generation: 1,
        };
        assert!(update.apply(&state).unwrap().is_none());

        let state = ready_state();
        let stale = StateUpdate::ResetStart {
            new_config: config(),
            generation: 3,
        };
        assert!(stale.apply(&state).unwrap().is_none());
    }

    #[test]
    fn test_reset_complete_clears_assignments_and_checkpoints() {
        let mut state = ready_state();
        state = apply(
            &state,
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::AcquireSegment {
                reader: "r1".into(),
                segment: swr(0),
            },
        );
        state = apply(
            &state,
            StateUpdate::CreateCheckpoint { id: "c1".into() },
        );

        let new_config = config();
        state = apply(
            &state,
            StateUpdate::ResetStart {
                new_config: new_config.clone(),
                generation: 1,
            },
        );
        let done = apply(
            &state,
            StateUpdate::ResetComplete {
                config: new_config,
                segments: HashMap::from([(swr(8), 0i64)]),
                end_segments: HashMap::new(),
            },
        );
        // Reader survives the reset but owns nothing
        assert!(done.is_reader_online("r1"));
        assert!(done.assigned_for("r1").unwrap().is_empty());
        assert_eq!(done.checkpoints().outstanding_len(), 0);
    }

    // ==================== reader membership ====================

    #[test]
    fn test_add_reader_twice_rejected() {
        let state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        let err = StateUpdate::AddReader {
            reader: "r1".into(),
        }
        .apply(&state)
        .unwrap_err();
        assert!(err.to_string().contains("already online"));
    }

    #[test]
    fn test_remove_reader_returns_segments_at_carried_offsets() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::AcquireSegment {
                reader: "r1".into(),
                segment: swr(0),
            },
        );
        let removed = apply(
            &state,
            StateUpdate::RemoveReader {
                reader: "r1".into(),
                positions: Some(HashMap::from([(swr(0), 99i64)])),
            },
        );
        assert!(!removed.is_reader_online("r1"));
        assert_eq!(removed.unassigned_segments()[&swr(0)], 99);
    }

    #[test]
    fn test_remove_reader_falls_back_to_last_reported() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::AcquireSegment {
                reader: "r1".into(),
                segment: swr(0),
            },
        );
        state = apply(
            &state,
            StateUpdate::UpdateDistanceToTail {
                reader: "r1".into(),
                distance: 5,
                positions: HashMap::from([(swr(0), 33i64)]),
            },
        );
        let removed = apply(
            &state,
            StateUpdate::RemoveReader {
                reader: "r1".into(),
                positions: None,
            },
        );
        assert_eq!(removed.unassigned_segments()[&swr(0)], 33);
        assert!(removed.distance_to_tail().is_empty());
    }

    #[test]
    fn test_remove_unknown_reader_is_noop() {
        let state = ready_state();
        let update = StateUpdate::RemoveReader {
            reader: "ghost".into(),
            positions: None,
        };
        assert!(update.apply(&state).unwrap().is_none());
    }

    // ==================== segment movement ====================

    #[test]
    fn test_acquire_rejects_wrong_partition() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::AcquireSegment {
                reader: "r1".into(),
                segment: swr(0),
            },
        );
        // Acquiring the same segment again: it is no longer unassigned
        let err = StateUpdate::AcquireSegment {
            reader: "r1".into(),
            segment: swr(0),
        }
        .apply(&state)
        .unwrap_err();
        assert!(err.to_string().contains("not unassigned"));
    }

    #[test]
    fn test_release_round_trips_offset() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::AcquireSegment {
                reader: "r1".into(),
                segment: swr(1),
            },
        );
        let released = apply(
            &state,
            StateUpdate::ReleaseSegment {
                reader: "r1".into(),
                segment: swr(1),
                offset: 1234,
            },
        );
        assert_eq!(released.unassigned_segments()[&swr(1)], 1234);
        assert!(released.assigned_for("r1").unwrap().is_empty());
    }

    #[test]
    fn test_release_unowned_segment_rejected() {
        let state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        let err = StateUpdate::ReleaseSegment {
            reader: "r1".into(),
            segment: swr(0),
            offset: 0,
        }
        .apply(&state)
        .unwrap_err();
        assert!(err.to_string().contains("not assigned"));
    }

    #[test]
    fn test_segment_completed_promotes_successors_when_predecessors_done() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        for id in [0u64, 1] {
            state = apply(
                &state,
                StateUpdate::AcquireSegment {
                    reader: "r1".into(),
                    segment: swr(id),
                },
            );
        }
        // Segments 0 and 1 merge into segment 2
        let successors = HashMap::from([(swr(2), vec![0u64, 1])]);
        state = apply(
            &state,
            StateUpdate::SegmentCompleted {
                reader: "r1".into(),
                segment: swr(0),
                successors: successors.clone(),
            },
        );
        // Successor still waits on segment 1
        assert!(!state.unassigned_segments().contains_key(&swr(2)));

        state = apply(
            &state,
            StateUpdate::SegmentCompleted {
                reader: "r1".into(),
                segment: swr(1),
                successors,
            },
        );
        assert_eq!(state.unassigned_segments()[&swr(2)], 0);
        assert!(state.assigned_for("r1").unwrap().is_empty());
    }

    // ==================== checkpoints ====================

    #[test]
    fn test_create_checkpoint_snapshots_online_readers() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::CreateCheckpoint { id: "c1".into() },
        );
        assert!(!state.checkpoints().is_complete("c1"));
        assert_eq!(state.checkpoints().pending_for("r1"), Some("c1"));

        // A reader joining later owes nothing on c1
        state = apply(
            &state,
            StateUpdate::AddReader {
                reader: "r2".into(),
            },
        );
        assert_eq!(state.checkpoints().pending_for("r2"), None);
    }

    #[test]
    fn test_duplicate_create_checkpoint_is_noop() {
        let state = apply(
            &ready_state(),
            StateUpdate::CreateCheckpoint { id: "c1".into() },
        );
        let update = StateUpdate::CreateCheckpoint { id: "c1".into() };
        assert!(update.apply(&state).unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_positions_advance_reader_offsets() {
        let mut state = apply(
            &ready_state(),
            StateUpdate::AddReader {
                reader: "r1".into(),
            },
        );
        state = apply(
            &state,
            StateUpdate::AcquireSegment {
                reader: "r1".into(),
                segment: swr(0),
            },
        );
        state = apply(
            &state,
            StateUpdate::CreateCheckpoint { id: "c1".into() },
        );
        state = apply(
            &state,
            StateUpdate::CheckpointPositions {
                id: "c1".into(),
                reader: "r1".into(),
                positions: HashMap::from([(swr(0).segment, 500i64)]),
            },
        );
        assert!(state.checkpoints().is_complete("c1"));
        assert_eq!(state.assigned_for("r1").unwrap()[&swr(0)], 500);
    }

    #[test]
    fn test_clear_checkpoints_on_unknown_id_is_noop() {
        let state = ready_state();
        let update = StateUpdate::ClearCheckpointsBefore { id: "c9".into() };
        assert!(update.apply(&state).unwrap().is_none());
    }

    #[test]
    fn test_update_distance_for_offline_reader_is_noop() {
        let state = ready_state();
        let update = StateUpdate::UpdateDistanceToTail {
            reader: "ghost".into(),
            distance: 1,
            positions: HashMap::new(),
        };
        assert!(update.apply(&state).unwrap().is_none());
    }
}
