//! The replicated reader-group state
//!
//! [`ReaderGroupState`] is the single logical value shared by every
//! coordinator and reader of one group. Snapshots are immutable; all
//! mutation happens by applying a [`StateUpdate`](crate::group::StateUpdate)
//! through the state synchronizer, which yields a fresh snapshot.

use crate::config::ReaderGroupConfig;
use crate::group::checkpoint::CheckpointState;
use crate::model::{ReaderSegmentDistribution, Segment, SegmentWithRange, Stream};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Lifecycle label of a reader group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigState {
    Initializing,
    Ready,
    Reinitializing,
    Deleting,
}

/// Lifecycle of a reader group as a sum type.
///
/// A pending configuration exists exactly while the group is
/// `Reinitializing`, so that invariant needs no runtime checking.
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    Initializing {
        config: ReaderGroupConfig,
    },
    Ready {
        config: ReaderGroupConfig,
    },
    Reinitializing {
        current: ReaderGroupConfig,
        pending: ReaderGroupConfig,
    },
    Deleting {
        config: ReaderGroupConfig,
    },
}

impl Lifecycle {
    pub fn label(&self) -> ConfigState {
        match self {
            Lifecycle::Initializing { .. } => ConfigState::Initializing,
            Lifecycle::Ready { .. } => ConfigState::Ready,
            Lifecycle::Reinitializing { .. } => ConfigState::Reinitializing,
            Lifecycle::Deleting { .. } => ConfigState::Deleting,
        }
    }

    /// The configuration currently in force
    pub fn config(&self) -> &ReaderGroupConfig {
        match self {
            Lifecycle::Initializing { config }
            | Lifecycle::Ready { config }
            | Lifecycle::Deleting { config } => config,
            Lifecycle::Reinitializing { current, .. } => current,
        }
    }

    /// The configuration a reset is installing, present only mid-reset
    pub fn pending(&self) -> Option<&ReaderGroupConfig> {
        match self {
            Lifecycle::Reinitializing { pending, .. } => Some(pending),
            _ => None,
        }
    }
}

/// Immutable snapshot of one reader group's replicated state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderGroupState {
    pub(crate) lifecycle: Lifecycle,
    /// Monotonic fence; bumped whenever the configuration is replaced
    pub(crate) generation: u64,
    /// Segments owned per reader. Key presence defines the online set.
    pub(crate) assigned_segments: HashMap<String, HashMap<SegmentWithRange, i64>>,
    /// Live segments owned by no reader
    pub(crate) unassigned_segments: HashMap<SegmentWithRange, i64>,
    /// Successor segments waiting on predecessors to finish, keyed by the
    /// predecessor ids still outstanding
    pub(crate) future_segments: HashMap<SegmentWithRange, HashSet<u64>>,
    /// Where reading stops per segment; `i64::MAX` means run to the end
    pub(crate) end_segments: HashMap<Segment, i64>,
    pub(crate) checkpoints: CheckpointState,
    /// Heuristic per-reader distance to the stream tail
    pub(crate) distance_to_tail: HashMap<String, i64>,
}

impl ReaderGroupState {
    pub fn config(&self) -> &ReaderGroupConfig {
        self.lifecycle.config()
    }

    /// The configuration being installed by an in-flight reset, if any
    pub fn new_config(&self) -> Option<&ReaderGroupConfig> {
        self.lifecycle.pending()
    }

    pub fn config_state(&self) -> ConfigState {
        self.lifecycle.label()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Readers currently online, sorted for deterministic iteration
    pub fn online_readers(&self) -> BTreeSet<String> {
        self.assigned_segments.keys().cloned().collect()
    }

    pub fn is_reader_online(&self, reader: &str) -> bool {
        self.assigned_segments.contains_key(reader)
    }

    /// Scoped names of the streams this group reads
    pub fn stream_names(&self) -> HashSet<String> {
        self.config().streams().map(Stream::scoped_name).collect()
    }

    /// Segments assigned to one reader, if it is online
    pub fn assigned_for(&self, reader: &str) -> Option<&HashMap<SegmentWithRange, i64>> {
        self.assigned_segments.get(reader)
    }

    pub fn unassigned_segments(&self) -> &HashMap<SegmentWithRange, i64> {
        &self.unassigned_segments
    }

    pub fn end_segments(&self) -> &HashMap<Segment, i64> {
        &self.end_segments
    }

    pub fn checkpoints(&self) -> &CheckpointState {
        &self.checkpoints
    }

    pub fn distance_to_tail(&self) -> &HashMap<String, i64> {
        &self.distance_to_tail
    }

    /// The last read position of every live segment, grouped by stream.
    ///
    /// This is the union of the assigned and unassigned partitions: the most
    /// recent offset the group as a whole has observed per segment.
    pub fn last_read_positions(&self) -> HashMap<Stream, HashMap<SegmentWithRange, i64>> {
        let mut positions: HashMap<Stream, HashMap<SegmentWithRange, i64>> = HashMap::new();
        let all = self
            .assigned_segments
            .values()
            .flat_map(|owned| owned.iter())
            .chain(self.unassigned_segments.iter());
        for (segment, offset) in all {
            positions
                .entry(segment.segment.stream.clone())
                .or_default()
                .insert(segment.clone(), *offset);
        }
        positions
    }

    /// True once every segment has been read to its end and handed back.
    pub fn is_end_of_data(&self) -> bool {
        self.unassigned_segments.is_empty()
            && self.future_segments.is_empty()
            && self.assigned_segments.values().all(HashMap::is_empty)
    }

    /// Segment spread across readers, for operator visibility
    pub fn distribution(&self) -> ReaderSegmentDistribution {
        ReaderSegmentDistribution {
            reader_segment_distribution: self
                .assigned_segments
                .iter()
                .map(|(reader, owned)| (reader.clone(), owned.len()))
                .collect(),
            unassigned_segments: self.unassigned_segments.len(),
        }
    }

    /// Total number of live segments (assigned plus unassigned)
    pub fn live_segment_count(&self) -> usize {
        self.assigned_segments
            .values()
            .map(HashMap::len)
            .sum::<usize>()
            + self.unassigned_segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::update::ReaderGroupInit;

    fn test_state() -> ReaderGroupState {
        let stream = Stream::of("scope", "a");
        let config = ReaderGroupConfig::builder()
            .stream(stream.clone())
            .build()
            .unwrap();
        let segments = HashMap::from([
            (
                SegmentWithRange::unranged(Segment::new(stream.clone(), 0)),
                0i64,
            ),
            (
                SegmentWithRange::unranged(Segment::new(stream, 1)),
                0i64,
            ),
        ]);
        ReaderGroupInit::new(config, segments, HashMap::new()).into_state()
    }

    #[test]
    fn test_initial_snapshot_shape() {
        let state = test_state();
        assert_eq!(state.config_state(), ConfigState::Initializing);
        assert_eq!(state.generation(), 0);
        assert!(state.new_config().is_none());
        assert!(state.online_readers().is_empty());
        assert_eq!(state.unassigned_segments().len(), 2);
        assert_eq!(state.live_segment_count(), 2);
    }

    #[test]
    fn test_stream_names() {
        let state = test_state();
        assert_eq!(
            state.stream_names(),
            HashSet::from(["scope/a".to_string()])
        );
    }

    #[test]
    fn test_last_read_positions_cover_both_partitions() {
        let mut state = test_state();
        let stream = Stream::of("scope", "a");
        let seg0 = SegmentWithRange::unranged(Segment::new(stream.clone(), 0));
        let moved = state.unassigned_segments.remove(&seg0).unwrap();
        state
            .assigned_segments
            .insert("r1".to_string(), HashMap::from([(seg0.clone(), moved + 42)]));

        let positions = state.last_read_positions();
        let for_stream = &positions[&stream];
        assert_eq!(for_stream.len(), 2);
        assert_eq!(for_stream[&seg0], 42);
    }

    #[test]
    fn test_end_of_data() {
        let mut state = test_state();
        assert!(!state.is_end_of_data());
        state.unassigned_segments.clear();
        assert!(state.is_end_of_data());
        state
            .assigned_segments
            .insert("r1".to_string(), HashMap::new());
        assert!(state.is_end_of_data());
    }

    #[test]
    fn test_lifecycle_pending_only_while_reinitializing() {
        let config = ReaderGroupConfig::builder()
            .stream(Stream::of("s", "a"))
            .build()
            .unwrap();
        let ready = Lifecycle::Ready {
            config: config.clone(),
        };
        assert!(ready.pending().is_none());

        let reinit = Lifecycle::Reinitializing {
            current: config.clone(),
            pending: config.clone(),
        };
        assert_eq!(reinit.pending(), Some(&config));
        assert_eq!(reinit.label(), ConfigState::Reinitializing);
    }

    #[test]
    fn test_distribution() {
        let mut state = test_state();
        let stream = Stream::of("scope", "a");
        let seg0 = SegmentWithRange::unranged(Segment::new(stream, 0));
        let offset = state.unassigned_segments.remove(&seg0).unwrap();
        state
            .assigned_segments
            .insert("r1".to_string(), HashMap::from([(seg0, offset)]));

        let dist = state.distribution();
        assert_eq!(dist.reader_segment_distribution["r1"], 1);
        assert_eq!(dist.unassigned_segments, 1);
    }
}
