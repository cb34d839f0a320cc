//! Notifier hub
//!
//! Fan-out of observable state transitions: segment-count changes (segments
//! split, merged, or readers joined/left) and end-of-data. Each notifier
//! kind is one broadcast queue; notifications are derived by diffing
//! successive snapshots, never by mutating shared listener lists.

use crate::group::ReaderGroupState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// The number of segments or readers of the group changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentNotification {
    pub num_segments: usize,
    pub num_readers: usize,
}

/// Every segment of the group has been read to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfDataNotification;

/// Subscription surface for one notification kind.
pub struct Notifier<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Notifier<T> {
    /// Subscribe; the receiver observes notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }
}

const NOTIFIER_CAPACITY: usize = 64;

pub(crate) struct NotifierHub {
    segment_tx: broadcast::Sender<SegmentNotification>,
    end_of_data_tx: broadcast::Sender<EndOfDataNotification>,
    last_counts: Mutex<Option<(usize, usize)>>,
    end_of_data_seen: AtomicBool,
}

impl NotifierHub {
    pub(crate) fn new() -> Self {
        let (segment_tx, _) = broadcast::channel(NOTIFIER_CAPACITY);
        let (end_of_data_tx, _) = broadcast::channel(NOTIFIER_CAPACITY);
        Self {
            segment_tx,
            end_of_data_tx,
            last_counts: Mutex::new(None),
            end_of_data_seen: AtomicBool::new(false),
        }
    }

    pub(crate) fn segment_notifier(&self) -> Notifier<SegmentNotification> {
        Notifier {
            tx: self.segment_tx.clone(),
        }
    }

    pub(crate) fn end_of_data_notifier(&self) -> Notifier<EndOfDataNotification> {
        Notifier {
            tx: self.end_of_data_tx.clone(),
        }
    }

    /// Diff a snapshot against the last observed one and publish what
    /// changed. Send failures mean no subscriber is listening, which is
    /// fine.
    pub(crate) fn observe(&self, state: &ReaderGroupState) {
        let counts = (state.live_segment_count(), state.online_readers().len());
        let mut last = self.last_counts.lock();
        if *last != Some(counts) {
            let changed = last.is_some();
            *last = Some(counts);
            drop(last);
            if changed {
                debug!(
                    num_segments = counts.0,
                    num_readers = counts.1,
                    "publishing segment notification"
                );
                let _ = self.segment_tx.send(SegmentNotification {
                    num_segments: counts.0,
                    num_readers: counts.1,
                });
            }
        }

        if state.is_end_of_data() {
            if !self.end_of_data_seen.swap(true, Ordering::SeqCst) {
                let _ = self.end_of_data_tx.send(EndOfDataNotification);
            }
        } else {
            self.end_of_data_seen.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderGroupConfig;
    use crate::group::{ReaderGroupInit, StateUpdate};
    use crate::model::{Segment, SegmentWithRange, Stream};
    use std::collections::HashMap;

    fn state_with_segments(count: u64) -> ReaderGroupState {
        let stream = Stream::of("scope", "a");
        let config = ReaderGroupConfig::builder()
            .stream(stream.clone())
            .build()
            .unwrap();
        let segments = (0..count)
            .map(|id| {
                (
                    SegmentWithRange::unranged(Segment::new(stream.clone(), id)),
                    0i64,
                )
            })
            .collect();
        ReaderGroupInit::new(config, segments, HashMap::new()).into_state()
    }

    #[tokio::test]
    async fn test_first_observation_is_baseline_not_notification() {
        let hub = NotifierHub::new();
        let mut rx = hub.segment_notifier().subscribe();
        hub.observe(&state_with_segments(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_segment_count_change_notifies() {
        let hub = NotifierHub::new();
        let mut rx = hub.segment_notifier().subscribe();
        let state = state_with_segments(2);
        hub.observe(&state);

        let grown = state_with_segments(3);
        hub.observe(&grown);
        let note = rx.try_recv().unwrap();
        assert_eq!(note.num_segments, 3);
        assert_eq!(note.num_readers, 0);

        // Same counts again: nothing published
        hub.observe(&grown);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reader_count_change_notifies() {
        let hub = NotifierHub::new();
        let mut rx = hub.segment_notifier().subscribe();
        let state = state_with_segments(1);
        hub.observe(&state);

        let joined = StateUpdate::AddReader {
            reader: "r1".into(),
        }
        .apply(&state)
        .unwrap()
        .unwrap();
        hub.observe(&joined);
        assert_eq!(rx.try_recv().unwrap().num_readers, 1);
    }

    #[tokio::test]
    async fn test_end_of_data_fires_once() {
        let hub = NotifierHub::new();
        let mut rx = hub.end_of_data_notifier().subscribe();
        let drained = state_with_segments(0);
        hub.observe(&drained);
        assert!(rx.try_recv().is_ok());

        hub.observe(&drained);
        assert!(rx.try_recv().is_err());

        // Data reappears (reset), then drains again: fires again
        hub.observe(&state_with_segments(1));
        hub.observe(&drained);
        assert!(rx.try_recv().is_ok());
    }
}
