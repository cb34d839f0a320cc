//! Shared fixtures for Rillet integration tests
//!
//! Builds a reader group against the in-memory mock controller and the
//! log-backed synchronizer. Tests that need a second "process" create
//! another coordinator over a handle of the same log.

#![allow(dead_code)]

use rillet::config::{ReaderGroupConfig, RetentionType};
use rillet::coordinator::ReaderGroup;
use rillet::model::{Segment, SegmentWithRange, Stream};
use rillet::sync::LogSynchronizer;
use rillet::testing::MockController;
use std::collections::HashMap;
use std::sync::Arc;

pub const SCOPE: &str = "scope";
pub const GROUP: &str = "billing";
pub const SEGMENT_ID: u64 = 7;

pub struct TestGroup {
    pub controller: Arc<MockController>,
    pub sync: Arc<LogSynchronizer>,
    pub group: Arc<ReaderGroup<LogSynchronizer>>,
    pub stream: Stream,
}

impl TestGroup {
    /// The subscriber id this group registers upstream
    pub fn subscriber_id(&self) -> String {
        format!("{}{}", GROUP, SEGMENT_ID)
    }

    /// A second coordinator over the same shared log, as another process
    /// would see it
    pub fn peer_coordinator(&self) -> Arc<ReaderGroup<LogSynchronizer>> {
        Arc::new(ReaderGroup::new(
            SCOPE,
            GROUP,
            self.controller.clone() as Arc<dyn rillet::controller::Controller>,
            self.controller.clone() as Arc<dyn rillet::controller::SegmentMetadata>,
            Arc::new(self.sync.handle()),
        ))
    }

    pub fn segment(&self, id: u64) -> Segment {
        Segment::new(self.stream.clone(), id)
    }

    pub fn segment_with_range(&self, id: u64) -> SegmentWithRange {
        SegmentWithRange::unranged(self.segment(id))
    }
}

pub fn test_stream() -> Stream {
    Stream::of(SCOPE, "orders")
}

pub fn config_for(stream: &Stream, retention: RetentionType) -> ReaderGroupConfig {
    ReaderGroupConfig::builder()
        .stream(stream.clone())
        .retention(retention)
        .build()
        .unwrap()
}

/// A controller with one stream of `segment_ids`, and a coordinator wired to
/// it. The group state is not created yet.
pub fn build_group(segment_ids: &[u64]) -> TestGroup {
    let stream = test_stream();
    let controller = Arc::new(MockController::new());
    controller.add_stream(&stream, segment_ids);

    let sync = Arc::new(LogSynchronizer::new(SEGMENT_ID));
    let group = Arc::new(ReaderGroup::new(
        SCOPE,
        GROUP,
        controller.clone() as Arc<dyn rillet::controller::Controller>,
        controller.clone() as Arc<dyn rillet::controller::SegmentMetadata>,
        sync.clone(),
    ));
    TestGroup {
        controller,
        sync,
        group,
        stream,
    }
}

/// Like [`build_group`], with the state created and driven to READY.
pub async fn ready_group(segment_ids: &[u64], retention: RetentionType) -> TestGroup {
    let fixture = build_group(segment_ids);
    let config = config_for(&fixture.stream, retention);
    fixture.group.create_state(config).await.unwrap();
    fixture
}

/// Positions map for a reported checkpoint slice
pub fn positions(entries: &[(Segment, i64)]) -> HashMap<Segment, i64> {
    entries.iter().cloned().collect()
}
