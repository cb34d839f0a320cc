//! Testing utilities for Rillet integration tests
//!
//! An in-memory [`MockController`] standing in for the upstream platform
//! controller: a fixed segment topology per stream, segment lengths for the
//! unread-bytes metric, and a generation-keyed subscriber registry honoring
//! the same idempotency contracts as the real one. Every RPC is recorded so
//! tests can assert on the exact upstream traffic.

use crate::controller::{Controller, SegmentMetadata};
use crate::error::{Result, UpstreamError};
use crate::model::{Segment, Stream, StreamCut};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One subscriber's upstream record
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberRecord {
    pub generation: u64,
    pub stream_cut: Option<StreamCut>,
}

/// In-memory upstream controller.
pub struct MockController {
    /// Segment topology per stream (single-epoch: no splits/merges upstream)
    streams: DashMap<Stream, Vec<Segment>>,
    /// Current written length per segment
    lengths: DashMap<Segment, i64>,
    /// Subscriber registry keyed by (scoped stream, subscriber id)
    subscribers: DashMap<(String, String), SubscriberRecord>,
    /// Every RPC served, in order
    calls: Mutex<Vec<String>>,
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockController {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            lengths: DashMap::new(),
            subscribers: DashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register a stream with the given segment ids, all at length 0
    pub fn add_stream(&self, stream: &Stream, segment_ids: &[u64]) {
        let segments: Vec<Segment> = segment_ids
            .iter()
            .map(|id| Segment::new(stream.clone(), *id))
            .collect();
        for segment in &segments {
            self.lengths.insert(segment.clone(), 0);
        }
        self.streams.insert(stream.clone(), segments);
    }

    /// Set a segment's current written length
    pub fn set_segment_length(&self, segment: &Segment, length: i64) {
        self.lengths.insert(segment.clone(), length);
    }

    /// Subscribers registered on a stream, with their generations
    pub fn subscribers_for(&self, stream: &Stream) -> Vec<(String, u64)> {
        let key = stream.scoped_name();
        let mut subscribers: Vec<(String, u64)> = self
            .subscribers
            .iter()
            .filter(|entry| entry.key().0 == key)
            .map(|entry| (entry.key().1.clone(), entry.value().generation))
            .collect();
        subscribers.sort();
        subscribers
    }

    /// The stream-cut a subscriber last published for a stream
    pub fn subscriber_cut(&self, stream: &Stream, subscriber: &str) -> Option<SubscriberRecord> {
        self.subscribers
            .get(&(stream.scoped_name(), subscriber.to_string()))
            .map(|record| record.clone())
    }

    /// Every RPC served so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn segments_of(&self, stream: &Stream) -> Result<Vec<Segment>> {
        self.streams
            .get(stream)
            .map(|segments| segments.clone())
            .ok_or_else(|| UpstreamError::StreamNotFound(stream.scoped_name()).into())
    }
}

#[async_trait]
impl Controller for MockController {
    async fn get_segments_at_time(
        &self,
        stream: &Stream,
        timestamp: i64,
    ) -> Result<HashMap<Segment, i64>> {
        self.record(format!("get_segments_at_time({}, {})", stream, timestamp));
        let segments = self.segments_of(stream)?;
        Ok(segments.into_iter().map(|segment| (segment, 0)).collect())
    }

    async fn get_successors(&self, from: &StreamCut) -> Result<Vec<Segment>> {
        let stream = from
            .stream()
            .ok_or_else(|| UpstreamError::Rejected("unbounded cut has no successors".into()))?;
        self.record(format!("get_successors({})", stream));
        self.segments_of(stream)
    }

    async fn get_segments(&self, from: &StreamCut, to: &StreamCut) -> Result<Vec<Segment>> {
        let stream = from
            .stream()
            .or_else(|| to.stream())
            .ok_or_else(|| UpstreamError::Rejected("two unbounded cuts".into()))?;
        self.record(format!("get_segments({})", stream));
        // Single-epoch topology: the segments between two cuts are the cuts'
        // own segments.
        let mut segments: Vec<Segment> = from
            .positions()
            .into_iter()
            .chain(to.positions())
            .flat_map(|positions| positions.keys().cloned())
            .collect();
        segments.sort();
        segments.dedup();
        Ok(segments)
    }

    async fn add_subscriber(
        &self,
        scope: &str,
        stream: &str,
        subscriber: &str,
        generation: u64,
    ) -> Result<()> {
        self.record(format!(
            "add_subscriber({}/{}, {}, gen={})",
            scope, stream, subscriber, generation
        ));
        let key = (format!("{}/{}", scope, stream), subscriber.to_string());
        let mut entry = self.subscribers.entry(key).or_insert(SubscriberRecord {
            generation,
            stream_cut: None,
        });
        // NOP when the stored generation is already at or past this call's
        if generation > entry.generation {
            entry.generation = generation;
        }
        Ok(())
    }

    async fn update_subscriber_stream_cut(
        &self,
        scope: &str,
        stream: &str,
        subscriber: &str,
        cut: &StreamCut,
        generation: u64,
    ) -> Result<()> {
        self.record(format!(
            "update_subscriber_stream_cut({}/{}, {}, gen={})",
            scope, stream, subscriber, generation
        ));
        let key = (format!("{}/{}", scope, stream), subscriber.to_string());
        let Some(mut entry) = self.subscribers.get_mut(&key) else {
            return Err(UpstreamError::Rejected(format!(
                "subscriber {} is not registered on {}/{}",
                subscriber, scope, stream
            ))
            .into());
        };
        // NOP when a strictly newer generation already published
        if generation >= entry.generation {
            entry.generation = generation;
            entry.stream_cut = Some(cut.clone());
        }
        Ok(())
    }

    async fn delete_subscriber(
        &self,
        scope: &str,
        stream: &str,
        subscriber: &str,
        generation: u64,
    ) -> Result<()> {
        self.record(format!(
            "delete_subscriber({}/{}, {}, gen={})",
            scope, stream, subscriber, generation
        ));
        self.subscribers
            .remove(&(format!("{}/{}", scope, stream), subscriber.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SegmentMetadata for MockController {
    async fn current_length(&self, segment: &Segment) -> Result<i64> {
        Ok(self
            .lengths
            .get(segment)
            .map(|length| *length)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream::of("scope", "a")
    }

    #[tokio::test]
    async fn test_unknown_stream_is_not_found() {
        let controller = MockController::new();
        let err = controller
            .get_segments_at_time(&stream(), 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stream not found"));
    }

    #[tokio::test]
    async fn test_add_subscriber_is_generation_idempotent() {
        let controller = MockController::new();
        controller.add_stream(&stream(), &[0]);

        controller
            .add_subscriber("scope", "a", "group1", 3)
            .await
            .unwrap();
        // A stale replay neither fails nor regresses the generation
        controller
            .add_subscriber("scope", "a", "group1", 1)
            .await
            .unwrap();
        assert_eq!(
            controller.subscribers_for(&stream()),
            vec![("group1".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_update_cut_ignores_stale_generation() {
        let controller = MockController::new();
        controller.add_stream(&stream(), &[0]);
        controller
            .add_subscriber("scope", "a", "group1", 2)
            .await
            .unwrap();

        let cut = StreamCut::fixed(
            stream(),
            HashMap::from([(Segment::new(stream(), 0), 30i64)]),
        );
        controller
            .update_subscriber_stream_cut("scope", "a", "group1", &cut, 2)
            .await
            .unwrap();

        let stale = StreamCut::fixed(
            stream(),
            HashMap::from([(Segment::new(stream(), 0), 5i64)]),
        );
        controller
            .update_subscriber_stream_cut("scope", "a", "group1", &stale, 1)
            .await
            .unwrap();

        let record = controller.subscriber_cut(&stream(), "group1").unwrap();
        assert_eq!(record.stream_cut, Some(cut));
        assert_eq!(record.generation, 2);
    }

    #[tokio::test]
    async fn test_delete_subscriber_is_idempotent() {
        let controller = MockController::new();
        controller.add_stream(&stream(), &[0]);
        controller
            .add_subscriber("scope", "a", "group1", 0)
            .await
            .unwrap();
        controller
            .delete_subscriber("scope", "a", "group1", 1)
            .await
            .unwrap();
        controller
            .delete_subscriber("scope", "a", "group1", 1)
            .await
            .unwrap();
        assert!(controller.subscribers_for(&stream()).is_empty());
    }

    #[tokio::test]
    async fn test_segment_lengths() {
        let controller = MockController::new();
        controller.add_stream(&stream(), &[0]);
        let segment = Segment::new(stream(), 0);
        assert_eq!(controller.current_length(&segment).await.unwrap(), 0);
        controller.set_segment_length(&segment, 90);
        assert_eq!(controller.current_length(&segment).await.unwrap(), 90);
    }
}
