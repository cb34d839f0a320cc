//! Upstream controller surface
//!
//! The coordinator consumes a small slice of the platform controller: segment
//! resolution for stream-cuts and the subscriber registry that drives
//! consumption-based retention. Subscriber calls are idempotent under
//! `(subscriber, generation)` keying — replays and reordered deliveries are
//! absorbed upstream, so the coordinator retries them freely.

use crate::error::{Result, RilletError};
use crate::model::{Segment, Stream, StreamCut};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// The controller RPCs the reader-group coordinator invokes.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Segments of a stream and their offsets at a point in time.
    /// `timestamp == 0` resolves the current head of the stream.
    async fn get_segments_at_time(
        &self,
        stream: &Stream,
        timestamp: i64,
    ) -> Result<HashMap<Segment, i64>>;

    /// Segments from a fixed cut to the stream's tail
    async fn get_successors(&self, from: &StreamCut) -> Result<Vec<Segment>>;

    /// Segments between two fixed cuts on the same stream
    async fn get_segments(&self, from: &StreamCut, to: &StreamCut) -> Result<Vec<Segment>>;

    /// Register a retention-pinning subscriber. NOP when the stored
    /// generation is already `>= generation`.
    async fn add_subscriber(
        &self,
        scope: &str,
        stream: &str,
        subscriber: &str,
        generation: u64,
    ) -> Result<()>;

    /// Publish the subscriber's retention stream-cut. NOP when the stored
    /// generation is `> generation`.
    async fn update_subscriber_stream_cut(
        &self,
        scope: &str,
        stream: &str,
        subscriber: &str,
        cut: &StreamCut,
        generation: u64,
    ) -> Result<()>;

    /// Remove a subscriber. NOP when it is already gone.
    async fn delete_subscriber(
        &self,
        scope: &str,
        stream: &str,
        subscriber: &str,
        generation: u64,
    ) -> Result<()>;
}

/// Segment metadata client: the single read the unread-bytes metric needs
/// beyond the controller.
#[async_trait]
pub trait SegmentMetadata: Send + Sync {
    /// Current written length of a segment, in bytes
    async fn current_length(&self, segment: &Segment) -> Result<i64>;
}

/// Exponential backoff for retryable upstream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            multiplier: 2,
            max_delay: Duration::from_secs(5),
            max_attempts: 8,
        }
    }
}

/// Run an upstream call, retrying with exponential backoff while the error
/// is classified retryable. Terminal errors surface immediately.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt < policy.max_attempts => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err,
                    "retrying upstream call");
                tokio::time::sleep(delay).await;
                delay = (delay * policy.multiplier).min(policy.max_delay);
                attempt += 1;
            }
            Err(err) => {
                if err.is_retriable() {
                    warn!(attempts = attempt, error = %err, "upstream retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

/// Subscriber RPCs treat upstream "stale generation" rejections as success:
/// a newer call already did this work.
pub(crate) fn absorb_stale_rejection(result: Result<()>) -> Result<()> {
    match result {
        Err(RilletError::Upstream(crate::error::UpstreamError::Rejected(reason))) => {
            debug!(%reason, "stale subscriber call rejected upstream; treating as success");
            Ok(())
        }
        other => other,
    }
}
