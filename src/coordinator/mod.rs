//! Reader group coordinator
//!
//! [`ReaderGroup`] drives one reader group's lifecycle against the shared
//! state: creation, reset, deletion, checkpoints, stream-cut generation,
//! retention subscriber management, and the unread-bytes metric.
//!
//! # Coordination model
//!
//! Any number of coordinator instances (across processes) may drive the same
//! group. Nothing here takes a lock across a suspension point; every write
//! is an optimistic transaction — read a snapshot, compute pure updates,
//! submit under compare-and-set, retry on conflict. Upstream controller
//! calls happen strictly outside the transformers, after the local state
//! committed, and always carry the generation of the snapshot that initiated
//! the transition so the upstream side can discard stale replays.
//!
//! # Lifecycle
//!
//! ```text
//! INITIALIZING ──doInit──▶ READY ──reset──▶ REINITIALIZING ──doReinit──▶ READY
//!      │                     │
//!      └──────── delete ─────┴──▶ DELETING (terminal)
//! ```
//!
//! Whichever coordinator observes a non-READY label helps the transition
//! along; a reset or delete raced by another coordinator joins the winner's
//! work instead of failing.

mod notifier;
mod reader;
mod unread;

pub use notifier::{EndOfDataNotification, Notifier, SegmentNotification};
pub use reader::{CheckpointEvent, ReaderHandle};

use crate::config::ReaderGroupConfig;
use crate::controller::{
    absorb_stale_rejection, with_retries, Controller, RetryPolicy, SegmentMetadata,
};
use crate::error::{Result, RilletError, UpstreamError};
use crate::group::{
    ConfigState, ReaderGroupInit, ReaderGroupState, StateUpdate, SILENT_SUFFIX,
};
use crate::model::{
    Position, ReaderSegmentDistribution, Segment, SegmentWithRange, Stream, StreamCut,
    END_OF_SEGMENT,
};
use crate::sync::StateSynchronizer;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use notifier::NotifierHub;
use rand::Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// How often checkpoint waiters re-read the shared state.
const CHECKPOINT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A completed checkpoint: a consistent per-segment position map.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    name: String,
    positions: HashMap<Segment, i64>,
}

impl Checkpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positions(&self) -> &HashMap<Segment, i64> {
        &self.positions
    }
}

/// Coordinator for one reader group.
pub struct ReaderGroup<S> {
    scope: String,
    group_name: String,
    controller: Arc<dyn Controller>,
    segment_meta: Arc<dyn SegmentMetadata>,
    synchronizer: Arc<S>,
    notifiers: NotifierHub,
    retry: RetryPolicy,
}

impl<S: StateSynchronizer> ReaderGroup<S> {
    pub fn new(
        scope: impl Into<String>,
        group_name: impl Into<String>,
        controller: Arc<dyn Controller>,
        segment_meta: Arc<dyn SegmentMetadata>,
        synchronizer: Arc<S>,
    ) -> Self {
        Self {
            scope: scope.into(),
            group_name: group_name.into(),
            controller,
            segment_meta,
            synchronizer,
            notifiers: NotifierHub::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the backoff applied to retryable upstream failures
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// The identifier this group registers with the upstream subscriber
    /// registry: group name plus the backing state-segment id, so a
    /// recreated group with the same name never aliases its predecessor.
    pub fn subscriber_id(&self) -> String {
        format!("{}{}", self.group_name, self.synchronizer.segment_id())
    }

    /// A handle for one reader of this group, sharing the synchronizer
    pub fn reader(&self, reader_id: impl Into<String>) -> ReaderHandle<S> {
        ReaderHandle::new(reader_id, Arc::clone(&self.synchronizer))
    }

    // ------------------------------------------------------------------
    // lifecycle

    /// Create the replicated state for this group and drive it to READY.
    ///
    /// Safe to call from any number of coordinators: the first initializes,
    /// the rest observe the existing state. Registers the group as an
    /// upstream subscriber on every starting stream when retention is
    /// enabled.
    pub async fn create_state(&self, config: ReaderGroupConfig) -> Result<()> {
        let segments = self.segments_for_streams(&config).await?;
        let end_segments = end_segments_for_streams(&config);
        self.synchronizer
            .initialize(ReaderGroupInit::new(config.clone(), segments, end_segments))?;
        let state = self.refreshed_state()?;
        if state.config_state() == ConfigState::Initializing && state.config() == &config {
            self.do_init(&state).await?;
        }
        Ok(())
    }

    /// Replace the group's configuration.
    ///
    /// Loops until the group is READY under the new configuration. A
    /// concurrent reset by another coordinator is joined rather than
    /// failed: whoever wins the `ResetStart` race, both callers return once
    /// reinitialization completes.
    ///
    /// # Errors
    ///
    /// [`RilletError::ReinitializationRequired`] when the group is being
    /// deleted.
    pub async fn reset_reader_group(&self, config: ReaderGroupConfig) -> Result<()> {
        loop {
            let state = self.refreshed_state()?;
            match state.config_state() {
                ConfigState::Initializing => self.do_init(&state).await?,
                ConfigState::Reinitializing => {
                    // Another coordinator's reset is in flight. Help it
                    // complete; if it installs the configuration this caller
                    // asked for, that reset *is* this reset.
                    let same_reset = state.new_config() == Some(&config);
                    self.do_reinit(&state).await?;
                    if same_reset {
                        return Ok(());
                    }
                }
                ConfigState::Ready => {
                    let new_generation = state.generation() + 1;
                    let update = StateUpdate::ResetStart {
                        new_config: config.clone(),
                        generation: new_generation,
                    };
                    // On success the state is REINITIALIZING and this
                    // coordinator finishes the reset on the fresh snapshot.
                    if self.do_state_transition(&state, update)? {
                        let new_state = self.refreshed_state()?;
                        self.do_reinit(&new_state).await?;
                        return Ok(());
                    }
                }
                ConfigState::Deleting => {
                    self.do_delete(&state).await?;
                    return Err(RilletError::reinitialization_required(
                        "this reader group does not exist",
                    ));
                }
            }
        }
    }

    /// Drive the group to DELETING and release its upstream subscriptions.
    ///
    /// Idempotent: a coordinator observing DELETING finishes the subscriber
    /// cleanup and returns.
    pub async fn delete_state(&self) -> Result<()> {
        loop {
            let state = self.refreshed_state()?;
            match state.config_state() {
                ConfigState::Initializing => self.do_init(&state).await?,
                ConfigState::Reinitializing => self.do_reinit(&state).await?,
                ConfigState::Ready => {
                    let update = StateUpdate::ChangeConfigState {
                        target: ConfigState::Deleting,
                        generation: state.generation() + 1,
                    };
                    if self.do_state_transition(&state, update)? {
                        let new_state = self.refreshed_state()?;
                        self.do_delete(&new_state).await?;
                        return Ok(());
                    }
                }
                ConfigState::Deleting => {
                    self.do_delete(&state).await?;
                    return Ok(());
                }
            }
        }
    }

    /// INITIALIZING → READY: register subscribers (pre-transition
    /// generation), then flip the label under the compare-state guard.
    async fn do_init(&self, state: &ReaderGroupState) -> Result<()> {
        let config = state.config();
        let generation = state.generation();
        if config.retention().is_subscriber() {
            for stream in config.streams() {
                self.add_subscriber_upstream(stream, generation).await?;
            }
        }
        let observed = state.clone();
        self.synchronizer.update_state(move |s| {
            if compare_state(s, &observed) {
                Ok((
                    vec![StateUpdate::ChangeConfigState {
                        target: ConfigState::Ready,
                        generation: s.generation(),
                    }],
                    (),
                ))
            } else {
                Ok((vec![], ()))
            }
        })?;
        info!(group = %self.group_name, generation, "reader group initialized");
        Ok(())
    }

    /// REINITIALIZING → READY: reconcile upstream subscriptions against the
    /// staged configuration, resolve its starting segments, then install it.
    async fn do_reinit(&self, state: &ReaderGroupState) -> Result<()> {
        let Some(new_config) = state.new_config().cloned() else {
            // Another coordinator already completed this reset.
            return Ok(());
        };
        let old_config = state.config().clone();
        let generation = state.generation();
        self.manage_subscriptions(&old_config, &new_config, generation)
            .await?;

        let segments = self.segments_for_streams(&new_config).await?;
        let end_segments = end_segments_for_streams(&new_config);
        let observed = state.clone();
        self.synchronizer.update_state(move |s| {
            if compare_state(s, &observed) {
                Ok((
                    vec![StateUpdate::ResetComplete {
                        config: new_config.clone(),
                        segments: segments.clone(),
                        end_segments: end_segments.clone(),
                    }],
                    (),
                ))
            } else {
                Ok((vec![], ()))
            }
        })?;
        info!(group = %self.group_name, generation, "reader group reinitialized");
        Ok(())
    }

    /// DELETING: unsubscribe every retention-pinning stream. The state
    /// itself stays terminal; removing the backing segment is the platform's
    /// job once the subscriptions are gone.
    async fn do_delete(&self, state: &ReaderGroupState) -> Result<()> {
        let config = state.config();
        let generation = state.generation();
        if config.retention().is_subscriber() {
            for stream in config.streams() {
                self.delete_subscriber_upstream(stream, generation).await?;
            }
        }
        info!(group = %self.group_name, generation, "reader group deleted");
        Ok(())
    }

    /// Diff the retention-pinning stream sets of two configurations and
    /// reconcile the upstream registry, carrying the pre-transition
    /// generation.
    async fn manage_subscriptions(
        &self,
        old_config: &ReaderGroupConfig,
        new_config: &ReaderGroupConfig,
        generation: u64,
    ) -> Result<()> {
        let old_streams: HashSet<&Stream> = if old_config.retention().is_subscriber() {
            old_config.streams().collect()
        } else {
            HashSet::new()
        };
        let new_streams: HashSet<&Stream> = if new_config.retention().is_subscriber() {
            new_config.streams().collect()
        } else {
            HashSet::new()
        };
        for stream in new_streams.difference(&old_streams) {
            self.add_subscriber_upstream(stream, generation).await?;
        }
        for stream in old_streams.difference(&new_streams) {
            self.delete_subscriber_upstream(stream, generation).await?;
        }
        Ok(())
    }

    async fn add_subscriber_upstream(&self, stream: &Stream, generation: u64) -> Result<()> {
        let subscriber = self.subscriber_id();
        debug!(%stream, %subscriber, generation, "registering subscriber");
        absorb_stale_rejection(
            with_retries(&self.retry, || {
                self.controller
                    .add_subscriber(&self.scope, &stream.name, &subscriber, generation)
            })
            .await,
        )
    }

    async fn delete_subscriber_upstream(&self, stream: &Stream, generation: u64) -> Result<()> {
        let subscriber = self.subscriber_id();
        debug!(%stream, %subscriber, generation, "removing subscriber");
        absorb_stale_rejection(
            with_retries(&self.retry, || {
                self.controller
                    .delete_subscriber(&self.scope, &stream.name, &subscriber, generation)
            })
            .await,
        )
    }

    /// Propose a single guarded update. Returns whether it was submitted,
    /// i.e. whether the live state still matched the observed one.
    fn do_state_transition(
        &self,
        observed: &ReaderGroupState,
        update: StateUpdate,
    ) -> Result<bool> {
        self.synchronizer.update_state(|s| {
            if compare_state(s, observed) {
                Ok((vec![update.clone()], true))
            } else {
                Ok((vec![], false))
            }
        })
    }

    fn refreshed_state(&self) -> Result<Arc<ReaderGroupState>> {
        self.synchronizer.fetch_updates()?;
        self.synchronizer.state()
    }

    // ------------------------------------------------------------------
    // checkpoints

    /// Initiate a checkpoint and wait for every online reader to report.
    ///
    /// Admission against the outstanding-checkpoint cap happens atomically
    /// inside the state transformer, so concurrent initiations can never
    /// jointly exceed it. The returned future may be dropped freely — the
    /// checkpoint itself keeps running and is consumed by the next
    /// coordinator to observe it.
    ///
    /// # Errors
    ///
    /// - [`RilletError::MaxOutstandingCheckpoints`] when the cap is reached
    /// - [`RilletError::CheckpointFailed`] when another coordinator cleared
    ///   the results before this caller could read them
    /// - [`RilletError::ReinitializationRequired`] when the group is deleted
    ///   while waiting
    pub async fn initiate_checkpoint(&self, checkpoint_name: &str) -> Result<Checkpoint> {
        let id = checkpoint_name.to_string();
        let admitted = self.synchronizer.update_state(|state| {
            let max = state.config().max_outstanding_checkpoint_request() as usize;
            let outstanding = state.checkpoints().outstanding_len();
            if outstanding >= max {
                warn!(
                    checkpoint = %id,
                    outstanding,
                    max,
                    "rejecting checkpoint request: outstanding checkpoints at the cap"
                );
                Ok((vec![], false))
            } else {
                Ok((vec![StateUpdate::CreateCheckpoint { id: id.clone() }], true))
            }
        })?;
        if !admitted {
            return Err(RilletError::MaxOutstandingCheckpoints(format!(
                "checkpoint {} rejected: outstanding checkpoints reached the configured cap",
                checkpoint_name
            )));
        }

        self.wait_for_checkpoint_complete(checkpoint_name).await?;
        self.consume_checkpoint(checkpoint_name)
    }

    /// Poll the shared state until the checkpoint completes.
    async fn wait_for_checkpoint_complete(&self, checkpoint_name: &str) -> Result<()> {
        loop {
            sleep(CHECKPOINT_POLL_INTERVAL).await;
            let state = self.refreshed_state()?;
            if state.config_state() == ConfigState::Deleting {
                return Err(RilletError::reinitialization_required(format!(
                    "reader group was deleted while waiting on checkpoint {}",
                    checkpoint_name
                )));
            }
            if state.checkpoints().is_complete(checkpoint_name) {
                return Ok(());
            }
            debug!(checkpoint = %checkpoint_name, "waiting on checkpoint");
        }
    }

    /// Consume a completed checkpoint: read its positions and clear the
    /// FIFO through it. No await point sits between the read and the clear,
    /// so dropping a caller future can never leave the clear half-done.
    fn consume_checkpoint(&self, checkpoint_name: &str) -> Result<Checkpoint> {
        let state = self.synchronizer.state()?;
        let positions = state.checkpoints().positions_for(checkpoint_name);
        self.synchronizer
            .update_state_unconditionally(StateUpdate::ClearCheckpointsBefore {
                id: checkpoint_name.to_string(),
            })?;
        match positions {
            Some(positions) => Ok(Checkpoint {
                name: checkpoint_name.to_string(),
                positions,
            }),
            None => Err(RilletError::checkpoint_failed(
                "checkpoint was cleared before results could be read",
            )),
        }
    }

    // ------------------------------------------------------------------
    // stream cuts and retention

    /// Compute a consistent stream-cut per stream through a silent
    /// checkpoint. Readers participate but no application-visible
    /// checkpoint event is generated.
    pub async fn generate_stream_cuts(&self) -> Result<HashMap<Stream, StreamCut>> {
        let id = generate_silent_checkpoint_id();
        debug!(checkpoint = %id, "generating stream cuts");
        self.synchronizer
            .update_state_unconditionally(StateUpdate::CreateCheckpoint { id: id.clone() })?;
        self.wait_for_checkpoint_complete(&id).await?;
        self.consume_checkpoint_as_stream_cuts(&id)
    }

    fn consume_checkpoint_as_stream_cuts(&self, id: &str) -> Result<HashMap<Stream, StreamCut>> {
        let state = self.synchronizer.state()?;
        let cuts = project_stream_cuts(&state, id);
        self.synchronizer
            .update_state_unconditionally(StateUpdate::ClearCheckpointsBefore {
                id: id.to_string(),
            })?;
        cuts.ok_or_else(|| {
            RilletError::checkpoint_failed(
                "internal checkpoint was cleared before results could be read",
            )
        })
    }

    /// Publish retention stream-cuts to the upstream subscriber registry.
    /// The upstream controller is then free to truncate each stream's
    /// prefix within its configured retention window.
    ///
    /// # Errors
    ///
    /// [`RilletError::IllegalState`] unless the group is READY.
    pub async fn update_retention_stream_cut(
        &self,
        stream_cuts: &HashMap<Stream, StreamCut>,
    ) -> Result<()> {
        let state = self.refreshed_state()?;
        if state.config_state() != ConfigState::Ready {
            return Err(RilletError::illegal_state(
                "retention stream-cut update failed: reader group is not READY, retry later",
            ));
        }
        let generation = state.generation();
        let subscriber = self.subscriber_id();
        for (stream, cut) in stream_cuts {
            debug!(%stream, %subscriber, generation, "updating subscriber stream cut");
            absorb_stale_rejection(
                with_retries(&self.retry, || {
                    self.controller.update_subscriber_stream_cut(
                        &stream.scope,
                        &stream.name,
                        &subscriber,
                        cut,
                        generation,
                    )
                })
                .await,
            )?;
        }
        Ok(())
    }

    /// The group's current per-stream positions as stream-cuts
    /// (reassignment ranges dropped).
    pub fn stream_cuts(&self) -> Result<HashMap<Stream, StreamCut>> {
        let state = self.refreshed_state()?;
        Ok(state
            .last_read_positions()
            .into_iter()
            .map(|(stream, positions)| {
                let cut = StreamCut::fixed(stream.clone(), unread::drop_range(positions));
                (stream, cut)
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // readers and metrics

    /// Declare a reader offline, returning its segments to the unassigned
    /// pool at `last_position` offsets when given, else at its last
    /// reported ones.
    pub fn reader_offline(&self, reader_id: &str, last_position: Option<Position>) -> Result<()> {
        let positions = last_position.map(Position::into_owned);
        info!(group = %self.group_name, reader = reader_id, "declaring reader offline");
        self.synchronizer.update_state(|state| {
            if !state.is_reader_online(reader_id) {
                return Ok((vec![], ()));
            }
            Ok((
                vec![StateUpdate::RemoveReader {
                    reader: reader_id.to_string(),
                    positions: positions.clone(),
                }],
                (),
            ))
        })
    }

    pub fn online_readers(&self) -> Result<BTreeSet<String>> {
        Ok(self.refreshed_state()?.online_readers())
    }

    /// Scoped names of the streams this group reads
    pub fn stream_names(&self) -> Result<HashSet<String>> {
        Ok(self.refreshed_state()?.stream_names())
    }

    /// Segment spread across readers, plus the unassigned count
    pub fn reader_segment_distribution(&self) -> Result<ReaderSegmentDistribution> {
        let state = self.refreshed_state()?;
        let distribution = state.distribution();
        info!(
            group = %self.group_name,
            unassigned = distribution.unassigned_segments,
            distribution = ?distribution.reader_segment_distribution,
            "reader segment distribution"
        );
        Ok(distribution)
    }

    /// Total bytes between the group's position and its ending cuts (or the
    /// stream tails), summed across streams.
    pub async fn unread_bytes(&self) -> Result<i64> {
        let state = self.refreshed_state()?;
        unread::unread_bytes(&state, self.controller.as_ref(), self.segment_meta.as_ref()).await
    }

    // ------------------------------------------------------------------
    // notifiers

    /// Observable for segment/reader count changes
    pub fn segment_notifier(&self) -> Notifier<SegmentNotification> {
        self.notifiers.segment_notifier()
    }

    /// Observable firing once all segments are read to their ends
    pub fn end_of_data_notifier(&self) -> Notifier<EndOfDataNotification> {
        self.notifiers.end_of_data_notifier()
    }

    /// Refresh the shared state once and publish any derived notifications
    pub fn poll_notifiers(&self) -> Result<()> {
        let state = self.refreshed_state()?;
        self.notifiers.observe(&state);
        Ok(())
    }

    /// Poll-and-publish loop at the configured group refresh cadence.
    /// Runs until an error; callers typically spawn and abort it.
    pub async fn run_notifiers(&self) -> Result<()> {
        loop {
            self.poll_notifiers()?;
            let millis = self.synchronizer.state()?.config().group_refresh_millis();
            sleep(Duration::from_millis(millis)).await;
        }
    }

    // ------------------------------------------------------------------
    // segment resolution

    /// Resolve a configuration's starting cuts into concrete segments.
    /// Unbounded cuts resolve to the stream head via the controller.
    async fn segments_for_streams(
        &self,
        config: &ReaderGroupConfig,
    ) -> Result<HashMap<SegmentWithRange, i64>> {
        let mut segments = HashMap::new();
        for (stream, cut) in config.starting_stream_cuts() {
            match cut {
                StreamCut::Unbounded => {
                    let resolved = self
                        .controller
                        .get_segments_at_time(stream, 0)
                        .await
                        .map_err(invalid_stream_on_not_found)?;
                    for (segment, offset) in resolved {
                        segments.insert(SegmentWithRange::unranged(segment), offset);
                    }
                }
                StreamCut::Fixed { positions, .. } => {
                    for (segment, offset) in positions {
                        segments.insert(SegmentWithRange::unranged(segment.clone()), *offset);
                    }
                }
            }
        }
        Ok(segments)
    }
}

fn invalid_stream_on_not_found(err: RilletError) -> RilletError {
    match err {
        RilletError::Upstream(UpstreamError::StreamNotFound(stream)) => {
            RilletError::invalid_stream(stream)
        }
        other => other,
    }
}

/// Concrete end segments from a configuration's ending cuts. A `-1` offset
/// means read to the end of the segment and is promoted to `i64::MAX`.
fn end_segments_for_streams(config: &ReaderGroupConfig) -> HashMap<Segment, i64> {
    let mut end_segments = HashMap::new();
    for cut in config.ending_stream_cuts().values() {
        if let Some(positions) = cut.positions() {
            for (segment, offset) in positions {
                let offset = if *offset == END_OF_SEGMENT {
                    i64::MAX
                } else {
                    *offset
                };
                end_segments.insert(segment.clone(), offset);
            }
        }
    }
    end_segments
}

/// The optimistic-update guard: two snapshots agree when their generation,
/// configuration, staged configuration, and lifecycle label all match.
fn compare_state(a: &ReaderGroupState, b: &ReaderGroupState) -> bool {
    a.generation() == b.generation()
        && a.config() == b.config()
        && a.new_config() == b.new_config()
        && a.config_state() == b.config_state()
}

/// Project a completed checkpoint into one stream-cut per configured
/// stream. Streams or segments no reader reported (e.g. unassigned at
/// creation) are filled from the last read positions.
fn project_stream_cuts(
    state: &ReaderGroupState,
    checkpoint_id: &str,
) -> Option<HashMap<Stream, StreamCut>> {
    let mut by_stream = state.checkpoints().stream_positions_for(checkpoint_id)?;
    let last_read = state.last_read_positions();
    for stream in state.config().streams() {
        let positions = by_stream.entry(stream.clone()).or_default();
        if let Some(fallback) = last_read.get(stream) {
            for (segment, offset) in fallback {
                positions.entry(segment.segment.clone()).or_insert(*offset);
            }
        }
    }
    Some(
        by_stream
            .into_iter()
            .map(|(stream, positions)| {
                let cut = StreamCut::fixed(stream.clone(), positions);
                (stream, cut)
            })
            .collect(),
    )
}

/// Internal checkpoint id: 32 random bytes, URL-safe base64, plus the
/// silent suffix that keeps readers from surfacing it as a checkpoint
/// event.
fn generate_silent_checkpoint_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    format!("{}{}", URL_SAFE_NO_PAD.encode(bytes), SILENT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderGroupConfigBuilder;
    use crate::group::CheckpointState;

    fn stream() -> Stream {
        Stream::of("scope", "a")
    }

    fn base_config() -> ReaderGroupConfigBuilder {
        ReaderGroupConfig::builder().stream(stream())
    }

    #[test]
    fn test_silent_checkpoint_id_shape() {
        let id = generate_silent_checkpoint_id();
        assert!(id.ends_with(SILENT_SUFFIX));
        assert!(CheckpointState::is_silent(&id));
        // 32 bytes of URL-safe base64 without padding is 43 characters
        assert_eq!(id.len(), 43 + SILENT_SUFFIX.len());
        assert_ne!(id, generate_silent_checkpoint_id());
    }

    #[test]
    fn test_end_segments_promote_end_of_segment_sentinel() {
        let end = StreamCut::fixed(
            stream(),
            HashMap::from([
                (Segment::new(stream(), 0), END_OF_SEGMENT),
                (Segment::new(stream(), 1), 512),
            ]),
        );
        let config = base_config()
            .stream_with_cuts(stream(), StreamCut::Unbounded, end)
            .build()
            .unwrap();
        let ends = end_segments_for_streams(&config);
        assert_eq!(ends[&Segment::new(stream(), 0)], i64::MAX);
        assert_eq!(ends[&Segment::new(stream(), 1)], 512);
    }

    #[test]
    fn test_end_segments_skip_unbounded_cuts() {
        let config = base_config().build().unwrap();
        assert!(end_segments_for_streams(&config).is_empty());
    }

    #[test]
    fn test_compare_state_fields() {
        let config = base_config().build().unwrap();
        let init = ReaderGroupInit::new(config, HashMap::new(), HashMap::new());
        let a = init.clone().into_state();
        let b = init.into_state();
        assert!(compare_state(&a, &b));

        let advanced = StateUpdate::ChangeConfigState {
            target: ConfigState::Ready,
            generation: 0,
        }
        .apply(&b)
        .unwrap()
        .unwrap();
        assert!(!compare_state(&a, &advanced));
    }
}
