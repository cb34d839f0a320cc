//! Reader group configuration
//!
//! [`ReaderGroupConfig`] is the immutable bundle a group is created or reset
//! with: the starting and ending stream-cuts, the retention mode that decides
//! whether the group pins upstream truncation, and the checkpointing knobs.
//! Build one through [`ReaderGroupConfigBuilder`].

use crate::error::{Result, RilletError};
use crate::model::{Stream, StreamCut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How this reader group participates in consumption-based retention of its
/// streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionType {
    /// The group does not pin upstream truncation
    None,
    /// The application publishes retention stream-cuts explicitly
    ManualReleaseAtUserStreamcut,
    /// The last completed checkpoint is published as the retention cut
    AutomaticReleaseAtLastCheckpoint,
}

impl RetentionType {
    /// Whether groups with this retention mode register as subscribers
    pub fn is_subscriber(self) -> bool {
        !matches!(self, RetentionType::None)
    }
}

/// Immutable configuration of a reader group.
///
/// Two configs compare equal only if every field matches; the coordinator
/// uses that equality (together with the generation) as its optimistic-update
/// guard, so a config must never be mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderGroupConfig {
    starting_stream_cuts: HashMap<Stream, StreamCut>,
    ending_stream_cuts: HashMap<Stream, StreamCut>,
    retention: RetentionType,
    max_outstanding_checkpoint_request: u32,
    automatic_checkpoints_disabled: bool,
    group_refresh_millis: u64,
}

impl ReaderGroupConfig {
    /// Start building a configuration
    pub fn builder() -> ReaderGroupConfigBuilder {
        ReaderGroupConfigBuilder::new()
    }

    /// Streams to read and where to start on each
    pub fn starting_stream_cuts(&self) -> &HashMap<Stream, StreamCut> {
        &self.starting_stream_cuts
    }

    /// Per-stream ending cuts; `Unbounded` means read forever
    pub fn ending_stream_cuts(&self) -> &HashMap<Stream, StreamCut> {
        &self.ending_stream_cuts
    }

    pub fn retention(&self) -> RetentionType {
        self.retention
    }

    /// Cap on concurrently outstanding checkpoint requests (at least 1)
    pub fn max_outstanding_checkpoint_request(&self) -> u32 {
        self.max_outstanding_checkpoint_request
    }

    pub fn automatic_checkpoints_disabled(&self) -> bool {
        self.automatic_checkpoints_disabled
    }

    /// Cadence at which background observers refresh the shared state
    pub fn group_refresh_millis(&self) -> u64 {
        self.group_refresh_millis
    }

    /// The streams this group reads
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.starting_stream_cuts.keys()
    }

    /// Reassemble a config from already-validated parts (wire decoding).
    pub(crate) fn from_parts(
        starting_stream_cuts: HashMap<Stream, StreamCut>,
        ending_stream_cuts: HashMap<Stream, StreamCut>,
        retention: RetentionType,
        max_outstanding_checkpoint_request: u32,
        automatic_checkpoints_disabled: bool,
        group_refresh_millis: u64,
    ) -> Self {
        Self {
            starting_stream_cuts,
            ending_stream_cuts,
            retention,
            max_outstanding_checkpoint_request,
            automatic_checkpoints_disabled,
            group_refresh_millis,
        }
    }
}

/// Builder for [`ReaderGroupConfig`]
///
/// ```rust
/// use rillet::config::{ReaderGroupConfig, RetentionType};
/// use rillet::model::Stream;
///
/// let config = ReaderGroupConfig::builder()
///     .stream(Stream::of("sales", "orders"))
///     .retention(RetentionType::ManualReleaseAtUserStreamcut)
///     .max_outstanding_checkpoint_request(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_outstanding_checkpoint_request(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ReaderGroupConfigBuilder {
    starting_stream_cuts: HashMap<Stream, StreamCut>,
    ending_stream_cuts: HashMap<Stream, StreamCut>,
    retention: RetentionType,
    max_outstanding_checkpoint_request: u32,
    automatic_checkpoints_disabled: bool,
    group_refresh_millis: u64,
}

impl Default for ReaderGroupConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderGroupConfigBuilder {
    pub fn new() -> Self {
        Self {
            starting_stream_cuts: HashMap::new(),
            ending_stream_cuts: HashMap::new(),
            retention: RetentionType::None,
            max_outstanding_checkpoint_request: 3,
            automatic_checkpoints_disabled: false,
            group_refresh_millis: 3_000,
        }
    }

    /// Read a stream from its head, with no ending bound
    pub fn stream(self, stream: Stream) -> Self {
        self.stream_with_cuts(stream, StreamCut::Unbounded, StreamCut::Unbounded)
    }

    /// Read a stream between explicit cuts
    pub fn stream_with_cuts(mut self, stream: Stream, start: StreamCut, end: StreamCut) -> Self {
        self.starting_stream_cuts.insert(stream.clone(), start);
        self.ending_stream_cuts.insert(stream, end);
        self
    }

    pub fn retention(mut self, retention: RetentionType) -> Self {
        self.retention = retention;
        self
    }

    /// Set the outstanding-checkpoint cap (default: 3).
    ///
    /// Admission of new checkpoints is decided atomically against this cap
    /// inside the state transformer, so racing coordinators can never exceed
    /// it together.
    pub fn max_outstanding_checkpoint_request(mut self, max: u32) -> Self {
        self.max_outstanding_checkpoint_request = max;
        self
    }

    pub fn disable_automatic_checkpoints(mut self) -> Self {
        self.automatic_checkpoints_disabled = true;
        self
    }

    pub fn group_refresh_millis(mut self, millis: u64) -> Self {
        self.group_refresh_millis = millis;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RilletError::IllegalState`] when no stream was added, when
    /// the checkpoint cap is zero, or when a fixed cut names a different
    /// stream than the one it is attached to.
    pub fn build(self) -> Result<ReaderGroupConfig> {
        if self.starting_stream_cuts.is_empty() {
            return Err(RilletError::illegal_state(
                "reader group config requires at least one stream",
            ));
        }
        if self.max_outstanding_checkpoint_request == 0 {
            return Err(RilletError::illegal_state(
                "max_outstanding_checkpoint_request must be at least 1",
            ));
        }
        for (stream, cut) in self
            .starting_stream_cuts
            .iter()
            .chain(self.ending_stream_cuts.iter())
        {
            if let Some(cut_stream) = cut.stream() {
                if cut_stream != stream {
                    return Err(RilletError::illegal_state(format!(
                        "stream cut for {} names stream {}",
                        stream, cut_stream
                    )));
                }
            }
        }
        Ok(ReaderGroupConfig {
            starting_stream_cuts: self.starting_stream_cuts,
            ending_stream_cuts: self.ending_stream_cuts,
            retention: self.retention,
            max_outstanding_checkpoint_request: self.max_outstanding_checkpoint_request,
            automatic_checkpoints_disabled: self.automatic_checkpoints_disabled,
            group_refresh_millis: self.group_refresh_millis,
        })
    }
}
