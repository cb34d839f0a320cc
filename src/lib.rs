#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Rillet reader-group coordination
//!
//! This crate implements the reader-group coordinator of the Rillet event
//! streaming platform: a durable, shared cursor over one or more streams,
//! driven cooperatively by many peer reader processes.
//!
//! A reader group is a single logical state — segment-to-reader assignments,
//! checkpoint progress, lifecycle and configuration — replicated through a
//! log-backed *state synchronizer*. Every mutation is a pure update submitted
//! through an optimistic compare-and-set loop, so any number of coordinators
//! and readers can drive the same group concurrently without process locks.
//!
//! ## What lives here
//!
//! - [`group`]: the replicated [`group::ReaderGroupState`], the closed
//!   [`group::StateUpdate`] set applied to it, and the checkpoint sub-engine
//! - [`coordinator`]: the [`coordinator::ReaderGroup`] driving lifecycle
//!   (INITIALIZING → READY → REINITIALIZING/DELETING), checkpoints,
//!   stream-cut generation, subscriber-based retention and the unread-bytes
//!   metric, plus the reader-side [`coordinator::ReaderHandle`]
//! - [`sync`]: the [`sync::StateSynchronizer`] seam and an in-process
//!   log-backed implementation
//! - [`controller`]: the upstream controller RPC surface consumed by the
//!   coordinator
//! - [`wire`]: the versioned binary format for state and updates
//! - [`testing`]: an in-memory mock controller for integration tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use rillet::{LogSynchronizer, ReaderGroup, ReaderGroupConfig};
//! use rillet::model::Stream;
//! use std::sync::Arc;
//!
//! let stream = Stream::of("sales", "orders");
//! let config = ReaderGroupConfig::builder().stream(stream).build()?;
//!
//! let sync = Arc::new(LogSynchronizer::new(1));
//! let group = ReaderGroup::new("sales", "billing", controller, meta, sync);
//! group.create_state(config).await?;
//!
//! let checkpoint = group.initiate_checkpoint("nightly").await?;
//! println!("checkpointed at {:?}", checkpoint.positions());
//! ```

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod group;
pub mod model;
pub mod sync;
pub mod testing;
pub mod wire;

pub use config::{ReaderGroupConfig, ReaderGroupConfigBuilder, RetentionType};
pub use coordinator::{
    Checkpoint, CheckpointEvent, EndOfDataNotification, Notifier, ReaderGroup, ReaderHandle,
    SegmentNotification,
};
pub use error::{Result, RilletError, UpstreamError};
pub use group::{
    CheckpointState, ConfigState, ReaderGroupInit, ReaderGroupState, StateUpdate, SILENT_SUFFIX,
};
pub use model::{
    KeyRange, Position, ReaderSegmentDistribution, Segment, SegmentWithRange, Stream, StreamCut,
};
pub use sync::{LogSynchronizer, StateSynchronizer};
