//! Reader group replicated state
//!
//! The state value shared by every process of one reader group, the closed
//! set of updates that mutate it, and the checkpoint sub-engine. Everything
//! in this module is pure: side effects (controller RPCs, notifier fan-out)
//! belong to [`crate::coordinator`], after an update commits.

pub mod checkpoint;
pub mod state;
pub mod update;

pub use checkpoint::{CheckpointState, CompletedCheckpoint, SILENT_SUFFIX};
pub use state::{ConfigState, Lifecycle, ReaderGroupState};
pub use update::{ReaderGroupInit, StateUpdate};
