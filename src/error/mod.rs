//! Error types for Rillet
//!
//! This module defines the main error type used throughout the reader-group
//! coordinator and the upstream-controller error classification that drives
//! retry decisions.

use thiserror::Error;

/// Result type alias for Rillet operations
pub type Result<T> = std::result::Result<T, RilletError>;

/// Main error type for Rillet
#[derive(Error, Debug)]
pub enum RilletError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or wire-version mismatch. Fatal: the replicated state
    /// cannot be interpreted and the coordinator must not continue on it.
    #[error("wire format error: {0}")]
    Wire(String),

    #[error("synchronizer error: {0}")]
    Synchronizer(String),

    #[error("max outstanding checkpoint requests reached: {0}")]
    MaxOutstandingCheckpoints(String),

    #[error("checkpoint failed: {0}")]
    CheckpointFailed(String),

    /// The group was deleted or its configuration replaced under the caller.
    /// Readers must discard local state and rejoin.
    #[error("reinitialization required: {0}")]
    ReinitializationRequired(String),

    #[error("invalid stream: {0}")]
    InvalidStream(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RilletError {
    /// Create a wire format error
    pub fn wire(detail: impl Into<String>) -> Self {
        RilletError::Wire(detail.into())
    }

    /// Create a synchronizer error
    pub fn synchronizer(detail: impl Into<String>) -> Self {
        RilletError::Synchronizer(detail.into())
    }

    /// Create a checkpoint failure with context
    pub fn checkpoint_failed(detail: impl Into<String>) -> Self {
        RilletError::CheckpointFailed(detail.into())
    }

    /// Create a reinitialization-required error
    pub fn reinitialization_required(detail: impl Into<String>) -> Self {
        RilletError::ReinitializationRequired(detail.into())
    }

    /// Create an invalid-stream error
    pub fn invalid_stream(detail: impl Into<String>) -> Self {
        RilletError::InvalidStream(detail.into())
    }

    /// Create an illegal-state error
    pub fn illegal_state(detail: impl Into<String>) -> Self {
        RilletError::IllegalState(detail.into())
    }

    /// Returns true if retrying the failed operation can succeed.
    ///
    /// Only upstream-controller failures are ever retriable; every local
    /// error kind is either terminal for the call or fatal for the process.
    pub fn is_retriable(&self) -> bool {
        match self {
            RilletError::Upstream(e) => e.is_retriable(),
            _ => false,
        }
    }
}

/// Failure reported by the upstream controller, classified for retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Connection-level failure (reset, broken pipe). Retriable.
    #[error("connection error: {0}")]
    Connection(String),

    /// The controller is electing a leader. Retriable.
    #[error("leader election in progress: {0}")]
    LeaderElection(String),

    /// The controller rejected the request (e.g. a stale generation).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The referenced stream does not exist upstream.
    #[error("stream not found: {0}")]
    StreamNotFound(String),
}

impl UpstreamError {
    /// Returns true if the controller classified this failure as transient
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Connection(_) | UpstreamError::LeaderElection(_)
        )
    }
}
