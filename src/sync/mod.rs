//! State synchronizer
//!
//! The seam between the coordinator and whatever replicates the group state.
//! A synchronizer is a linearizable, log-backed register over
//! [`ReaderGroupState`]: readers fetch the latest snapshot, writers submit
//! pure update batches through an optimistic compare-and-set loop. The
//! transformer closure may run any number of times against fresher
//! snapshots, so it must stay free of side effects; effects belong after the
//! commit.
//!
//! [`LogSynchronizer`] is the in-process implementation used by the embedded
//! platform and by tests. Every committed record round-trips through the
//! versioned wire format, so a state that cannot be re-read is rejected at
//! write time rather than discovered later.

use crate::error::{Result, RilletError};
use crate::group::{ReaderGroupInit, ReaderGroupState, StateUpdate};
use crate::wire::{decode_frame, encode_frame};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, trace};

/// Replicated register over the reader-group state.
pub trait StateSynchronizer: Send + Sync + 'static {
    /// Create the state if it does not exist yet; a no-op otherwise.
    fn initialize(&self, init: ReaderGroupInit) -> Result<()>;

    /// Pull the latest committed snapshot into the local cache.
    fn fetch_updates(&self) -> Result<()>;

    /// The cached snapshot (fetching first if nothing is cached yet).
    fn state(&self) -> Result<Arc<ReaderGroupState>>;

    /// Run the optimistic transaction loop.
    ///
    /// The transformer computes updates (and a return value) from a
    /// snapshot; it is retried against newer snapshots until the batch
    /// commits. Returning an empty batch means "no update needed" and ends
    /// the loop immediately.
    fn update_state<R, F>(&self, transformer: F) -> Result<R>
    where
        F: FnMut(&ReaderGroupState) -> Result<(Vec<StateUpdate>, R)>;

    /// Publish a single update without a compare-and-set guard. For updates
    /// that are safe against any snapshot (checkpoint clearing, silent
    /// checkpoint creation).
    fn update_state_unconditionally(&self, update: StateUpdate) -> Result<()>;

    /// Physical identity of the backing state segment. Stable for the
    /// lifetime of the state object; distinguishes this incarnation of the
    /// group from any prior one with the same name.
    fn segment_id(&self) -> u64;
}

struct LogInner {
    /// Committed records, encoded; entry 0 is the init record
    entries: Vec<Bytes>,
    state: Option<Arc<ReaderGroupState>>,
    revision: u64,
}

/// The log shared by every synchronizer handle of one group.
struct SharedLog {
    inner: Mutex<LogInner>,
}

/// In-process, log-backed state synchronizer.
///
/// All handles created through [`handle`](LogSynchronizer::handle) share one
/// log and therefore observe one linearizable history, while keeping
/// per-handle snapshot caches — the same topology as independent processes
/// sharing a replicated segment.
pub struct LogSynchronizer {
    segment_id: u64,
    shared: Arc<SharedLog>,
    cached: RwLock<Option<Arc<ReaderGroupState>>>,
}

impl LogSynchronizer {
    /// Create a fresh, uninitialized log with the given backing segment id.
    pub fn new(segment_id: u64) -> Self {
        Self {
            segment_id,
            shared: Arc::new(SharedLog {
                inner: Mutex::new(LogInner {
                    entries: Vec::new(),
                    state: None,
                    revision: 0,
                }),
            }),
            cached: RwLock::new(None),
        }
    }

    /// Another handle onto the same log, with its own snapshot cache.
    pub fn handle(&self) -> Self {
        Self {
            segment_id: self.segment_id,
            shared: Arc::clone(&self.shared),
            cached: RwLock::new(None),
        }
    }

    /// Number of committed records, including the init record.
    pub fn log_len(&self) -> usize {
        self.shared.inner.lock().entries.len()
    }

    fn committed(&self) -> Result<(Arc<ReaderGroupState>, u64)> {
        let inner = self.shared.inner.lock();
        match &inner.state {
            Some(state) => Ok((Arc::clone(state), inner.revision)),
            None => Err(RilletError::synchronizer(
                "state is not initialized; call initialize first",
            )),
        }
    }
}

impl StateSynchronizer for LogSynchronizer {
    fn initialize(&self, init: ReaderGroupInit) -> Result<()> {
        let frame = encode_frame(&init)?;
        let mut inner = self.shared.inner.lock();
        if inner.state.is_some() {
            debug!(segment_id = self.segment_id, "state already initialized");
            return Ok(());
        }
        let decoded: ReaderGroupInit = decode_frame(&frame)?;
        let state = Arc::new(decoded.into_state());
        inner.entries.push(frame);
        inner.state = Some(Arc::clone(&state));
        inner.revision = 1;
        drop(inner);
        *self.cached.write() = Some(state);
        debug!(segment_id = self.segment_id, "initialized reader group state");
        Ok(())
    }

    fn fetch_updates(&self) -> Result<()> {
        let (state, _) = self.committed()?;
        *self.cached.write() = Some(state);
        Ok(())
    }

    fn state(&self) -> Result<Arc<ReaderGroupState>> {
        if let Some(state) = self.cached.read().as_ref() {
            return Ok(Arc::clone(state));
        }
        self.fetch_updates()?;
        self.cached
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| RilletError::synchronizer("state is not initialized"))
    }

    fn update_state<R, F>(&self, mut transformer: F) -> Result<R>
    where
        F: FnMut(&ReaderGroupState) -> Result<(Vec<StateUpdate>, R)>,
    {
        loop {
            let (snapshot, revision) = self.committed()?;
            let (updates, ret) = transformer(&snapshot)?;
            if updates.is_empty() {
                *self.cached.write() = Some(snapshot);
                return Ok(ret);
            }

            // Encode outside the lock; every committed record must survive a
            // wire round-trip.
            let mut frames = Vec::with_capacity(updates.len());
            for update in &updates {
                frames.push(encode_frame(update)?);
            }

            let mut inner = self.shared.inner.lock();
            if inner.revision != revision {
                trace!(
                    expected = revision,
                    found = inner.revision,
                    "synchronizer conflict, retrying transformer"
                );
                continue;
            }
            let mut next = (*snapshot).clone();
            for frame in &frames {
                let update: StateUpdate = decode_frame(frame)?;
                if let Some(applied) = update.apply(&next)? {
                    next = applied;
                }
            }
            let committed = Arc::new(next);
            inner.entries.extend(frames);
            inner.state = Some(Arc::clone(&committed));
            inner.revision += 1;
            drop(inner);
            *self.cached.write() = Some(committed);
            return Ok(ret);
        }
    }

    fn update_state_unconditionally(&self, update: StateUpdate) -> Result<()> {
        let frame = encode_frame(&update)?;
        let mut inner = self.shared.inner.lock();
        let current = Arc::clone(snapshot_of(&inner)?);
        let decoded: StateUpdate = decode_frame(&frame)?;
        if let Some(applied) = decoded.apply(&current)? {
            let committed = Arc::new(applied);
            inner.entries.push(frame);
            inner.state = Some(Arc::clone(&committed));
            inner.revision += 1;
            drop(inner);
            *self.cached.write() = Some(committed);
        }
        Ok(())
    }

    fn segment_id(&self) -> u64 {
        self.segment_id
    }
}

fn snapshot_of(inner: &LogInner) -> Result<&Arc<ReaderGroupState>> {
    inner
        .state
        .as_ref()
        .ok_or_else(|| RilletError::synchronizer("state is not initialized"))
}
