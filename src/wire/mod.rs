//! Versioned wire format for replicated state
//!
//! Every record written to the state-synchronizer log is framed as
//! `{write_version: u8, revision: u8, payload}`. A decoder built at
//! [`WIRE_VERSION`] accepts any revision up to its own and rejects higher
//! ones as fatal, so mixed-version coordinators fail loudly instead of
//! misreading each other's updates.
//!
//! Encoding conventions: strings are `u16` length plus UTF-8, maps and
//! collections are a `u32` count followed by their entries, offsets are
//! big-endian `i64`.

use crate::config::{ReaderGroupConfig, RetentionType};
use crate::error::{Result, RilletError};
use crate::group::checkpoint::{CheckpointState, CompletedCheckpoint};
use crate::group::state::{ConfigState, Lifecycle, ReaderGroupState};
use crate::group::update::{ReaderGroupInit, StateUpdate};
use crate::model::{KeyRange, Segment, SegmentWithRange, Stream, StreamCut};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::{HashMap, HashSet};

/// The newest revision this build reads and the one it writes.
pub const WIRE_VERSION: u8 = 0;

/// A value encodable into the versioned log format
pub trait WireEncode {
    fn encode(&self, buf: &mut BytesMut) -> Result<()>;
}

/// A value decodable from the versioned log format
pub trait WireDecode: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self>;
}

/// Frame a value: version header plus payload.
pub fn encode_frame<T: WireEncode>(value: &T) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_u8(WIRE_VERSION);
    buf.put_u8(WIRE_VERSION);
    value.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Decode a framed value, enforcing the revision ceiling.
pub fn decode_frame<T: WireDecode>(frame: &Bytes) -> Result<T> {
    let mut buf = frame.clone();
    need(&buf, 2)?;
    let _write_version = buf.get_u8();
    let revision = buf.get_u8();
    if revision > WIRE_VERSION {
        return Err(RilletError::wire(format!(
            "record revision {} is newer than supported revision {}",
            revision, WIRE_VERSION
        )));
    }
    let value = T::decode(&mut buf)?;
    if buf.has_remaining() {
        return Err(RilletError::wire(format!(
            "{} trailing bytes after record payload",
            buf.remaining()
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// primitives

fn need(buf: &Bytes, len: usize) -> Result<()> {
    if buf.remaining() < len {
        return Err(RilletError::wire(format!(
            "record truncated: need {} bytes, have {}",
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn put_str(buf: &mut BytesMut, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| RilletError::wire(format!("string of {} bytes exceeds u16 length", s.len())))?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str(buf: &mut Bytes) -> Result<String> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    need(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|e| RilletError::wire(format!("invalid UTF-8: {}", e)))
}

fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

fn get_bool(buf: &mut Bytes) -> Result<bool> {
    need(buf, 1)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RilletError::wire(format!("invalid bool byte {}", other))),
    }
}

fn put_count(buf: &mut BytesMut, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| RilletError::wire(format!("collection of {} entries exceeds u32 count", len)))?;
    buf.put_u32(len);
    Ok(())
}

fn get_count(buf: &mut Bytes) -> Result<usize> {
    need(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

fn put_map<K, V>(
    buf: &mut BytesMut,
    map: &HashMap<K, V>,
    mut put_key: impl FnMut(&mut BytesMut, &K) -> Result<()>,
    mut put_value: impl FnMut(&mut BytesMut, &V) -> Result<()>,
) -> Result<()> {
    put_count(buf, map.len())?;
    for (key, value) in map {
        put_key(buf, key)?;
        put_value(buf, value)?;
    }
    Ok(())
}

fn get_map<K: std::hash::Hash + Eq, V>(
    buf: &mut Bytes,
    mut get_key: impl FnMut(&mut Bytes) -> Result<K>,
    mut get_value: impl FnMut(&mut Bytes) -> Result<V>,
) -> Result<HashMap<K, V>> {
    let len = get_count(buf)?;
    let mut map = HashMap::with_capacity(len.min(1024));
    for _ in 0..len {
        let key = get_key(buf)?;
        let value = get_value(buf)?;
        map.insert(key, value);
    }
    Ok(map)
}

fn put_offset(buf: &mut BytesMut, offset: &i64) -> Result<()> {
    buf.put_i64(*offset);
    Ok(())
}

fn get_offset(buf: &mut Bytes) -> Result<i64> {
    need(buf, 8)?;
    Ok(buf.get_i64())
}

// ---------------------------------------------------------------------------
// model types

impl WireEncode for Stream {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_str(buf, &self.scope)?;
        put_str(buf, &self.name)
    }
}

impl WireDecode for Stream {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Stream {
            scope: get_str(buf)?,
            name: get_str(buf)?,
        })
    }
}

impl WireEncode for Segment {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.stream.encode(buf)?;
        buf.put_u64(self.id);
        Ok(())
    }
}

impl WireDecode for Segment {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let stream = Stream::decode(buf)?;
        need(buf, 8)?;
        Ok(Segment {
            stream,
            id: buf.get_u64(),
        })
    }
}

impl WireEncode for SegmentWithRange {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.segment.encode(buf)?;
        match &self.range {
            None => put_bool(buf, false),
            Some(range) => {
                put_bool(buf, true);
                buf.put_f64(range.low);
                buf.put_f64(range.high);
            }
        }
        Ok(())
    }
}

impl WireDecode for SegmentWithRange {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let segment = Segment::decode(buf)?;
        let range = if get_bool(buf)? {
            need(buf, 16)?;
            Some(KeyRange::new(buf.get_f64(), buf.get_f64()))
        } else {
            None
        };
        Ok(SegmentWithRange { segment, range })
    }
}

impl WireEncode for StreamCut {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            StreamCut::Unbounded => {
                buf.put_u8(0);
                Ok(())
            }
            StreamCut::Fixed { stream, positions } => {
                buf.put_u8(1);
                stream.encode(buf)?;
                put_map(buf, positions, |b, k| k.encode(b), put_offset)
            }
        }
    }
}

impl WireDecode for StreamCut {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(StreamCut::Unbounded),
            1 => {
                let stream = Stream::decode(buf)?;
                let positions = get_map(buf, Segment::decode, get_offset)?;
                Ok(StreamCut::Fixed { stream, positions })
            }
            tag => Err(RilletError::wire(format!("unknown stream-cut tag {}", tag))),
        }
    }
}

// ---------------------------------------------------------------------------
// config and lifecycle

impl WireEncode for RetentionType {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(match self {
            RetentionType::None => 0,
            RetentionType::ManualReleaseAtUserStreamcut => 1,
            RetentionType::AutomaticReleaseAtLastCheckpoint => 2,
        });
        Ok(())
    }
}

impl WireDecode for RetentionType {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(RetentionType::None),
            1 => Ok(RetentionType::ManualReleaseAtUserStreamcut),
            2 => Ok(RetentionType::AutomaticReleaseAtLastCheckpoint),
            tag => Err(RilletError::wire(format!("unknown retention tag {}", tag))),
        }
    }
}

impl WireEncode for ReaderGroupConfig {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_map(
            buf,
            self.starting_stream_cuts(),
            |b, k| k.encode(b),
            |b, v| v.encode(b),
        )?;
        put_map(
            buf,
            self.ending_stream_cuts(),
            |b, k| k.encode(b),
            |b, v| v.encode(b),
        )?;
        self.retention().encode(buf)?;
        buf.put_u32(self.max_outstanding_checkpoint_request());
        put_bool(buf, self.automatic_checkpoints_disabled());
        buf.put_u64(self.group_refresh_millis());
        Ok(())
    }
}

impl WireDecode for ReaderGroupConfig {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let starting = get_map(buf, Stream::decode, StreamCut::decode)?;
        let ending = get_map(buf, Stream::decode, StreamCut::decode)?;
        let retention = RetentionType::decode(buf)?;
        need(buf, 4)?;
        let max_outstanding = buf.get_u32();
        let disabled = get_bool(buf)?;
        need(buf, 8)?;
        let refresh = buf.get_u64();
        Ok(ReaderGroupConfig::from_parts(
            starting,
            ending,
            retention,
            max_outstanding,
            disabled,
            refresh,
        ))
    }
}

impl WireEncode for ConfigState {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(match self {
            ConfigState::Initializing => 0,
            ConfigState::Ready => 1,
            ConfigState::Reinitializing => 2,
            ConfigState::Deleting => 3,
        });
        Ok(())
    }
}

impl WireDecode for ConfigState {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(ConfigState::Initializing),
            1 => Ok(ConfigState::Ready),
            2 => Ok(ConfigState::Reinitializing),
            3 => Ok(ConfigState::Deleting),
            tag => Err(RilletError::wire(format!("unknown config-state tag {}", tag))),
        }
    }
}

impl WireEncode for Lifecycle {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.label().encode(buf)?;
        self.config().encode(buf)?;
        if let Lifecycle::Reinitializing { pending, .. } = self {
            pending.encode(buf)?;
        }
        Ok(())
    }
}

impl WireDecode for Lifecycle {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let label = ConfigState::decode(buf)?;
        let config = ReaderGroupConfig::decode(buf)?;
        Ok(match label {
            ConfigState::Initializing => Lifecycle::Initializing { config },
            ConfigState::Ready => Lifecycle::Ready { config },
            ConfigState::Deleting => Lifecycle::Deleting { config },
            ConfigState::Reinitializing => Lifecycle::Reinitializing {
                current: config,
                pending: ReaderGroupConfig::decode(buf)?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// checkpoint state and full snapshots

fn put_reader_set(buf: &mut BytesMut, readers: &HashSet<String>) -> Result<()> {
    put_count(buf, readers.len())?;
    for reader in readers {
        put_str(buf, reader)?;
    }
    Ok(())
}

fn get_reader_set(buf: &mut Bytes) -> Result<HashSet<String>> {
    let len = get_count(buf)?;
    let mut set = HashSet::with_capacity(len.min(1024));
    for _ in 0..len {
        set.insert(get_str(buf)?);
    }
    Ok(set)
}

fn put_segment_offsets(buf: &mut BytesMut, positions: &HashMap<Segment, i64>) -> Result<()> {
    put_map(buf, positions, |b, k| k.encode(b), put_offset)
}

fn get_segment_offsets(buf: &mut Bytes) -> Result<HashMap<Segment, i64>> {
    get_map(buf, Segment::decode, get_offset)
}

impl WireEncode for CheckpointState {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_count(buf, self.outstanding().len())?;
        for id in self.outstanding() {
            put_str(buf, id)?;
        }
        put_map(buf, self.pending_map(), |b, k| put_str(b, k), put_reader_set)?;
        put_map(
            buf,
            self.reported_map(),
            |b, k| put_str(b, k),
            |b, by_reader| put_map(b, by_reader, |b, k| put_str(b, k), put_segment_offsets),
        )?;
        match self.last_completed() {
            None => put_bool(buf, false),
            Some(completed) => {
                put_bool(buf, true);
                put_str(buf, &completed.id)?;
                put_map(
                    buf,
                    &completed.positions,
                    |b, k| k.encode(b),
                    put_segment_offsets,
                )?;
            }
        }
        Ok(())
    }
}

impl WireDecode for CheckpointState {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let len = get_count(buf)?;
        let mut outstanding = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            outstanding.push(get_str(buf)?);
        }
        let pending = get_map(buf, get_str, get_reader_set)?;
        let reported = get_map(buf, get_str, |b| {
            get_map(b, get_str, get_segment_offsets)
        })?;
        let last_completed = if get_bool(buf)? {
            Some(CompletedCheckpoint {
                id: get_str(buf)?,
                positions: get_map(buf, Stream::decode, get_segment_offsets)?,
            })
        } else {
            None
        };
        Ok(CheckpointState::from_parts(
            outstanding,
            pending,
            reported,
            last_completed,
        ))
    }
}

fn put_assignment(buf: &mut BytesMut, owned: &HashMap<SegmentWithRange, i64>) -> Result<()> {
    put_map(buf, owned, |b, k| k.encode(b), put_offset)
}

fn get_assignment(buf: &mut Bytes) -> Result<HashMap<SegmentWithRange, i64>> {
    get_map(buf, SegmentWithRange::decode, get_offset)
}

impl WireEncode for ReaderGroupState {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.lifecycle.encode(buf)?;
        buf.put_u64(self.generation);
        put_map(buf, &self.assigned_segments, |b, k| put_str(b, k), put_assignment)?;
        put_assignment(buf, &self.unassigned_segments)?;
        put_map(
            buf,
            &self.future_segments,
            |b, k| k.encode(b),
            |b, predecessors| {
                put_count(b, predecessors.len())?;
                for id in predecessors {
                    b.put_u64(*id);
                }
                Ok(())
            },
        )?;
        put_segment_offsets(buf, &self.end_segments)?;
        self.checkpoints.encode(buf)?;
        put_map(buf, &self.distance_to_tail, |b, k| put_str(b, k), put_offset)?;
        Ok(())
    }
}

impl WireDecode for ReaderGroupState {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let lifecycle = Lifecycle::decode(buf)?;
        need(buf, 8)?;
        let generation = buf.get_u64();
        let assigned_segments = get_map(buf, get_str, get_assignment)?;
        let unassigned_segments = get_assignment(buf)?;
        let future_segments = get_map(buf, SegmentWithRange::decode, |b| {
            let len = get_count(b)?;
            let mut ids = HashSet::with_capacity(len.min(1024));
            for _ in 0..len {
                need(b, 8)?;
                ids.insert(b.get_u64());
            }
            Ok(ids)
        })?;
        let end_segments = get_segment_offsets(buf)?;
        let checkpoints = CheckpointState::decode(buf)?;
        let distance_to_tail = get_map(buf, get_str, get_offset)?;
        Ok(ReaderGroupState {
            lifecycle,
            generation,
            assigned_segments,
            unassigned_segments,
            future_segments,
            end_segments,
            checkpoints,
            distance_to_tail,
        })
    }
}

impl WireEncode for ReaderGroupInit {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.config.encode(buf)?;
        put_assignment(buf, &self.segments)?;
        put_segment_offsets(buf, &self.end_segments)
    }
}

impl WireDecode for ReaderGroupInit {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(ReaderGroupInit {
            config: ReaderGroupConfig::decode(buf)?,
            segments: get_assignment(buf)?,
            end_segments: get_segment_offsets(buf)?,
        })
    }
}

// ---------------------------------------------------------------------------
// updates

impl WireEncode for StateUpdate {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            StateUpdate::ChangeConfigState { target, generation } => {
                buf.put_u8(0);
                target.encode(buf)?;
                buf.put_u64(*generation);
            }
            StateUpdate::ResetStart {
                new_config,
                generation,
            } => {
                buf.put_u8(1);
                new_config.encode(buf)?;
                buf.put_u64(*generation);
            }
            StateUpdate::ResetComplete {
                config,
                segments,
                end_segments,
            } => {
                buf.put_u8(2);
                config.encode(buf)?;
                put_assignment(buf, segments)?;
                put_segment_offsets(buf, end_segments)?;
            }
            StateUpdate::AddReader { reader } => {
                buf.put_u8(3);
                put_str(buf, reader)?;
            }
            StateUpdate::RemoveReader { reader, positions } => {
                buf.put_u8(4);
                put_str(buf, reader)?;
                match positions {
                    None => put_bool(buf, false),
                    Some(positions) => {
                        put_bool(buf, true);
                        put_assignment(buf, positions)?;
                    }
                }
            }
            StateUpdate::AcquireSegment { reader, segment } => {
                buf.put_u8(5);
                put_str(buf, reader)?;
                segment.encode(buf)?;
            }
            StateUpdate::ReleaseSegment {
                reader,
                segment,
                offset,
            } => {
                buf.put_u8(6);
                put_str(buf, reader)?;
                segment.encode(buf)?;
                buf.put_i64(*offset);
            }
            StateUpdate::SegmentCompleted {
                reader,
                segment,
                successors,
            } => {
                buf.put_u8(7);
                put_str(buf, reader)?;
                segment.encode(buf)?;
                put_map(
                    buf,
                    successors,
                    |b, k| k.encode(b),
                    |b, predecessors| {
                        put_count(b, predecessors.len())?;
                        for id in predecessors {
                            b.put_u64(*id);
                        }
                        Ok(())
                    },
                )?;
            }
            StateUpdate::CreateCheckpoint { id } => {
                buf.put_u8(8);
                put_str(buf, id)?;
            }
            StateUpdate::CheckpointPositions {
                id,
                reader,
                positions,
            } => {
                buf.put_u8(9);
                put_str(buf, id)?;
                put_str(buf, reader)?;
                put_segment_offsets(buf, positions)?;
            }
            StateUpdate::ClearCheckpointsBefore { id } => {
                buf.put_u8(10);
                put_str(buf, id)?;
            }
            StateUpdate::UpdateDistanceToTail {
                reader,
                distance,
                positions,
            } => {
                buf.put_u8(11);
                put_str(buf, reader)?;
                buf.put_i64(*distance);
                put_assignment(buf, positions)?;
            }
        }
        Ok(())
    }
}

impl WireDecode for StateUpdate {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        let tag = buf.get_u8();
        let update = match tag {
            0 => {
                let target = ConfigState::decode(buf)?;
                need(buf, 8)?;
                StateUpdate::ChangeConfigState {
                    target,
                    generation: buf.get_u64(),
                }
            }
            1 => {
                let new_config = ReaderGroupConfig::decode(buf)?;
                need(buf, 8)?;
                StateUpdate::ResetStart {
                    new_config,
                    generation: buf.get_u64(),
                }
            }
            2 => StateUpdate::ResetComplete {
                config: ReaderGroupConfig::decode(buf)?,
                segments: get_assignment(buf)?,
                end_segments: get_segment_offsets(buf)?,
            },
            3 => StateUpdate::AddReader {
                reader: get_str(buf)?,
            },
            4 => {
                let reader = get_str(buf)?;
                let positions = if get_bool(buf)? {
                    Some(get_assignment(buf)?)
                } else {
                    None
                };
                StateUpdate::RemoveReader { reader, positions }
            }
            5 => StateUpdate::AcquireSegment {
                reader: get_str(buf)?,
                segment: SegmentWithRange::decode(buf)?,
            },
            6 => {
                let reader = get_str(buf)?;
                let segment = SegmentWithRange::decode(buf)?;
                need(buf, 8)?;
                StateUpdate::ReleaseSegment {
                    reader,
                    segment,
                    offset: buf.get_i64(),
                }
            }
            7 => {
                let reader = get_str(buf)?;
                let segment = SegmentWithRange::decode(buf)?;
                let successors = get_map(buf, SegmentWithRange::decode, |b| {
                    let len = get_count(b)?;
                    let mut ids = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        need(b, 8)?;
                        ids.push(b.get_u64());
                    }
                    Ok(ids)
                })?;
                StateUpdate::SegmentCompleted {
                    reader,
                    segment,
                    successors,
                }
            }
            8 => StateUpdate::CreateCheckpoint { id: get_str(buf)? },
            9 => StateUpdate::CheckpointPositions {
                id: get_str(buf)?,
                reader: get_str(buf)?,
                positions: get_segment_offsets(buf)?,
            },
            10 => StateUpdate::ClearCheckpointsBefore { id: get_str(buf)? },
            11 => {
                let reader = get_str(buf)?;
                need(buf, 8)?;
                let distance = buf.get_i64();
                StateUpdate::UpdateDistanceToTail {
                    reader,
                    distance,
                    positions: get_assignment(buf)?,
                }
            }
            tag => return Err(RilletError::wire(format!("unknown update tag {}", tag))),
        };
        Ok(update)
    }
}
