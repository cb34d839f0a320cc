//! Core data model for reader groups
//!
//! Streams, segments, stream-cuts and reader positions. These are identity
//! types: a [`Stream`] is `(scope, name)`, a [`Segment`] is a unit of
//! parallelism within a stream, and a [`StreamCut`] is a consistent
//! cross-segment position expressed as a per-segment offset map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A stream identity: `(scope, name)`. Opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stream {
    pub scope: String,
    pub name: String,
}

impl Stream {
    /// Create a stream identity from scope and name
    pub fn of(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// The fully scoped name, `scope/name`
    pub fn scoped_name(&self) -> String {
        format!("{}/{}", self.scope, self.name)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// A segment identity: a stream plus a segment id unique within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Segment {
    pub stream: Stream,
    pub id: u64,
}

impl Segment {
    /// Create a segment identity
    pub fn new(stream: Stream, id: u64) -> Self {
        Self { stream, id }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream, self.id)
    }
}

/// A routing-key range `[low, high] ⊂ [0, 1]`.
///
/// Present on a segment only while split/merged segments are being
/// reassigned. Equality and hashing use the exact bit patterns so the type
/// can participate in map keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeyRange {
    pub low: f64,
    pub high: f64,
}

impl KeyRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

impl PartialEq for KeyRange {
    fn eq(&self, other: &Self) -> bool {
        self.low.to_bits() == other.low.to_bits() && self.high.to_bits() == other.high.to_bits()
    }
}

impl Eq for KeyRange {}

impl Hash for KeyRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.low.to_bits().hash(state);
        self.high.to_bits().hash(state);
    }
}

/// A segment plus its optional key range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentWithRange {
    pub segment: Segment,
    pub range: Option<KeyRange>,
}

impl SegmentWithRange {
    /// A segment with no range attached
    pub fn unranged(segment: Segment) -> Self {
        Self {
            segment,
            range: None,
        }
    }

    /// A segment carrying its key range
    pub fn ranged(segment: Segment, low: f64, high: f64) -> Self {
        Self {
            segment,
            range: Some(KeyRange::new(low, high)),
        }
    }
}

impl fmt::Display for SegmentWithRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.segment.fmt(f)
    }
}

/// Sentinel offset on an ending cut meaning "read until the end of the
/// segment"; promoted to `i64::MAX` when end segments are computed.
pub const END_OF_SEGMENT: i64 = -1;

/// A consistent cross-segment position on one stream.
///
/// `Unbounded` means "the latest position" (tail for ending cuts, head for
/// starting cuts) resolved at the time the cut is used, not a fixed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCut {
    Unbounded,
    Fixed {
        stream: Stream,
        positions: HashMap<Segment, i64>,
    },
}

impl StreamCut {
    /// A fixed cut from per-segment offsets
    pub fn fixed(stream: Stream, positions: HashMap<Segment, i64>) -> Self {
        StreamCut::Fixed { stream, positions }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, StreamCut::Unbounded)
    }

    /// The stream this cut lies on, if fixed
    pub fn stream(&self) -> Option<&Stream> {
        match self {
            StreamCut::Unbounded => None,
            StreamCut::Fixed { stream, .. } => Some(stream),
        }
    }

    /// The per-segment offsets, if fixed
    pub fn positions(&self) -> Option<&HashMap<Segment, i64>> {
        match self {
            StreamCut::Unbounded => None,
            StreamCut::Fixed { positions, .. } => Some(positions),
        }
    }
}

/// A reader's owned `{segment → offset}` snapshot at a moment in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Position {
    owned: HashMap<SegmentWithRange, i64>,
}

impl Position {
    pub fn new(owned: HashMap<SegmentWithRange, i64>) -> Self {
        Self { owned }
    }

    pub fn owned_segments(&self) -> &HashMap<SegmentWithRange, i64> {
        &self.owned
    }

    pub fn into_owned(self) -> HashMap<SegmentWithRange, i64> {
        self.owned
    }
}

/// How segments are spread over the online readers of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderSegmentDistribution {
    /// Per-reader count of assigned segments
    pub reader_segment_distribution: HashMap<String, usize>,
    /// Segments currently owned by no reader
    pub unassigned_segments: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_name() {
        let stream = Stream::of("sales", "orders");
        assert_eq!(stream.scoped_name(), "sales/orders");
        assert_eq!(stream.to_string(), "sales/orders");
    }

    #[test]
    fn test_segment_display() {
        let seg = Segment::new(Stream::of("sales", "orders"), 3);
        assert_eq!(seg.to_string(), "sales/orders#3");
    }

    #[test]
    fn test_key_range_bitwise_equality() {
        let a = KeyRange::new(0.0, 0.5);
        let b = KeyRange::new(0.0, 0.5);
        assert_eq!(a, b);

        // -0.0 and 0.0 compare equal as floats but are distinct bit patterns
        let c = KeyRange::new(-0.0, 0.5);
        assert_ne!(a, c);
    }

    #[test]
    fn test_segment_with_range_keys_maps_by_identity() {
        let seg = Segment::new(Stream::of("s", "a"), 0);
        let ranged = SegmentWithRange::ranged(seg.clone(), 0.0, 1.0);
        let unranged = SegmentWithRange::unranged(seg);

        let mut map = HashMap::new();
        map.insert(ranged.clone(), 10i64);
        // Same segment, different range: a distinct key
        assert!(!map.contains_key(&unranged));
        assert_eq!(map.get(&ranged), Some(&10));
    }

    #[test]
    fn test_stream_cut_accessors() {
        let stream = Stream::of("s", "a");
        let seg = Segment::new(stream.clone(), 0);
        let cut = StreamCut::fixed(stream.clone(), HashMap::from([(seg.clone(), 42)]));

        assert!(!cut.is_unbounded());
        assert_eq!(cut.stream(), Some(&stream));
        assert_eq!(cut.positions().and_then(|p| p.get(&seg)), Some(&42));

        assert!(StreamCut::Unbounded.is_unbounded());
        assert!(StreamCut::Unbounded.positions().is_none());
    }

    #[test]
    fn test_distribution_serialization() {
        let dist = ReaderSegmentDistribution {
            reader_segment_distribution: HashMap::from([("r1".to_string(), 2)]),
            unassigned_segments: 1,
        };
        let json = serde_json::to_string(&dist).unwrap();
        let back: ReaderSegmentDistribution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dist);
    }
}
