//! Unread-bytes metric
//!
//! How many bytes lie between the group's current position and its ending
//! cuts (or the stream tails, when unbounded), summed across streams. The
//! preferred position source is the last completed checkpoint; without one,
//! the per-segment last read positions are used with reassignment ranges
//! dropped.

use crate::controller::{Controller, SegmentMetadata};
use crate::error::Result;
use crate::group::ReaderGroupState;
use crate::model::{Segment, SegmentWithRange, Stream, StreamCut};
use std::collections::HashMap;
use tracing::{debug, info};

pub(crate) async fn unread_bytes(
    state: &ReaderGroupState,
    controller: &dyn Controller,
    meta: &dyn SegmentMetadata,
) -> Result<i64> {
    let positions = match state.checkpoints().last_completed() {
        Some(completed) => {
            debug!(checkpoint = %completed.id, "computing unread bytes from last checkpoint");
            completed.positions.clone()
        }
        None => {
            info!("no completed checkpoint; computing unread bytes from last read positions");
            state
                .last_read_positions()
                .into_iter()
                .map(|(stream, positions)| (stream, drop_range(positions)))
                .collect()
        }
    };

    let mut total = 0i64;
    for (stream, stream_positions) in positions {
        let to = end_cut_for(&stream, state.end_segments());
        let from = StreamCut::fixed(stream, stream_positions);
        total += remaining_bytes(controller, meta, &from, &to).await?;
    }
    Ok(total)
}

pub(crate) fn drop_range(positions: HashMap<SegmentWithRange, i64>) -> HashMap<Segment, i64> {
    positions
        .into_iter()
        .map(|(segment, offset)| (segment.segment, offset))
        .collect()
}

/// The ending cut for one stream, taken from the group's end segments;
/// a stream with no end segments runs to its tail.
fn end_cut_for(stream: &Stream, end_segments: &HashMap<Segment, i64>) -> StreamCut {
    let positions: HashMap<Segment, i64> = end_segments
        .iter()
        .filter(|(segment, _)| &segment.stream == stream)
        .map(|(segment, offset)| (segment.clone(), *offset))
        .collect();
    if positions.is_empty() {
        StreamCut::Unbounded
    } else {
        StreamCut::fixed(stream.clone(), positions)
    }
}

async fn remaining_bytes(
    controller: &dyn Controller,
    meta: &dyn SegmentMetadata,
    from: &StreamCut,
    to: &StreamCut,
) -> Result<i64> {
    let empty = HashMap::new();
    let (unread, end_positions) = if to.is_unbounded() {
        (controller.get_successors(from).await?, &empty)
    } else {
        (
            controller.get_segments(from, to).await?,
            to.positions().unwrap_or(&empty),
        )
    };

    let mut total = 0i64;
    for segment in unread {
        match end_positions.get(&segment) {
            Some(end_offset) => total += end_offset,
            None => total += meta.current_length(&segment).await?,
        }
    }
    if let Some(from_positions) = from.positions() {
        for bytes_read in from_positions.values() {
            total -= bytes_read;
        }
    }
    debug!(from = ?from, to = ?to, remaining = total, "remaining bytes for stream");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_range_erases_reassignment_ranges() {
        let stream = Stream::of("scope", "a");
        let seg = Segment::new(stream, 0);
        let positions = HashMap::from([(SegmentWithRange::ranged(seg.clone(), 0.0, 0.5), 99i64)]);
        let dropped = drop_range(positions);
        assert_eq!(dropped[&seg], 99);
    }

    #[test]
    fn test_end_cut_for_filters_by_stream() {
        let a = Stream::of("scope", "a");
        let b = Stream::of("scope", "b");
        let ends = HashMap::from([
            (Segment::new(a.clone(), 0), 100i64),
            (Segment::new(b.clone(), 0), 200i64),
        ]);

        let cut = end_cut_for(&a, &ends);
        let positions = cut.positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[&Segment::new(a.clone(), 0)], 100);

        let unbounded = end_cut_for(&Stream::of("scope", "c"), &ends);
        assert!(unbounded.is_unbounded());
    }
}
