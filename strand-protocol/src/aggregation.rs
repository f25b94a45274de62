//! Acked Stream Data Aggregation
//!
//! Processing one acknowledgement can resolve many packets, and consecutive
//! packets usually carry contiguous bytes of the same stream. Notifying the
//! session once per frame would be wasteful, so the ledger buffers one
//! in-progress contiguous range here and reports it with a single call when
//! the run breaks or the acknowledgement pass ends.

use crate::frame::{StreamFrame, StreamId};
use bytes::Bytes;

/// Largest byte range buffered before a flush is forced
pub const MAX_AGGREGATED_DATA_LENGTH: u64 = 16 * 1024;

/// Accumulates one contiguous run of acknowledged stream bytes
///
/// Pure state machine: the ledger decides when to extend, replace, or take
/// the pending range and owns the resulting notifier calls.
#[derive(Debug, Default)]
pub struct StreamAckAggregator {
    pending: Option<PendingRange>,
}

#[derive(Debug, Clone, Copy)]
struct PendingRange {
    stream_id: StreamId,
    offset: u64,
    length: u64,
    fin: bool,
}

impl StreamAckAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether no range is currently buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    /// Check whether `frame` directly continues the buffered range
    ///
    /// A frame extends the aggregate when it is on the same stream, starts
    /// exactly at the running end offset, and keeping it would not push the
    /// aggregate past the length cap.
    pub fn can_extend(&self, frame: &StreamFrame) -> bool {
        match self.pending {
            Some(pending) => {
                pending.stream_id == frame.stream_id
                    && frame.offset == pending.offset + pending.length
                    && pending.length + frame.length <= MAX_AGGREGATED_DATA_LENGTH
            }
            None => false,
        }
    }

    /// Extend the buffered range with a contiguous frame
    pub fn extend(&mut self, frame: &StreamFrame) {
        debug_assert!(self.can_extend(frame));
        if let Some(pending) = &mut self.pending {
            pending.length += frame.length;
            pending.fin = frame.fin;
        }
    }

    /// Start a new buffered range from `frame`
    ///
    /// Any previously buffered range must have been taken first.
    pub fn begin(&mut self, frame: &StreamFrame) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(PendingRange {
            stream_id: frame.stream_id,
            offset: frame.offset,
            length: frame.length,
            fin: frame.fin,
        });
    }

    /// Take the buffered range as a range-only stream frame, leaving the
    /// aggregator empty
    pub fn take(&mut self) -> Option<StreamFrame> {
        self.pending.take().map(|pending| StreamFrame {
            stream_id: pending.stream_id,
            offset: pending.offset,
            length: pending.length,
            fin: pending.fin,
            data: Bytes::new(),
        })
    }
}
