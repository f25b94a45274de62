//! Retransmittable Frame Types
//!
//! Frames are the protocol-level data units carried inside packets. A frame
//! that must be resent if its containing packet is lost is retransmittable;
//! the sent-packet ledger owns such frames from the moment the packet is
//! recorded until they are acknowledged, declared lost and re-queued, or
//! administratively discarded.

use bytes::Bytes;
use std::fmt;

/// Stream identifier
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StreamId(u64);

impl StreamId {
    pub fn new(value: u64) -> Self {
        StreamId(value)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application data carried on a stream
///
/// `length` is authoritative: acknowledgement notifications only describe a
/// byte range, so frames produced by ack aggregation carry an empty `data`
/// buffer while still covering a non-empty range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Stream the data belongs to
    pub stream_id: StreamId,
    /// Byte offset of the first byte within the stream
    pub offset: u64,
    /// Number of stream bytes covered by this frame
    pub length: u64,
    /// Whether this frame ends the stream
    pub fin: bool,
    /// Payload bytes (empty for range-only notification frames)
    pub data: Bytes,
}

impl StreamFrame {
    /// Create a stream frame carrying payload data
    pub fn new(stream_id: StreamId, offset: u64, data: Bytes, fin: bool) -> Self {
        StreamFrame {
            stream_id,
            offset,
            length: data.len() as u64,
            fin,
            data,
        }
    }

    /// Offset one past the last byte covered by this frame
    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.offset + self.length
    }
}

/// Handshake data exchanged before application streams are available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoFrame {
    /// Byte offset within the handshake data stream
    pub offset: u64,
    /// Handshake payload bytes
    pub data: Bytes,
}

impl CryptoFrame {
    pub fn new(offset: u64, data: Bytes) -> Self {
        CryptoFrame { offset, data }
    }
}

/// A retransmittable protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Application data on a stream
    Stream(StreamFrame),
    /// Handshake data
    Crypto(CryptoFrame),
    /// Liveness probe
    Ping,
    /// Signals handshake completion to the peer
    HandshakeDone,
    /// Connection-level flow control update
    MaxData(u64),
}

impl Frame {
    /// Check whether this is a stream data frame
    #[inline]
    pub fn is_stream(&self) -> bool {
        matches!(self, Frame::Stream(_))
    }

    /// Check whether this is a handshake data frame
    #[inline]
    pub fn is_crypto(&self) -> bool {
        matches!(self, Frame::Crypto(_))
    }

    /// Get the contained stream frame, if any
    pub fn as_stream(&self) -> Option<&StreamFrame> {
        match self {
            Frame::Stream(frame) => Some(frame),
            _ => None,
        }
    }
}
