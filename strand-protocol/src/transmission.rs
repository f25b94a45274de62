//! Transmission Records
//!
//! One record exists per send attempt: retransmitting data creates a new
//! record for the new packet rather than mutating the old one. Records are
//! created when a packet is sent, mutated in place as their in-flight,
//! frame-ownership, and RTT-eligibility status changes, and destroyed only
//! when trimmed from the front of the ledger.

use crate::frame::Frame;
use crate::number::PacketNumber;
use crate::space::EncryptionLevel;
use std::time::Instant;

/// Why a packet was transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionType {
    /// First transmission of this data
    Original,
    /// Resent after loss detection declared the earlier packet lost
    LossRetransmission,
    /// Resent because the probe timeout fired
    PtoRetransmission,
    /// Sent to probe the path, duplicating data speculatively
    Probing,
}

/// Metadata and frame ownership for one sent packet
///
/// Congestion control, loss detection, and RTT estimation read these fields
/// through the ledger's accessors. The in-flight byte and packet totals are
/// maintained by the ledger's mutation methods; flipping `in_flight` by hand
/// would desynchronize them.
#[derive(Debug, Clone)]
pub struct TransmissionInfo {
    /// When the packet was sent
    pub sent_time: Instant,
    /// Bytes sent, including framing overhead
    pub bytes_sent: u64,
    /// Encryption level the packet was protected at
    pub encryption_level: EncryptionLevel,
    /// Original send or retransmission cause
    pub transmission_type: TransmissionType,
    /// Whether the packet currently counts toward congestion control
    pub in_flight: bool,
    /// Whether the packet is still eligible to produce an RTT sample
    pub needs_rtt_measurement: bool,
    /// Frames that must be resent if this packet is lost; emptied once the
    /// data is resolved or carried by a newer transmission
    pub retransmittable_frames: Vec<Frame>,
    /// Packet number of the next newer transmission of the same data, if
    /// any. Kept as a packet number rather than a reference so chain
    /// members can be trimmed independently without dangling.
    pub retransmission: Option<PacketNumber>,
}

impl TransmissionInfo {
    /// Check whether this record still owns frames that need resending
    #[inline]
    pub fn has_retransmittable_frames(&self) -> bool {
        !self.retransmittable_frames.is_empty()
    }

    /// Check whether this record owns handshake data
    pub fn has_crypto_frames(&self) -> bool {
        self.retransmittable_frames.iter().any(Frame::is_crypto)
    }
}
