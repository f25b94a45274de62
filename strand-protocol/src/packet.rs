//! Sent Packet Handoff
//!
//! The packetizer hands the ledger a fully formed description of each packet
//! it has put on the wire. The value is consumed by the ledger: passing it
//! by value moves frame ownership into the new transmission record, which is
//! the explicit transfer the bookkeeping relies on.

use crate::frame::Frame;
use crate::number::PacketNumber;
use crate::space::EncryptionLevel;

/// A packet as handed off by the packet-construction layer
///
/// The packet number must be the immediate successor of the last packet the
/// ledger accepted. `original_packet_number` is set when this packet
/// re-sends data from an earlier packet, linking the two transmissions.
#[derive(Debug, Clone)]
pub struct SentPacket {
    /// Packet number assigned on the wire
    pub packet_number: PacketNumber,
    /// Bytes sent, including framing overhead
    pub bytes_sent: u64,
    /// Encryption level the packet was protected at
    pub encryption_level: EncryptionLevel,
    /// Frames to resend if the packet is lost (possibly empty)
    pub retransmittable_frames: Vec<Frame>,
    /// Earlier packet whose data this packet re-sends, if any
    pub original_packet_number: Option<PacketNumber>,
}

impl SentPacket {
    /// Create a first-transmission packet
    pub fn new(
        packet_number: PacketNumber,
        bytes_sent: u64,
        encryption_level: EncryptionLevel,
        retransmittable_frames: Vec<Frame>,
    ) -> Self {
        SentPacket {
            packet_number,
            bytes_sent,
            encryption_level,
            retransmittable_frames,
            original_packet_number: None,
        }
    }

    /// Create a packet that re-sends an earlier packet's data
    pub fn retransmission_of(
        original: PacketNumber,
        packet_number: PacketNumber,
        bytes_sent: u64,
        encryption_level: EncryptionLevel,
        retransmittable_frames: Vec<Frame>,
    ) -> Self {
        SentPacket {
            packet_number,
            bytes_sent,
            encryption_level,
            retransmittable_frames,
            original_packet_number: Some(original),
        }
    }
}
