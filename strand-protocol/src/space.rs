//! Encryption Levels and Packet Number Spaces
//!
//! During connection establishment, packets are protected at a sequence of
//! encryption levels, and each handshake phase acknowledges its packets
//! independently of the others. A packet number space groups the levels
//! that share one acknowledgement sequence: initial and handshake packets
//! each get their own space, while 0-RTT and 1-RTT packets share the
//! application-data space.

use crate::number::PacketNumber;
use std::time::Instant;

/// Number of independent packet number spaces
pub const PACKET_NUMBER_SPACE_COUNT: usize = 3;

/// Encryption level a packet was protected at when it was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionLevel {
    /// Initial keys, derived from a public salt; effectively plaintext
    Initial,
    /// Early application data sent before the handshake completes
    ZeroRtt,
    /// Handshake keys
    Handshake,
    /// Fully established 1-RTT keys
    OneRtt,
}

/// Independently acknowledged packet number sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketNumberSpace {
    /// Packets protected with initial keys
    Initial,
    /// Packets protected with handshake keys
    Handshake,
    /// 0-RTT and 1-RTT application packets
    ApplicationData,
}

impl PacketNumberSpace {
    /// Get the packet number space a given encryption level belongs to
    ///
    /// 0-RTT and 1-RTT packets share the application-data space even though
    /// they use different keys.
    pub fn from_encryption_level(level: EncryptionLevel) -> Self {
        match level {
            EncryptionLevel::Initial => PacketNumberSpace::Initial,
            EncryptionLevel::Handshake => PacketNumberSpace::Handshake,
            EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => {
                PacketNumberSpace::ApplicationData
            }
        }
    }

    /// Index of this space into per-space aggregate arrays
    #[inline]
    pub fn index(self) -> usize {
        match self {
            PacketNumberSpace::Initial => 0,
            PacketNumberSpace::Handshake => 1,
            PacketNumberSpace::ApplicationData => 2,
        }
    }
}

/// Per-space send and acknowledgement aggregates
///
/// Tracks, for each packet number space, the watermarks and in-flight
/// totals that congestion control and loss detection consume. Only
/// meaningful while multiplexed spaces are enabled; with a single
/// consolidated space the ledger's global aggregates are authoritative.
#[derive(Debug, Clone, Default)]
pub struct SpaceAggregates {
    /// Largest packet number sent per space
    largest_sent: [Option<PacketNumber>; PACKET_NUMBER_SPACE_COUNT],
    /// Largest packet number sent carrying retransmittable data, per space
    largest_sent_retransmittable: [Option<PacketNumber>; PACKET_NUMBER_SPACE_COUNT],
    /// Largest packet number acknowledged per space
    largest_acked: [Option<PacketNumber>; PACKET_NUMBER_SPACE_COUNT],
    /// Send time of the most recent in-flight packet per space
    last_in_flight_sent_time: [Option<Instant>; PACKET_NUMBER_SPACE_COUNT],
    /// Bytes currently in flight per space
    bytes_in_flight: [u64; PACKET_NUMBER_SPACE_COUNT],
    /// Packets currently in flight per space
    packets_in_flight: [u64; PACKET_NUMBER_SPACE_COUNT],
}

impl SpaceAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sent packet in its space's watermarks
    pub fn record_sent(
        &mut self,
        space: PacketNumberSpace,
        number: PacketNumber,
        retransmittable: bool,
    ) {
        let i = space.index();
        self.largest_sent[i] = Some(number);
        if retransmittable {
            self.largest_sent_retransmittable[i] = Some(number);
        }
    }

    /// Record a packet entering the in-flight totals of its space
    pub fn record_in_flight(&mut self, space: PacketNumberSpace, bytes: u64, sent_time: Instant) {
        let i = space.index();
        self.bytes_in_flight[i] += bytes;
        self.packets_in_flight[i] += 1;
        self.last_in_flight_sent_time[i] = Some(sent_time);
    }

    /// Remove a packet from the in-flight totals of its space
    pub fn remove_from_in_flight(&mut self, space: PacketNumberSpace, bytes: u64) {
        let i = space.index();
        debug_assert!(self.bytes_in_flight[i] >= bytes);
        debug_assert!(self.packets_in_flight[i] >= 1);
        self.bytes_in_flight[i] -= bytes;
        self.packets_in_flight[i] -= 1;
    }

    /// Advance a space's largest acknowledged packet number
    ///
    /// Only advances; a smaller or equal value is a no-op, never a
    /// regression.
    pub fn maybe_update_largest_acked(&mut self, space: PacketNumberSpace, number: PacketNumber) {
        let i = space.index();
        match self.largest_acked[i] {
            Some(current) if current >= number => {}
            _ => self.largest_acked[i] = Some(number),
        }
    }

    pub fn largest_sent(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.largest_sent[space.index()]
    }

    pub fn largest_sent_retransmittable(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.largest_sent_retransmittable[space.index()]
    }

    pub fn largest_acked(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.largest_acked[space.index()]
    }

    pub fn last_in_flight_sent_time(&self, space: PacketNumberSpace) -> Option<Instant> {
        self.last_in_flight_sent_time[space.index()]
    }

    pub fn bytes_in_flight(&self, space: PacketNumberSpace) -> u64 {
        self.bytes_in_flight[space.index()]
    }

    pub fn packets_in_flight(&self, space: PacketNumberSpace) -> u64 {
        self.packets_in_flight[space.index()]
    }
}
