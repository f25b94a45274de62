//! Sent-Packet Ledger
//!
//! The authoritative record of every packet sent but not yet fully resolved.
//! The ledger answers three questions continuously as the connection runs:
//! which data must be retransmitted if lost, how many bytes and packets are
//! in flight for congestion control, and when each in-flight packet was sent
//! for RTT estimation and loss timeouts.
//!
//! Records live in one contiguous deque addressed by offset from the least
//! unacked packet number. New records are appended at the tail as packets
//! are sent; resolved records are trimmed from the front, never the middle,
//! which keeps addressing O(1) and bounds memory to the useful working set.

use crate::aggregation::StreamAckAggregator;
use crate::frame::Frame;
use crate::notifier::SessionNotifier;
use crate::number::PacketNumber;
use crate::packet::SentPacket;
use crate::space::{EncryptionLevel, PacketNumberSpace, SpaceAggregates};
use crate::transmission::{TransmissionInfo, TransmissionType};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Which side of the connection this ledger belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Client,
    Server,
}

/// Construction-time ledger configuration, fixed for the ledger's lifetime
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Side of the connection
    pub perspective: Perspective,
    /// Track per-space aggregates for the multiplexed handshake-phase
    /// packet number sequences
    pub multiple_packet_number_spaces: bool,
    /// Initial record capacity to reserve
    pub initial_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            perspective: Perspective::Client,
            multiple_packet_number_spaces: false,
            initial_capacity: 64,
        }
    }
}

/// Ledger of sent, not-yet-resolved packets
///
/// Exactly one connection-processing context owns and drives the ledger;
/// every operation runs to completion synchronously. Acknowledgements must
/// be processed in increasing packet number order within one ack event.
#[derive(Debug)]
pub struct PacketLedger<N: SessionNotifier> {
    config: LedgerConfig,
    /// Tracked records; index 0 corresponds to `least_unacked`
    packets: VecDeque<TransmissionInfo>,
    /// Smallest packet number still tracked; only ever increases
    least_unacked: PacketNumber,
    largest_sent_packet: Option<PacketNumber>,
    largest_acked: Option<PacketNumber>,
    bytes_in_flight: u64,
    packets_in_flight: u64,
    last_in_flight_packet_sent_time: Option<Instant>,
    last_crypto_packet_sent_time: Option<Instant>,
    /// Tracked packets still owning handshake data frames
    pending_crypto_packet_count: usize,
    spaces: SpaceAggregates,
    aggregator: StreamAckAggregator,
    notifier: N,
}

impl<N: SessionNotifier> PacketLedger<N> {
    pub fn new(config: LedgerConfig, notifier: N) -> Self {
        debug!(
            perspective = ?config.perspective,
            multiple_packet_number_spaces = config.multiple_packet_number_spaces,
            "creating sent-packet ledger"
        );
        PacketLedger {
            config,
            packets: VecDeque::with_capacity(config.initial_capacity),
            least_unacked: PacketNumber::new(1),
            largest_sent_packet: None,
            largest_acked: None,
            bytes_in_flight: 0,
            packets_in_flight: 0,
            last_in_flight_packet_sent_time: None,
            last_crypto_packet_sent_time: None,
            pending_crypto_packet_count: 0,
            spaces: SpaceAggregates::new(),
            aggregator: StreamAckAggregator::new(),
            notifier,
        }
    }

    /// Record a packet handed off by the packetizer
    ///
    /// Moves ownership of the packet's frames into a new record at the tail.
    /// If the packet re-sends an earlier packet's data, the older record is
    /// linked to this one and its frame ownership transfers forward.
    ///
    /// # Panics
    /// Panics if the packet number is not the immediate successor of the
    /// last accepted packet.
    pub fn add_sent_packet(
        &mut self,
        packet: SentPacket,
        transmission_type: TransmissionType,
        sent_time: Instant,
        set_in_flight: bool,
        measure_rtt: bool,
    ) {
        let SentPacket {
            packet_number,
            bytes_sent,
            encryption_level,
            mut retransmittable_frames,
            original_packet_number,
        } = packet;

        match self.largest_sent_packet {
            Some(largest) => assert_eq!(
                packet_number,
                largest.next(),
                "packet numbers must be contiguous: expected {}, got {}",
                largest.next(),
                packet_number
            ),
            None => assert_eq!(
                packet_number, self.least_unacked,
                "first tracked packet must be {}, got {}",
                self.least_unacked, packet_number
            ),
        }

        if let Some(original) = original_packet_number {
            if self.is_unacked(original) {
                let inherited = self.take_frames(original);
                let idx = self.index_of(original);
                self.packets[idx].retransmission = Some(packet_number);
                // Fall back to the original's frames when the packetizer
                // did not re-supply them.
                if retransmittable_frames.is_empty() {
                    retransmittable_frames = inherited;
                }
            }
        }

        let space = PacketNumberSpace::from_encryption_level(encryption_level);
        let retransmittable = !retransmittable_frames.is_empty();
        let has_crypto = retransmittable_frames.iter().any(Frame::is_crypto);

        trace!(
            packet_number = packet_number.as_u64(),
            bytes = bytes_sent,
            level = ?encryption_level,
            in_flight = set_in_flight,
            "tracking sent packet"
        );

        self.packets.push_back(TransmissionInfo {
            sent_time,
            bytes_sent,
            encryption_level,
            transmission_type,
            in_flight: set_in_flight,
            needs_rtt_measurement: measure_rtt,
            retransmittable_frames,
            retransmission: None,
        });
        self.largest_sent_packet = Some(packet_number);

        if self.config.multiple_packet_number_spaces {
            self.spaces.record_sent(space, packet_number, retransmittable);
        }
        if has_crypto {
            self.pending_crypto_packet_count += 1;
            if space != PacketNumberSpace::ApplicationData {
                self.last_crypto_packet_sent_time = Some(sent_time);
            }
        }
        if set_in_flight {
            self.bytes_in_flight += bytes_sent;
            self.packets_in_flight += 1;
            self.last_in_flight_packet_sent_time = Some(sent_time);
            if self.config.multiple_packet_number_spaces {
                self.spaces.record_in_flight(space, bytes_sent, sent_time);
            }
        }
    }

    /// Trim records with no remaining purpose from the front
    ///
    /// Removal is prefix-only: it stops at the first record that is still
    /// needed for retransmission, congestion accounting, or an RTT sample.
    /// Called after every acknowledgement-processing pass.
    pub fn remove_obsolete_packets(&mut self) {
        let mut removed = 0u64;
        while let Some(front) = self.packets.front() {
            if !self.is_packet_useless(self.least_unacked, front) {
                break;
            }
            self.packets.pop_front();
            self.least_unacked = self.least_unacked.next();
            removed += 1;
        }
        if removed > 0 {
            trace!(
                removed,
                least_unacked = self.least_unacked.as_u64(),
                "trimmed obsolete packets"
            );
        }
    }

    /// Look up a tracked packet's record
    ///
    /// # Panics
    /// Panics if `packet_number` is outside the tracked range; callers are
    /// required to know which numbers are still live.
    pub fn transmission_info(&self, packet_number: PacketNumber) -> &TransmissionInfo {
        let idx = self.index_of(packet_number);
        &self.packets[idx]
    }

    /// Mutable variant of [`Self::transmission_info`]
    ///
    /// # Panics
    /// Panics if `packet_number` is outside the tracked range.
    pub fn transmission_info_mut(&mut self, packet_number: PacketNumber) -> &mut TransmissionInfo {
        let idx = self.index_of(packet_number);
        &mut self.packets[idx]
    }

    /// Checked lookup of a tracked packet's record
    pub fn get(&self, packet_number: PacketNumber) -> Option<&TransmissionInfo> {
        let largest = self.largest_sent_packet?;
        if packet_number < self.least_unacked || packet_number > largest {
            return None;
        }
        self.packets.get((packet_number - self.least_unacked) as usize)
    }

    /// Check whether a packet is still tracked
    pub fn is_unacked(&self, packet_number: PacketNumber) -> bool {
        self.get(packet_number).is_some()
    }

    /// Resolve the retransmission chain containing `packet_number`
    ///
    /// Walks from the given member to the most recent transmission of the
    /// same data, clearing frame ownership and severing each link on the
    /// way, so that acknowledging any chain member resolves the whole chain.
    pub fn remove_retransmittability(&mut self, packet_number: PacketNumber) {
        let mut current = packet_number;
        loop {
            if !self.is_unacked(current) {
                break;
            }
            self.take_frames(current);
            let idx = self.index_of(current);
            match self.packets[idx].retransmission.take() {
                Some(newer) => current = newer,
                None => break,
            }
        }
    }

    /// Ask the session to re-queue a packet's frames for sending
    ///
    /// Does not create the new transmission record; that happens when the
    /// packetizer hands back the newly built packet via
    /// [`Self::add_sent_packet`].
    pub fn retransmit_frames(
        &mut self,
        packet_number: PacketNumber,
        transmission_type: TransmissionType,
    ) {
        let idx = self.index_of(packet_number);
        debug!(
            packet_number = packet_number.as_u64(),
            kind = ?transmission_type,
            "re-queueing frames for retransmission"
        );
        self.notifier
            .retransmit_frames(&self.packets[idx].retransmittable_frames, transmission_type);
    }

    /// Report a packet's frames as acknowledged
    ///
    /// Stream frames contiguous with the pending aggregate extend it;
    /// non-contiguous stream frames force a flush first, and control frames
    /// are reported immediately. Returns true iff any frame newly became
    /// acknowledged; frames already resolved through the retransmission
    /// chain produce no calls.
    pub fn notify_frames_acked(
        &mut self,
        packet_number: PacketNumber,
        ack_delay: Duration,
        receive_time: Instant,
    ) -> bool {
        self.process_acked_frames(packet_number, ack_delay, receive_time)
    }

    /// Aggregate a packet's acked stream frames, reporting everything else
    ///
    /// Same frame handling as [`Self::notify_frames_acked`] without the
    /// newly-acked result.
    pub fn maybe_aggregate_acked_stream_frame(
        &mut self,
        packet_number: PacketNumber,
        ack_delay: Duration,
        receive_time: Instant,
    ) {
        self.process_acked_frames(packet_number, ack_delay, receive_time);
    }

    /// Flush the pending aggregated stream range, if any
    ///
    /// Called at the end of an acknowledgement-processing pass.
    pub fn notify_aggregated_stream_frame_acked(&mut self, ack_delay: Duration) {
        Self::flush_aggregated_frame(&mut self.aggregator, &mut self.notifier, ack_delay);
    }

    /// Report a packet's unresolved frames as lost
    ///
    /// Does not remove the record from the ledger.
    pub fn notify_frames_lost(
        &mut self,
        packet_number: PacketNumber,
        transmission_type: TransmissionType,
    ) {
        let idx = self.index_of(packet_number);
        let info = &self.packets[idx];
        if info.has_retransmittable_frames() {
            debug!(
                packet_number = packet_number.as_u64(),
                kind = ?transmission_type,
                frames = info.retransmittable_frames.len(),
                "reporting frames lost"
            );
        }
        for frame in &self.packets[idx].retransmittable_frames {
            self.notifier.on_frame_lost(frame);
        }
    }

    /// Stop counting a packet toward congestion control
    ///
    /// # Panics
    /// Panics if the packet is not currently in flight.
    pub fn remove_from_in_flight(&mut self, packet_number: PacketNumber) {
        let idx = self.index_of(packet_number);
        assert!(
            self.packets[idx].in_flight,
            "packet {} is not in flight",
            packet_number
        );
        let bytes = self.packets[idx].bytes_sent;
        let level = self.packets[idx].encryption_level;
        self.packets[idx].in_flight = false;

        debug_assert!(self.bytes_in_flight >= bytes);
        debug_assert!(self.packets_in_flight >= 1);
        self.bytes_in_flight -= bytes;
        self.packets_in_flight -= 1;
        if self.config.multiple_packet_number_spaces {
            self.spaces
                .remove_from_in_flight(PacketNumberSpace::from_encryption_level(level), bytes);
        }
    }

    /// Advance the largest acknowledged packet number
    ///
    /// A smaller or equal value is a no-op, never a regression.
    pub fn increase_largest_acked(&mut self, largest_acked: PacketNumber) {
        match self.largest_acked {
            Some(current) if current >= largest_acked => {}
            _ => self.largest_acked = Some(largest_acked),
        }
    }

    /// Advance one space's largest acknowledged packet number
    ///
    /// Each packet number space is acknowledged independently; this only
    /// ever advances the space's watermark.
    pub fn maybe_update_largest_acked_of_packet_number_space(
        &mut self,
        space: PacketNumberSpace,
        packet_number: PacketNumber,
    ) {
        debug_assert!(
            self.config.multiple_packet_number_spaces,
            "multiplexed packet number spaces are not enabled"
        );
        self.spaces.maybe_update_largest_acked(space, packet_number);
    }

    /// Administratively discard all unencrypted packets
    ///
    /// Once the connection moves past initial keys, no unencrypted packet
    /// will ever be resent: frame ownership and in-flight status are cleared
    /// without going through the acknowledgement path. Returns the packets
    /// removed from flight so the caller can cancel loss timers referencing
    /// them.
    pub fn neuter_unencrypted_packets(&mut self) -> SmallVec<[PacketNumber; 2]> {
        self.neuter_matching(|info| info.encryption_level == EncryptionLevel::Initial)
    }

    /// Administratively discard all handshake-space packets
    ///
    /// Called when the handshake completes and its keys are dropped.
    /// Returns the packets removed from flight.
    pub fn neuter_handshake_packets(&mut self) -> SmallVec<[PacketNumber; 2]> {
        self.neuter_matching(|info| info.encryption_level == EncryptionLevel::Handshake)
    }

    // --- read-only queries --------------------------------------------------

    pub fn largest_sent_packet(&self) -> Option<PacketNumber> {
        self.largest_sent_packet
    }

    pub fn largest_acked(&self) -> Option<PacketNumber> {
        self.largest_acked
    }

    /// Sum of bytes over all in-flight packets
    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    /// Count of in-flight packets
    pub fn packets_in_flight(&self) -> u64 {
        self.packets_in_flight
    }

    /// Smallest packet number still tracked
    ///
    /// When nothing is tracked this is the number the next sent packet must
    /// carry.
    pub fn least_unacked(&self) -> PacketNumber {
        self.least_unacked
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Number of tracked packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn has_in_flight_packets(&self) -> bool {
        self.packets_in_flight > 0
    }

    pub fn has_multiple_in_flight_packets(&self) -> bool {
        self.packets_in_flight > 1
    }

    /// Check whether any tracked packet still owns handshake data
    pub fn has_pending_crypto_packets(&self) -> bool {
        self.pending_crypto_packet_count > 0
    }

    /// Check whether any stream data remains unacknowledged, per the session
    pub fn has_unacked_stream_data(&self) -> bool {
        self.notifier.has_unacked_stream_data()
    }

    /// Check whether a packet still owns frames that need resending
    ///
    /// False for untracked packets and for packets whose frames were
    /// resolved or carried forward by a newer transmission.
    pub fn has_retransmittable_frames(&self, packet_number: PacketNumber) -> bool {
        self.get(packet_number)
            .map_or(false, TransmissionInfo::has_retransmittable_frames)
    }

    /// Check whether any tracked packet owns frames that need resending
    pub fn has_unacked_retransmittable_frames(&self) -> bool {
        self.packets
            .iter()
            .any(TransmissionInfo::has_retransmittable_frames)
    }

    /// Send time of the most recent in-flight packet
    pub fn last_in_flight_packet_sent_time(&self) -> Option<Instant> {
        self.last_in_flight_packet_sent_time
    }

    /// Per-space variant of [`Self::last_in_flight_packet_sent_time`]
    pub fn last_in_flight_packet_sent_time_of_space(
        &self,
        space: PacketNumberSpace,
    ) -> Option<Instant> {
        self.spaces.last_in_flight_sent_time(space)
    }

    /// Send time of the most recent packet carrying handshake data
    pub fn last_crypto_packet_sent_time(&self) -> Option<Instant> {
        self.last_crypto_packet_sent_time
    }

    pub fn largest_acked_of_space(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.spaces.largest_acked(space)
    }

    pub fn largest_sent_of_space(&self, space: PacketNumberSpace) -> Option<PacketNumber> {
        self.spaces.largest_sent(space)
    }

    pub fn largest_sent_retransmittable_of_space(
        &self,
        space: PacketNumberSpace,
    ) -> Option<PacketNumber> {
        self.spaces.largest_sent_retransmittable(space)
    }

    pub fn bytes_in_flight_of_space(&self, space: PacketNumberSpace) -> u64 {
        self.spaces.bytes_in_flight(space)
    }

    pub fn packets_in_flight_of_space(&self, space: PacketNumberSpace) -> u64 {
        self.spaces.packets_in_flight(space)
    }

    /// Record of the oldest in-flight packet
    pub fn first_in_flight_transmission_info(&self) -> Option<&TransmissionInfo> {
        self.packets.iter().find(|info| info.in_flight)
    }

    /// Record of the oldest in-flight packet in one space
    pub fn first_in_flight_transmission_info_of_space(
        &self,
        space: PacketNumberSpace,
    ) -> Option<&TransmissionInfo> {
        self.packets.iter().find(|info| {
            info.in_flight
                && PacketNumberSpace::from_encryption_level(info.encryption_level) == space
        })
    }

    /// Packet number space a tracked packet belongs to
    ///
    /// # Panics
    /// Panics if `packet_number` is outside the tracked range.
    pub fn packet_number_space_of(&self, packet_number: PacketNumber) -> PacketNumberSpace {
        PacketNumberSpace::from_encryption_level(
            self.transmission_info(packet_number).encryption_level,
        )
    }

    /// Iterate over tracked records in packet number order
    pub fn iter(&self) -> impl Iterator<Item = (PacketNumber, &TransmissionInfo)> + '_ {
        let least_unacked = self.least_unacked;
        self.packets
            .iter()
            .enumerate()
            .map(move |(idx, info)| (least_unacked + idx as u64, info))
    }

    pub fn perspective(&self) -> Perspective {
        self.config.perspective
    }

    pub fn supports_multiple_packet_number_spaces(&self) -> bool {
        self.config.multiple_packet_number_spaces
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    // --- internals ----------------------------------------------------------

    /// Deque index of a tracked packet
    ///
    /// Panics if the number is below `least_unacked` (already trimmed or
    /// never valid) or above the largest sent packet.
    fn index_of(&self, packet_number: PacketNumber) -> usize {
        let Some(largest) = self.largest_sent_packet else {
            panic!("packet {} is not tracked (ledger is empty)", packet_number);
        };
        assert!(
            packet_number >= self.least_unacked && packet_number <= largest,
            "packet {} is not tracked (tracked range {}..={})",
            packet_number,
            self.least_unacked,
            largest
        );
        (packet_number - self.least_unacked) as usize
    }

    /// Take a record's frames, keeping the pending-crypto count in step
    fn take_frames(&mut self, packet_number: PacketNumber) -> Vec<Frame> {
        let idx = self.index_of(packet_number);
        if self.packets[idx].has_crypto_frames() {
            debug_assert!(self.pending_crypto_packet_count > 0);
            self.pending_crypto_packet_count -= 1;
        }
        std::mem::take(&mut self.packets[idx].retransmittable_frames)
    }

    fn largest_acked_for(&self, info: &TransmissionInfo) -> Option<PacketNumber> {
        if self.config.multiple_packet_number_spaces {
            self.spaces
                .largest_acked(PacketNumberSpace::from_encryption_level(info.encryption_level))
        } else {
            self.largest_acked
        }
    }

    /// True while the packet may still produce an RTT sample
    ///
    /// Eligibility lapses once the space's largest acknowledged number
    /// passes the packet: it can no longer be the newest acked packet.
    fn is_useful_for_rtt(&self, packet_number: PacketNumber, info: &TransmissionInfo) -> bool {
        info.needs_rtt_measurement
            && self
                .largest_acked_for(info)
                .map_or(true, |acked| packet_number > acked)
    }

    fn is_useful_for_congestion_control(info: &TransmissionInfo) -> bool {
        info.in_flight
    }

    /// True while retransmittable data is associated with the packet,
    /// directly or through a retransmission link
    fn is_useful_for_retransmittable_data(info: &TransmissionInfo) -> bool {
        info.has_retransmittable_frames() || info.retransmission.is_some()
    }

    /// Single source of truth for when a record may be reclaimed
    fn is_packet_useless(&self, packet_number: PacketNumber, info: &TransmissionInfo) -> bool {
        !self.is_useful_for_rtt(packet_number, info)
            && !Self::is_useful_for_congestion_control(info)
            && !Self::is_useful_for_retransmittable_data(info)
    }

    fn flush_aggregated_frame(
        aggregator: &mut StreamAckAggregator,
        notifier: &mut N,
        ack_delay: Duration,
    ) -> bool {
        match aggregator.take() {
            // There is no single receive timestamp for an aggregated range;
            // its packets may have arrived at different times.
            Some(frame) => notifier.on_frame_acked(&Frame::Stream(frame), ack_delay, None),
            None => false,
        }
    }

    fn process_acked_frames(
        &mut self,
        packet_number: PacketNumber,
        ack_delay: Duration,
        receive_time: Instant,
    ) -> bool {
        let idx = self.index_of(packet_number);
        let (packets, aggregator, notifier) =
            (&self.packets, &mut self.aggregator, &mut self.notifier);

        let mut new_data_acked = false;
        for frame in &packets[idx].retransmittable_frames {
            let stream_frame = match frame {
                Frame::Stream(stream_frame) => stream_frame,
                _ => {
                    if Self::flush_aggregated_frame(aggregator, notifier, ack_delay) {
                        new_data_acked = true;
                    }
                    if notifier.on_frame_acked(frame, ack_delay, Some(receive_time)) {
                        new_data_acked = true;
                    }
                    continue;
                }
            };

            if aggregator.can_extend(stream_frame) {
                aggregator.extend(stream_frame);
                new_data_acked = true;
                // A fin-bearing range is complete; report it right away.
                if stream_frame.fin
                    && Self::flush_aggregated_frame(aggregator, notifier, ack_delay)
                {
                    new_data_acked = true;
                }
                continue;
            }

            if Self::flush_aggregated_frame(aggregator, notifier, ack_delay) {
                new_data_acked = true;
            }
            if stream_frame.fin {
                if notifier.on_frame_acked(frame, ack_delay, Some(receive_time)) {
                    new_data_acked = true;
                }
            } else {
                aggregator.begin(stream_frame);
                new_data_acked = true;
            }
        }
        new_data_acked
    }

    fn neuter_matching(
        &mut self,
        should_neuter: impl Fn(&TransmissionInfo) -> bool,
    ) -> SmallVec<[PacketNumber; 2]> {
        let mut neutered: SmallVec<[PacketNumber; 2]> = SmallVec::new();
        for idx in 0..self.packets.len() {
            let number = self.least_unacked + idx as u64;
            let info = &self.packets[idx];
            if !should_neuter(info) {
                continue;
            }
            let affected = info.in_flight
                || info.has_retransmittable_frames()
                || info.retransmission.is_some();
            if !affected {
                continue;
            }
            let was_in_flight = info.in_flight;
            self.take_frames(number);
            self.packets[idx].retransmission = None;
            if was_in_flight {
                self.remove_from_in_flight(number);
                neutered.push(number);
            }
        }
        if !neutered.is_empty() {
            debug!(count = neutered.len(), "neutered packets");
        }
        neutered
    }
}
