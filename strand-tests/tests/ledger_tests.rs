//! Integration tests for the sent-packet ledger
//!
//! Drives the ledger through complete send/ack/loss/neuter flows and checks
//! the notifications delivered to the session side.

use bytes::Bytes;
use std::time::{Duration, Instant};
use strand_protocol::{
    CryptoFrame, EncryptionLevel, Frame, LedgerConfig, PacketLedger, PacketNumber,
    PacketNumberSpace, SentPacket, SessionNotifier, StreamFrame, StreamId, TransmissionType,
};

/// Test session that records every notification it receives
#[derive(Debug, Default)]
struct RecordingNotifier {
    acked: Vec<Frame>,
    lost: Vec<Frame>,
    retransmitted: Vec<(Vec<Frame>, TransmissionType)>,
    unacked_stream_data: bool,
}

impl SessionNotifier for RecordingNotifier {
    fn on_frame_acked(
        &mut self,
        frame: &Frame,
        _ack_delay: Duration,
        _receive_time: Option<Instant>,
    ) -> bool {
        if self.acked.contains(frame) {
            return false;
        }
        self.acked.push(frame.clone());
        true
    }

    fn on_frame_lost(&mut self, frame: &Frame) {
        self.lost.push(frame.clone());
    }

    fn retransmit_frames(&mut self, frames: &[Frame], transmission_type: TransmissionType) {
        self.retransmitted.push((frames.to_vec(), transmission_type));
    }

    fn has_unacked_stream_data(&self) -> bool {
        self.unacked_stream_data
    }
}

fn new_ledger() -> PacketLedger<RecordingNotifier> {
    PacketLedger::new(LedgerConfig::default(), RecordingNotifier::default())
}

fn stream_frame(stream: u64, offset: u64, length: usize) -> Frame {
    Frame::Stream(StreamFrame::new(
        StreamId::new(stream),
        offset,
        Bytes::from(vec![0xAB; length]),
        false,
    ))
}

fn send(
    ledger: &mut PacketLedger<RecordingNotifier>,
    number: u64,
    bytes: u64,
    level: EncryptionLevel,
    frames: Vec<Frame>,
) {
    ledger.add_sent_packet(
        SentPacket::new(PacketNumber::new(number), bytes, level, frames),
        TransmissionType::Original,
        Instant::now(),
        true,
        true,
    );
}

/// Acknowledge one packet the way the ack-processing routine does, in
/// increasing packet number order within one ack event.
fn ack_packet(ledger: &mut PacketLedger<RecordingNotifier>, number: u64) {
    let number = PacketNumber::new(number);
    let receive_time = Instant::now();
    ledger.increase_largest_acked(number);
    ledger.notify_frames_acked(number, Duration::from_millis(25), receive_time);
    if ledger.transmission_info(number).in_flight {
        ledger.remove_from_in_flight(number);
    }
    ledger.remove_retransmittability(number);
}

fn finish_ack_pass(ledger: &mut PacketLedger<RecordingNotifier>) {
    ledger.notify_aggregated_stream_frame_acked(Duration::from_millis(25));
    ledger.remove_obsolete_packets();
}

fn acked_stream_ranges(notifier: &RecordingNotifier) -> Vec<(u64, u64, u64)> {
    notifier
        .acked
        .iter()
        .filter_map(|frame| frame.as_stream())
        .map(|frame| (frame.stream_id.as_u64(), frame.offset, frame.length))
        .collect()
}

#[test]
fn test_single_packet_send_and_ack() {
    let mut ledger = new_ledger();
    send(
        &mut ledger,
        1,
        150,
        EncryptionLevel::OneRtt,
        vec![stream_frame(4, 0, 100)],
    );

    assert_eq!(ledger.bytes_in_flight(), 150);
    assert_eq!(ledger.packets_in_flight(), 1);

    ack_packet(&mut ledger, 1);
    finish_ack_pass(&mut ledger);

    assert_eq!(ledger.bytes_in_flight(), 0);
    assert_eq!(ledger.packets_in_flight(), 0);
    assert_eq!(ledger.notifier().acked.len(), 1);
    assert_eq!(acked_stream_ranges(ledger.notifier()), vec![(4, 0, 100)]);
    assert!(ledger.is_empty());
}

#[test]
fn test_losing_one_of_three_packets() {
    let mut ledger = new_ledger();
    for number in 1..=3u64 {
        send(
            &mut ledger,
            number,
            200,
            EncryptionLevel::OneRtt,
            vec![stream_frame(4, (number - 1) * 200, 200)],
        );
    }
    assert_eq!(ledger.bytes_in_flight(), 600);

    ledger.notify_frames_lost(PacketNumber::new(2), TransmissionType::LossRetransmission);
    ledger.remove_from_in_flight(PacketNumber::new(2));

    assert_eq!(ledger.notifier().lost.len(), 1);
    assert_eq!(
        ledger.notifier().lost[0].as_stream().unwrap().offset,
        200
    );
    assert_eq!(ledger.packets_in_flight(), 2);
    assert_eq!(ledger.bytes_in_flight(), 400);
    assert!(ledger.transmission_info(PacketNumber::new(1)).in_flight);
    assert!(ledger.transmission_info(PacketNumber::new(3)).in_flight);
}

#[test]
fn test_multiplexed_spaces_ack_independently() {
    let mut ledger = PacketLedger::new(
        LedgerConfig {
            multiple_packet_number_spaces: true,
            ..LedgerConfig::default()
        },
        RecordingNotifier::default(),
    );
    send(
        &mut ledger,
        1,
        1200,
        EncryptionLevel::Initial,
        vec![Frame::Crypto(CryptoFrame::new(0, Bytes::from_static(b"hello")))],
    );
    send(
        &mut ledger,
        2,
        800,
        EncryptionLevel::OneRtt,
        vec![stream_frame(4, 0, 100)],
    );

    assert_eq!(
        ledger.packet_number_space_of(PacketNumber::new(1)),
        PacketNumberSpace::Initial
    );
    assert_eq!(
        ledger.packet_number_space_of(PacketNumber::new(2)),
        PacketNumberSpace::ApplicationData
    );

    ledger.maybe_update_largest_acked_of_packet_number_space(
        PacketNumberSpace::Initial,
        PacketNumber::new(1),
    );
    ledger.increase_largest_acked(PacketNumber::new(1));

    assert_eq!(
        ledger.largest_acked_of_space(PacketNumberSpace::Initial),
        Some(PacketNumber::new(1))
    );
    assert_eq!(
        ledger.largest_acked_of_space(PacketNumberSpace::ApplicationData),
        None
    );
}

#[test]
fn test_trim_advances_least_unacked_past_acked_prefix() {
    let mut ledger = new_ledger();
    send(&mut ledger, 1, 100, EncryptionLevel::OneRtt, vec![stream_frame(4, 0, 50)]);
    send(&mut ledger, 2, 100, EncryptionLevel::OneRtt, vec![stream_frame(4, 50, 50)]);
    assert_eq!(ledger.least_unacked(), PacketNumber::new(1));

    ack_packet(&mut ledger, 1);
    ack_packet(&mut ledger, 2);
    finish_ack_pass(&mut ledger);

    assert_eq!(ledger.least_unacked(), PacketNumber::new(3));
    assert!(ledger.get(PacketNumber::new(1)).is_none());
    assert!(ledger.get(PacketNumber::new(2)).is_none());
}

#[test]
fn test_contiguous_stream_acks_aggregate_into_one_call() {
    let mut ledger = new_ledger();
    send(&mut ledger, 1, 140, EncryptionLevel::OneRtt, vec![stream_frame(4, 0, 100)]);
    send(&mut ledger, 2, 190, EncryptionLevel::OneRtt, vec![stream_frame(4, 100, 150)]);
    send(&mut ledger, 3, 90, EncryptionLevel::OneRtt, vec![stream_frame(4, 250, 50)]);

    for number in 1..=3 {
        ack_packet(&mut ledger, number);
    }
    finish_ack_pass(&mut ledger);

    assert_eq!(acked_stream_ranges(ledger.notifier()), vec![(4, 0, 300)]);
}

#[test]
fn test_other_stream_forces_flush() {
    let mut ledger = new_ledger();
    send(&mut ledger, 1, 140, EncryptionLevel::OneRtt, vec![stream_frame(4, 0, 100)]);
    send(&mut ledger, 2, 90, EncryptionLevel::OneRtt, vec![stream_frame(8, 0, 40)]);
    send(&mut ledger, 3, 190, EncryptionLevel::OneRtt, vec![stream_frame(4, 100, 150)]);

    for number in 1..=3 {
        ack_packet(&mut ledger, number);
    }
    finish_ack_pass(&mut ledger);

    assert_eq!(
        acked_stream_ranges(ledger.notifier()),
        vec![(4, 0, 100), (8, 0, 40), (4, 100, 150)]
    );
}

#[test]
fn test_noncontiguous_offsets_force_flush() {
    let mut ledger = new_ledger();
    send(&mut ledger, 1, 140, EncryptionLevel::OneRtt, vec![stream_frame(4, 0, 100)]);
    // A hole at [100, 200): packet 2 carries [200, 300).
    send(&mut ledger, 2, 140, EncryptionLevel::OneRtt, vec![stream_frame(4, 200, 100)]);

    ack_packet(&mut ledger, 1);
    ack_packet(&mut ledger, 2);
    finish_ack_pass(&mut ledger);

    assert_eq!(
        acked_stream_ranges(ledger.notifier()),
        vec![(4, 0, 100), (4, 200, 100)]
    );
}

#[test]
fn test_control_frames_bypass_aggregation() {
    let mut ledger = new_ledger();
    send(
        &mut ledger,
        1,
        140,
        EncryptionLevel::OneRtt,
        vec![Frame::MaxData(65536), stream_frame(4, 0, 100)],
    );

    ack_packet(&mut ledger, 1);

    // The control frame is reported immediately; the stream frame waits in
    // the aggregate until the pass ends.
    assert!(ledger.notifier().acked.contains(&Frame::MaxData(65536)));
    assert_eq!(acked_stream_ranges(ledger.notifier()), vec![]);

    finish_ack_pass(&mut ledger);
    assert_eq!(acked_stream_ranges(ledger.notifier()), vec![(4, 0, 100)]);
}

#[test]
fn test_fin_flushes_aggregate_immediately() {
    let mut ledger = new_ledger();
    send(&mut ledger, 1, 140, EncryptionLevel::OneRtt, vec![stream_frame(4, 0, 100)]);
    ledger.add_sent_packet(
        SentPacket::new(
            PacketNumber::new(2),
            90,
            EncryptionLevel::OneRtt,
            vec![Frame::Stream(StreamFrame::new(
                StreamId::new(4),
                100,
                Bytes::from(vec![0xAB; 50]),
                true,
            ))],
        ),
        TransmissionType::Original,
        Instant::now(),
        true,
        true,
    );

    ack_packet(&mut ledger, 1);
    ack_packet(&mut ledger, 2);

    // No explicit flush needed: the fin completed the range.
    let ranges = acked_stream_ranges(ledger.notifier());
    assert_eq!(ranges, vec![(4, 0, 150)]);
    let acked_stream = ledger.notifier().acked[0].as_stream().unwrap();
    assert!(acked_stream.fin);
}

#[test]
fn test_retransmit_frames_requeues_through_notifier() {
    let mut ledger = new_ledger();
    let frame = stream_frame(4, 0, 100);
    send(&mut ledger, 1, 140, EncryptionLevel::OneRtt, vec![frame.clone()]);

    ledger.retransmit_frames(PacketNumber::new(1), TransmissionType::PtoRetransmission);

    let (frames, transmission_type) = &ledger.notifier().retransmitted[0];
    assert_eq!(frames.as_slice(), &[frame]);
    assert_eq!(*transmission_type, TransmissionType::PtoRetransmission);
    // Re-queueing does not create a record or touch frame ownership.
    assert!(ledger.has_retransmittable_frames(PacketNumber::new(1)));
    assert_eq!(ledger.largest_sent_packet(), Some(PacketNumber::new(1)));
}

#[test]
fn test_ack_of_retransmission_does_not_renotify_original() {
    let mut ledger = new_ledger();
    send(&mut ledger, 1, 140, EncryptionLevel::OneRtt, vec![stream_frame(4, 0, 100)]);
    ledger.add_sent_packet(
        SentPacket::retransmission_of(
            PacketNumber::new(1),
            PacketNumber::new(2),
            140,
            EncryptionLevel::OneRtt,
            vec![stream_frame(4, 0, 100)],
        ),
        TransmissionType::LossRetransmission,
        Instant::now(),
        true,
        true,
    );

    // The retransmission is acked; the late ack of the original finds the
    // chain already resolved and notifies nothing further.
    ack_packet(&mut ledger, 2);
    let newly_acked = ledger.notify_frames_acked(
        PacketNumber::new(1),
        Duration::from_millis(25),
        Instant::now(),
    );
    assert!(!newly_acked);
    finish_ack_pass(&mut ledger);

    assert_eq!(acked_stream_ranges(ledger.notifier()), vec![(4, 0, 100)]);
}

#[test]
fn test_neutered_packets_produce_no_further_notifications() {
    let mut ledger = new_ledger();
    send(
        &mut ledger,
        1,
        1200,
        EncryptionLevel::Handshake,
        vec![Frame::Crypto(CryptoFrame::new(0, Bytes::from_static(b"hs")))],
    );

    let neutered = ledger.neuter_handshake_packets();
    assert_eq!(neutered.as_slice(), &[PacketNumber::new(1)]);
    assert_eq!(ledger.bytes_in_flight(), 0);

    ledger.notify_frames_lost(PacketNumber::new(1), TransmissionType::LossRetransmission);
    ledger.retransmit_frames(PacketNumber::new(1), TransmissionType::PtoRetransmission);

    assert!(ledger.notifier().lost.is_empty());
    let (frames, _) = &ledger.notifier().retransmitted[0];
    assert!(frames.is_empty());
}

#[test]
fn test_has_unacked_stream_data_delegates_to_session() {
    let mut ledger = new_ledger();
    assert!(!ledger.has_unacked_stream_data());

    ledger.notifier_mut().unacked_stream_data = true;
    assert!(ledger.has_unacked_stream_data());
}

#[test]
fn test_ack_pass_mixing_resolved_and_pending_packets() {
    let mut ledger = new_ledger();
    for number in 1..=5u64 {
        send(
            &mut ledger,
            number,
            100,
            EncryptionLevel::OneRtt,
            vec![stream_frame(4, (number - 1) * 100, 100)],
        );
    }

    // Ack 1, 2, and 4; packet 3 pins the front of the ledger.
    for number in [1, 2, 4] {
        ack_packet(&mut ledger, number);
    }
    finish_ack_pass(&mut ledger);

    assert_eq!(ledger.least_unacked(), PacketNumber::new(3));
    assert_eq!(ledger.packets_in_flight(), 2);
    assert_eq!(
        acked_stream_ranges(ledger.notifier()),
        vec![(4, 0, 200), (4, 300, 100)]
    );
}
