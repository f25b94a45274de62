//! Session Notification Contract
//!
//! The ledger records state; the session reacts to it. Frame-level events
//! (acked, lost, needs retransmission) are delivered through this trait as
//! plain in-memory calls. The implementation observes frame data during the
//! call but never takes ownership of it.

use crate::frame::Frame;
use crate::transmission::TransmissionType;
use std::time::{Duration, Instant};

/// Receives frame lifecycle events from the sent-packet ledger
pub trait SessionNotifier {
    /// Called when a frame is acknowledged
    ///
    /// Returns true iff the frame contained data that was not already
    /// acknowledged; repeated calls for the same data are no-ops.
    /// `receive_time` is `None` for aggregated stream ranges, whose
    /// constituent packets may have been received at different times.
    fn on_frame_acked(
        &mut self,
        frame: &Frame,
        ack_delay: Duration,
        receive_time: Option<Instant>,
    ) -> bool;

    /// Called when a frame's containing packet is declared lost
    fn on_frame_lost(&mut self, frame: &Frame);

    /// Called to re-queue frames for sending under a new transmission
    fn retransmit_frames(&mut self, frames: &[Frame], transmission_type: TransmissionType);

    /// Check whether any stream data remains unacknowledged
    fn has_unacked_stream_data(&self) -> bool;
}

/// Notifier that ignores every event
///
/// Useful for benchmarks and for callers that drive the ledger without a
/// session attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl SessionNotifier for NullNotifier {
    fn on_frame_acked(
        &mut self,
        _frame: &Frame,
        _ack_delay: Duration,
        _receive_time: Option<Instant>,
    ) -> bool {
        false
    }

    fn on_frame_lost(&mut self, _frame: &Frame) {}

    fn retransmit_frames(&mut self, _frames: &[Frame], _transmission_type: TransmissionType) {}

    fn has_unacked_stream_data(&self) -> bool {
        false
    }
}
