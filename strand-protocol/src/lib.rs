//! Strand Protocol Core Implementation
//!
//! This crate implements the sender-side sent-packet ledger of the Strand
//! reliable transport: the authoritative record of every packet transmitted
//! but not yet acknowledged, discarded, or neutered. It tracks
//! retransmittable data across repeated transmissions of the same frames,
//! bytes and packets in flight for congestion control, and send times for
//! RTT measurement, with multiplexed packet number spaces during the
//! handshake.
//!
//! Congestion control, loss detection timers, frame wire codecs, key
//! management, and socket I/O are external collaborators: they consume the
//! queries and drive the mutations exposed here but live outside this crate.

pub mod aggregation;
pub mod frame;
pub mod ledger;
pub mod notifier;
pub mod number;
pub mod packet;
pub mod space;
pub mod transmission;

pub use aggregation::{StreamAckAggregator, MAX_AGGREGATED_DATA_LENGTH};
pub use frame::{CryptoFrame, Frame, StreamFrame, StreamId};
pub use ledger::{LedgerConfig, PacketLedger, Perspective};
pub use notifier::{NullNotifier, SessionNotifier};
pub use number::{PacketNumber, MAX_PACKET_NUMBER};
pub use packet::SentPacket;
pub use space::{
    EncryptionLevel, PacketNumberSpace, SpaceAggregates, PACKET_NUMBER_SPACE_COUNT,
};
pub use transmission::{TransmissionInfo, TransmissionType};
