//! Real-Time Voice Control Plane
//!
//! The two tightly-coupled halves of voice channel signaling:
//! - The ticket authority mints short-lived, single-use, HMAC-signed join
//!   tickets (see `ticket`).
//! - The signaling service authenticates WebSocket connections against those
//!   tickets and fans envelopes between the participants of a channel room
//!   (see `signaling` and `rooms`).
//!
//! The media plane is elsewhere: this module routes signaling only and never
//! interprets SDP or ICE payloads.

pub mod error;
pub mod rooms;
pub mod signaling;
pub mod ticket;
pub mod types;

// Re-exports
pub use error::TicketError;
pub use rooms::{PeerHandle, RoomHub};
pub use signaling::SignalingService;
pub use ticket::{IssueTicketInput, TicketAuthority};
pub use types::{Envelope, Participant, ParticipantSummary, Permissions, TicketClaims};
