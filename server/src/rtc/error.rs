//! Ticket Authority Errors

use thiserror::Error;

/// Errors produced while issuing or consuming join tickets.
///
/// Every variant is terminal for the presented ticket; callers must not retry
/// with the same ticket string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketError {
    /// Issue input was missing a server or channel id.
    #[error("server and channel ids are required")]
    InvalidInput,

    /// Structurally or cryptographically invalid ticket.
    #[error("invalid join ticket")]
    InvalidTicket,

    /// Ticket expiry has passed.
    #[error("join ticket expired")]
    ExpiredTicket,

    /// Ticket was already consumed once.
    #[error("join ticket replayed")]
    ReplayTicket,
}
