//! Join Ticket Authority
//!
//! Mints tamper-evident, time-bounded, single-use capabilities that authorize
//! one join of one voice channel from one device. Tickets are consumed by the
//! signaling service with no further lookup: the claims travel inside the
//! ticket itself, HMAC-signed with a process-wide secret.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::error::TicketError;
use super::types::{Permissions, TicketClaims};

type HmacSha256 = Hmac<Sha256>;

/// Consumed-jti entries are purged once the set reaches this size.
const CONSUMED_COMPACTION_THRESHOLD: usize = 5000;

/// Input for [`TicketAuthority::issue`].
#[derive(Debug, Clone)]
pub struct IssueTicketInput {
    /// Server the channel belongs to.
    pub server_id: String,
    /// Voice channel to authorize.
    pub channel_id: String,
    /// Requesting user.
    pub user_uid: String,
    /// Requesting device.
    pub device_id: String,
    /// Publish permissions to bake into the ticket.
    pub permissions: Permissions,
}

/// Issues and single-use-consumes join tickets.
///
/// Purely in-memory: on restart all outstanding tickets become unreplayable
/// only through their expiry, which is why the TTL is short.
pub struct TicketAuthority {
    secret: Vec<u8>,
    ttl_seconds: i64,
    consumed: Mutex<HashMap<String, i64>>,
}

impl TicketAuthority {
    /// Create an authority signing with `secret`, issuing tickets valid for
    /// `ttl_seconds`.
    #[must_use]
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_seconds,
            consumed: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a ticket for the given claims input.
    ///
    /// Returns the opaque wire form together with a structured copy of the
    /// claims so callers can echo the non-secret fields back to the client.
    pub fn issue(&self, input: IssueTicketInput) -> Result<(String, TicketClaims), TicketError> {
        if input.server_id.trim().is_empty() || input.channel_id.trim().is_empty() {
            return Err(TicketError::InvalidInput);
        }

        let now = Utc::now().timestamp();
        let claims = TicketClaims {
            server_id: input.server_id,
            channel_id: input.channel_id,
            user_uid: input.user_uid,
            device_id: input.device_id,
            permissions: input.permissions,
            issued_at: now,
            expires_at: now + self.ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        };

        let ticket = self.encode(&claims)?;
        Ok((ticket, claims))
    }

    /// Validate a ticket and consume its `jti`, returning the claims.
    ///
    /// Consumption is at-most-once for the lifetime of the process: a second
    /// call with the same ticket fails with [`TicketError::ReplayTicket`].
    pub fn parse_and_consume(&self, ticket: &str) -> Result<TicketClaims, TicketError> {
        let Some((payload_b64, signature_b64)) = ticket.split_once('.') else {
            return Err(TicketError::InvalidTicket);
        };
        if signature_b64.contains('.') {
            return Err(TicketError::InvalidTicket);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TicketError::InvalidTicket)?;

        // Constant-time comparison via the MAC itself.
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TicketError::InvalidTicket)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TicketError::InvalidTicket)?;
        let claims: TicketClaims =
            serde_json::from_slice(&payload).map_err(|_| TicketError::InvalidTicket)?;

        let now = Utc::now().timestamp();
        if claims.expires_at <= now {
            return Err(TicketError::ExpiredTicket);
        }

        let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        if consumed.len() >= CONSUMED_COMPACTION_THRESHOLD {
            consumed.retain(|_, expires_at| *expires_at > now);
        }
        if consumed.contains_key(&claims.jti) {
            return Err(TicketError::ReplayTicket);
        }
        consumed.insert(claims.jti.clone(), claims.expires_at);

        Ok(claims)
    }

    /// Encode claims into the wire form
    /// `base64url(claims_json) "." base64url(hmac_sha256(secret, claims_b64))`.
    fn encode(&self, claims: &TicketClaims) -> Result<String, TicketError> {
        let payload =
            serde_json::to_vec(claims).map_err(|_| TicketError::InvalidTicket)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(payload_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload_b64}.{signature_b64}"))
    }
}
