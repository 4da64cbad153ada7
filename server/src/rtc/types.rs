//! Wire types shared by the ticket authority and the signaling service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Publish permissions granted to a participant for the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// May publish audio streams.
    pub speak: bool,
    /// May publish camera video.
    pub video: bool,
    /// May publish screen shares.
    pub screenshare: bool,
}

impl Permissions {
    /// Grant everything. Used when the HTTP layer has no finer-grained policy.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            speak: true,
            video: true,
            screenshare: true,
        }
    }
}

/// Claims carried inside a join ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClaims {
    /// Server the channel belongs to.
    pub server_id: String,
    /// Voice channel the ticket grants access to.
    pub channel_id: String,
    /// Identity of the requesting user.
    pub user_uid: String,
    /// Device the ticket was issued to.
    pub device_id: String,
    /// Publish permissions baked into the ticket.
    pub permissions: Permissions,
    /// Expiry (Unix seconds, UTC).
    #[serde(rename = "exp")]
    pub expires_at: i64,
    /// Issue time (Unix seconds, UTC).
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Unique ticket id used for replay defense.
    pub jti: String,
}

/// One joined peer inside one voice channel.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Fresh unique id allocated per connection.
    pub participant_id: String,
    /// Channel the participant is a member of.
    pub channel_id: String,
    /// User identity copied from the consumed ticket.
    pub user_uid: String,
    /// Device identity copied from the consumed ticket.
    pub device_id: String,
    /// Publish permissions copied from the consumed ticket; immutable for the session.
    pub permissions: Permissions,
    /// When the participant joined.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Presence summary shared with other room members.
    #[must_use]
    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            participant_id: self.participant_id.clone(),
            channel_id: self.channel_id.clone(),
            user_uid: self.user_uid.clone(),
            device_id: self.device_id.clone(),
            permissions: self.permissions,
            joined_at: self.joined_at,
        }
    }
}

/// Participant fields exposed to peers in presence events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSummary {
    /// Participant id.
    pub participant_id: String,
    /// Channel the participant belongs to.
    pub channel_id: String,
    /// User identity.
    pub user_uid: String,
    /// Device identity.
    pub device_id: String,
    /// Publish permissions.
    pub permissions: Permissions,
    /// Join timestamp (RFC 3339).
    pub joined_at: DateTime<Utc>,
}

/// One signaling message on the wire, both directions.
///
/// The payload is a free-form JSON object and is never interpreted beyond the
/// few routing fields the service reads out of it. A missing payload is
/// treated as `{}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type, e.g. `rtc.join` or `rtc.ice.candidate`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Optional correlation token echoed back to the sender.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    /// Channel the envelope concerns.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    /// Opaque payload object.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    /// Build an outbound envelope. Non-object payloads are replaced by `{}`.
    #[must_use]
    pub fn new(event_type: &str, channel_id: &str, request_id: &str, payload: Value) -> Self {
        let payload = if payload.is_object() {
            payload
        } else {
            Value::Object(Map::new())
        };
        Self {
            event_type: event_type.to_string(),
            request_id: request_id.to_string(),
            channel_id: channel_id.to_string(),
            payload,
        }
    }

    /// The payload as an owned object; missing or malformed payloads yield `{}`.
    #[must_use]
    pub fn payload_object(&self) -> Map<String, Value> {
        self.payload.as_object().cloned().unwrap_or_default()
    }

    /// Read a trimmed string field out of the payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> &str {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
    }
}
