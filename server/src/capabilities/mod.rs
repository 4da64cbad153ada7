//! Client Capabilities
//!
//! Supplies the server's own identity and the ICE/TURN advertisement that is
//! handed to clients alongside a join ticket.

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::Config;

/// How long advertised TURN credentials stay valid.
const TURN_CREDENTIAL_LIFETIME_MINUTES: i64 = 30;

/// ICE server entry advertised to clients.
#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    /// Server URLs (e.g., `stun:stun.l.google.com:19302`).
    pub urls: Vec<String>,
    /// Username for TURN servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Credential for TURN servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Credential type for TURN servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,
    /// When the credential expires (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Capability information derived from configuration.
pub struct CapabilitiesService {
    config: Arc<Config>,
}

impl CapabilitiesService {
    /// Create the service over the loaded configuration.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// This server's own id, used when a ticket request names no server.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.config.server_id
    }

    /// ICE servers clients should use for NAT traversal: the configured STUN
    /// server, plus the TURN server with ephemeral credentials when one is
    /// configured.
    #[must_use]
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let mut servers = vec![IceServer {
            urls: vec![self.config.stun_server.clone()],
            username: None,
            credential: None,
            credential_type: None,
            expires_at: None,
        }];

        if let Some(turn) = &self.config.turn_server {
            let has_credentials =
                self.config.turn_username.is_some() && self.config.turn_credential.is_some();
            servers.push(IceServer {
                urls: vec![turn.clone()],
                username: self.config.turn_username.clone(),
                credential: self.config.turn_credential.clone(),
                credential_type: has_credentials.then(|| "ephemeral".to_string()),
                expires_at: has_credentials.then(|| {
                    (Utc::now() + Duration::minutes(TURN_CREDENTIAL_LIFETIME_MINUTES))
                        .to_rfc3339_opts(SecondsFormat::Secs, true)
                }),
            });
        }

        servers
    }
}
