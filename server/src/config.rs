//! Server Configuration
//!
//! Loads configuration from environment variables. All values have working
//! development defaults; only deployments need to set anything.

use std::env;

use url::Url;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (env: `OPENCHAT_HTTP_ADDR`, default: `0.0.0.0:8080`)
    pub http_addr: String,

    /// Public origin clients reach the server at (env: `OPENCHAT_PUBLIC_BASE_URL`,
    /// default: `http://localhost:8080`). Drives the advertised signaling URL.
    pub public_base_url: String,

    /// URL path of the signaling WebSocket endpoint
    /// (env: `OPENCHAT_SIGNALING_PATH`, default: `/v1/rtc/signaling`)
    pub signaling_path: String,

    /// Join ticket time-to-live in seconds
    /// (env: `OPENCHAT_JOIN_TICKET_TTL_SECONDS`, default: 60)
    pub ticket_ttl_seconds: i64,

    /// HMAC secret for join tickets (env: `OPENCHAT_JOIN_TICKET_SECRET`)
    pub ticket_secret: String,

    /// Deployment environment (env: `OPENCHAT_ENV`, default: `development`).
    /// `production` requires identity headers and disables request logging.
    pub environment: String,

    /// This server's own id (env: `OPENCHAT_SERVER_ID`, default: `srv_harbor`)
    pub server_id: String,

    /// STUN server advertised to clients (env: `OPENCHAT_STUN_SERVER`)
    pub stun_server: String,

    /// TURN server advertised to clients (env: `OPENCHAT_TURN_SERVER`, optional)
    pub turn_server: Option<String>,

    /// TURN username (env: `OPENCHAT_TURN_USERNAME`, optional)
    pub turn_username: Option<String>,

    /// TURN credential (env: `OPENCHAT_TURN_CREDENTIAL`, optional)
    pub turn_credential: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            http_addr: env_or_default("OPENCHAT_HTTP_ADDR", "0.0.0.0:8080"),
            public_base_url: env_or_default("OPENCHAT_PUBLIC_BASE_URL", "http://localhost:8080"),
            signaling_path: env_or_default("OPENCHAT_SIGNALING_PATH", "/v1/rtc/signaling"),
            ticket_ttl_seconds: env_or_default_i64("OPENCHAT_JOIN_TICKET_TTL_SECONDS", 60),
            ticket_secret: env_or_default(
                "OPENCHAT_JOIN_TICKET_SECRET",
                "dev-insecure-secret-change-me",
            ),
            environment: env_or_default("OPENCHAT_ENV", "development"),
            server_id: env_or_default("OPENCHAT_SERVER_ID", "srv_harbor"),
            stun_server: env_or_default("OPENCHAT_STUN_SERVER", "stun:stun.l.google.com:19302"),
            turn_server: env_opt("OPENCHAT_TURN_SERVER"),
            turn_username: env_opt("OPENCHAT_TURN_USERNAME"),
            turn_credential: env_opt("OPENCHAT_TURN_CREDENTIAL"),
        }
    }

    /// Whether this deployment runs in production mode.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// The WebSocket URL clients should connect to for signaling.
    ///
    /// Derived from the public base URL with the scheme mapped to `ws`/`wss`
    /// and the path replaced by the signaling path. Query and fragment are
    /// dropped.
    #[must_use]
    pub fn signaling_url(&self) -> String {
        let fallback = || format!("ws://localhost:8080{}", self.signaling_path);
        let Ok(mut base) = Url::parse(&self.public_base_url) else {
            return fallback();
        };
        let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
        if base.set_scheme(scheme).is_err() {
            return fallback();
        }
        base.set_path(&self.signaling_path);
        base.set_query(None);
        base.set_fragment(None);
        base.to_string()
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            http_addr: "127.0.0.1:8080".into(),
            public_base_url: "http://localhost:8080".into(),
            signaling_path: "/v1/rtc/signaling".into(),
            ticket_ttl_seconds: 60,
            ticket_secret: "unit-test-secret".into(),
            environment: "development".into(),
            server_id: "srv_harbor".into(),
            stun_server: "stun:stun.l.google.com:19302".into(),
            turn_server: None,
            turn_username: None,
            turn_credential: None,
        }
    }
}

fn env_or_default(key: &str, fallback: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or_default_i64(key: &str, fallback: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .filter(|parsed| *parsed > 0)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_url_maps_https_to_wss() {
        let mut config = Config::default_for_test();
        config.public_base_url = "https://chat.example.org".into();
        assert_eq!(
            config.signaling_url(),
            "wss://chat.example.org/v1/rtc/signaling"
        );
    }

    #[test]
    fn signaling_url_maps_http_to_ws() {
        let mut config = Config::default_for_test();
        config.public_base_url = "http://chat.example.org:9000".into();
        assert_eq!(
            config.signaling_url(),
            "ws://chat.example.org:9000/v1/rtc/signaling"
        );
    }

    #[test]
    fn signaling_url_strips_query_and_fragment() {
        let mut config = Config::default_for_test();
        config.public_base_url = "https://chat.example.org/app?tab=voice#general".into();
        assert_eq!(
            config.signaling_url(),
            "wss://chat.example.org/v1/rtc/signaling"
        );
    }

    #[test]
    fn unparseable_base_url_falls_back_to_localhost() {
        let mut config = Config::default_for_test();
        config.public_base_url = "localhost:8080".into();
        assert_eq!(
            config.signaling_url(),
            "ws://localhost:8080/v1/rtc/signaling"
        );
    }
}
