//! API Router and Application State
//!
//! Central routing configuration and shared state.

pub mod error;
pub mod identity;
pub mod rtc;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::capabilities::CapabilitiesService;
use crate::config::Config;
use crate::directory::Directory;
use crate::rtc::{SignalingService, TicketAuthority};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Join ticket authority
    pub tickets: Arc<TicketAuthority>,
    /// Voice signaling service
    pub signaling: Arc<SignalingService>,
    /// Server/channel directory
    pub directory: Arc<Directory>,
    /// Capability information (server id, ICE servers)
    pub capabilities: Arc<CapabilitiesService>,
}

impl AppState {
    /// Create new application state from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let tickets = Arc::new(TicketAuthority::new(
            &config.ticket_secret,
            config.ticket_ttl_seconds,
        ));
        let signaling = Arc::new(SignalingService::new(tickets.clone()));
        let directory = Arc::new(Directory::with_fixture_data());
        let capabilities = Arc::new(CapabilitiesService::new(config.clone()));

        Self {
            config,
            tickets,
            signaling,
            directory,
            capabilities,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    // Federated clients connect from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let is_production = state.config.is_production();

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/v1/rtc/channels/{channel_id}/join-ticket",
            post(rtc::issue_join_ticket),
        )
        .route("/v1/rtc/signaling", get(crate::rtc::signaling::handler))
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors);

    if !is_production {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

/// Liveness probe.
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
