//! RTC HTTP Handlers
//!
//! The join-ticket endpoint. Signaling itself runs over the WebSocket
//! endpoint handled in `rtc::signaling`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::identity::Requester;
use super::AppState;
use crate::capabilities::IceServer;
use crate::rtc::{IssueTicketInput, Permissions};

/// Request body for `POST /v1/rtc/channels/{channel_id}/join-ticket`.
#[derive(Debug, Default, Deserialize)]
pub struct JoinTicketRequest {
    /// Server to join the channel on; defaults to this server's own id.
    #[serde(default)]
    pub server_id: String,
}

/// Response body for a successfully issued join ticket.
#[derive(Debug, Serialize)]
pub struct JoinTicketResponse {
    /// Opaque single-use ticket.
    pub ticket: String,
    /// Channel the ticket authorizes.
    pub channel_id: String,
    /// Server the channel belongs to.
    pub server_id: String,
    /// Requesting user.
    pub user_uid: String,
    /// Requesting device.
    pub device_id: String,
    /// Ticket expiry (RFC 3339 UTC).
    pub expires_at: String,
    /// WebSocket URL to present the ticket to.
    pub signaling_url: String,
    /// ICE servers for NAT traversal.
    pub ice_servers: Vec<IceServer>,
    /// Publish permissions baked into the ticket.
    pub permissions: Permissions,
}

/// Issue a join ticket for a voice channel.
///
/// `POST /v1/rtc/channels/{channel_id}/join-ticket`
pub async fn issue_join_ticket(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    requester: Requester,
    body: Bytes,
) -> Result<Json<JoinTicketResponse>, ApiError> {
    let channel_id = channel_id.trim().to_string();
    if channel_id.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_channel",
            "channel id is required",
        ));
    }
    if !state.directory.channel_exists(&channel_id).await {
        return Err(ApiError::not_found(
            "channel_not_found",
            "unknown voice channel",
        ));
    }
    if !state.directory.is_voice_channel(&channel_id).await {
        return Err(ApiError::bad_request(
            "invalid_channel_type",
            "join ticket can only be created for voice channels",
        ));
    }

    // The body is optional and tolerated when malformed.
    let request: JoinTicketRequest = serde_json::from_slice(&body).unwrap_or_default();
    let mut server_id = request.server_id.trim().to_string();
    if server_id.is_empty() {
        server_id = state.capabilities.server_id().to_string();
    }
    if !state.directory.server_exists(&server_id).await {
        return Err(ApiError::not_found("server_not_found", "unknown server"));
    }

    let (ticket, claims) = state
        .tickets
        .issue(IssueTicketInput {
            server_id,
            channel_id,
            user_uid: requester.user_uid,
            device_id: requester.device_id,
            permissions: Permissions::all(),
        })
        .map_err(|error| ApiError::bad_request("rtc_ticket_issue_failed", error.to_string()))?;

    let expires_at = DateTime::from_timestamp(claims.expires_at, 0)
        .map(|stamp| stamp.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    Ok(Json(JoinTicketResponse {
        ticket,
        channel_id: claims.channel_id,
        server_id: claims.server_id,
        user_uid: claims.user_uid,
        device_id: claims.device_id,
        expires_at,
        signaling_url: state.config.signaling_url(),
        ice_servers: state.capabilities.ice_servers(),
        permissions: claims.permissions,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::api::{create_router, AppState};
    use crate::config::Config;

    fn app() -> axum::Router {
        create_router(AppState::new(Config::default_for_test()))
    }

    fn ticket_request(channel_id: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/v1/rtc/channels/{channel_id}/join-ticket"))
            .header("X-OpenChat-User-UID", "uid_a")
            .header("X-OpenChat-Device-ID", "dev_a")
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn issues_ticket_for_voice_channel() {
        let response = app()
            .oneshot(ticket_request(
                "vc_general",
                Body::from(r#"{"server_id":"srv_harbor"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["channel_id"], "vc_general");
        assert_eq!(body["server_id"], "srv_harbor");
        assert_eq!(body["user_uid"], "uid_a");
        assert_eq!(body["device_id"], "dev_a");
        assert_eq!(body["permissions"]["speak"], true);
        assert_eq!(body["permissions"]["video"], true);
        assert_eq!(body["permissions"]["screenshare"], true);
        assert!(body["ticket"].as_str().unwrap().contains('.'));
        assert!(!body["expires_at"].as_str().unwrap().is_empty());
        assert_eq!(
            body["signaling_url"].as_str(),
            Some("ws://localhost:8080/v1/rtc/signaling")
        );
        assert!(!body["ice_servers"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_body_defaults_to_own_server() {
        let response = app()
            .oneshot(ticket_request("vc_general", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["server_id"], "srv_harbor");
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let response = app()
            .oneshot(ticket_request("vc_missing", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["code"], "channel_not_found");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn text_channel_is_rejected() {
        let response = app()
            .oneshot(ticket_request("ch_general", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["code"], "invalid_channel_type");
    }

    #[tokio::test]
    async fn unknown_server_is_not_found() {
        let response = app()
            .oneshot(ticket_request(
                "vc_general",
                Body::from(r#"{"server_id":"srv_nowhere"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["code"], "server_not_found");
    }

    #[tokio::test]
    async fn production_requires_identity_headers() {
        let mut config = Config::default_for_test();
        config.environment = "production".into();
        let app = create_router(AppState::new(config));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/rtc/channels/vc_general/join-ticket")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["code"], "unauthorized");
    }

    #[tokio::test]
    async fn bearer_token_stands_in_for_uid_header() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/rtc/channels/vc_general/join-ticket")
                    .header("Authorization", "Bearer uid_bearer")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["user_uid"], "uid_bearer");
        assert_eq!(body["device_id"], "dev_local");
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }
}
