//! Request Identity
//!
//! Caller identity arrives on trusted headers set by the client edge:
//! `X-OpenChat-User-UID` and `X-OpenChat-Device-ID`. A bare bearer token may
//! stand in for the UID header. Outside production, missing identity falls
//! back to a fixed development identity; in production it is a 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;

/// Header carrying the caller's user uid.
pub const USER_UID_HEADER: &str = "x-openchat-user-uid";
/// Header carrying the caller's device id.
pub const DEVICE_ID_HEADER: &str = "x-openchat-device-id";

const DEV_USER_UID: &str = "uid_dev_local";
const DEV_DEVICE_ID: &str = "dev_local";

/// The authenticated caller of an HTTP request.
#[derive(Debug, Clone)]
pub struct Requester {
    /// User identity.
    pub user_uid: String,
    /// Device identity.
    pub device_id: String,
}

impl FromRequestParts<AppState> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let mut user_uid = header_value(parts, USER_UID_HEADER);
        let mut device_id = header_value(parts, DEVICE_ID_HEADER);

        if user_uid.is_empty() {
            let authorization = header_value(parts, "authorization");
            if authorization.len() > 7 && authorization[..7].eq_ignore_ascii_case("bearer ") {
                user_uid = authorization[7..].trim().to_string();
            }
        }

        if user_uid.is_empty() {
            if state.config.is_production() {
                return Err(ApiError::unauthorized("missing user identity headers"));
            }
            user_uid = DEV_USER_UID.to_string();
        }
        if device_id.is_empty() {
            device_id = DEV_DEVICE_ID.to_string();
        }

        Ok(Self {
            user_uid,
            device_id,
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> String {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string()
}
