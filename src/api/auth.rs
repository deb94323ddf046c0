// =============================================================================
// Session Token Authentication — Axum Extractor
// =============================================================================
//
// Extracts a Bearer token from the `Authorization` header and resolves it
// against the live session table. Tokens are minted by POST /api/v1/login and
// die on logout; there is no shared secret.
//
// Usage as an Axum extractor:
//
//   async fn handler(auth: AuthSession, ...) { ... }
//
// If the token is missing or not a live session, the extractor short-circuits
// the request with a 403 Forbidden response before the handler body executes.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app_state::AppState;

// =============================================================================
// Extractor
// =============================================================================

/// A validated login session: the presented token and the username behind it.
pub struct AuthSession {
    pub token: String,
    pub username: String,
}

/// Rejection type returned when authentication fails.
pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, axum::Json(body)).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match auth_header {
            Some(value) if value.starts_with("Bearer ") => &value[7..],
            _ => {
                warn!("Missing or malformed Authorization header");
                return Err(AuthRejection {
                    status: StatusCode::FORBIDDEN,
                    message: "Missing or invalid session token",
                });
            }
        };

        match state.session_username(token) {
            Some(username) => Ok(AuthSession {
                token: token.to_string(),
                username,
            }),
            None => {
                warn!("Unknown or expired session token presented");
                Err(AuthRejection {
                    status: StatusCode::FORBIDDEN,
                    message: "Missing or invalid session token",
                })
            }
        }
    }
}

// =============================================================================
// Token validation helper (for WebSocket query-param auth)
// =============================================================================

/// Validate a session token outside the extractor path (e.g. the WebSocket
/// upgrade, where the token arrives as a query parameter).
pub fn validate_token(state: &Arc<AppState>, token: &str) -> bool {
    !token.is_empty() && state.session_username(token).is_some()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;

    #[test]
    fn validate_token_accepts_live_session_only() {
        let state = Arc::new(AppState::new(RuntimeConfig::default()));
        let token = state.create_session("alice");

        assert!(validate_token(&state, &token));
        assert!(!validate_token(&state, "not-a-token"));
        assert!(!validate_token(&state, ""));

        state.remove_session(&token);
        assert!(!validate_token(&state, &token));
    }
}
