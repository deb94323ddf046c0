// =============================================================================
// REST API Endpoints — Axum 0.8
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health, login)
// require no authentication. Everything else requires a Bearer session token
// checked via the `AuthSession` extractor.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthSession;
use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/login", post(login))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/logout", post(logout))
        .route("/api/v1/charts", get(charts))
        .route("/api/v1/groups", get(groups))
        .route("/api/v1/selection", post(set_selection))
        .route("/api/v1/notes", get(get_notes))
        .route("/api/v1/notes", post(set_notes))
        .route("/api/v1/notes/export", post(export_notes))
        // ── WebSocket (handled in the ws module but mounted here) ───
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Login / logout
// =============================================================================

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    username: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !state.credentials.authenticate(&req.username, &req.password) {
        warn!(username = %req.username, "login rejected");
        // One message for both unknown user and wrong password.
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid username or password" })),
        ));
    }

    let token = state.create_session(&req.username);
    info!(username = %req.username, "login ok — session created");

    Ok(Json(LoginResponse {
        token,
        username: req.username,
    }))
}

async fn logout(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(session) = state.remove_session(&auth.token) {
        info!(
            username = %session.username,
            logged_in_at = %session.logged_in_at,
            "session ended"
        );
    }

    Json(serde_json::json!({ "status": "logged out" }))
}

// =============================================================================
// Charts snapshot (authenticated)
// =============================================================================

async fn charts(
    _auth: AuthSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(snapshot)
}

// =============================================================================
// Symbol groups & selection (authenticated)
// =============================================================================

#[derive(Serialize)]
struct GroupsResponse {
    groups: Vec<crate::runtime_config::SymbolGroup>,
    selected: Vec<String>,
}

async fn groups(
    _auth: AuthSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let config = state.runtime_config.read();
    Json(GroupsResponse {
        groups: config.symbol_groups.clone(),
        selected: config.selected_groups.clone(),
    })
}

#[derive(Deserialize)]
struct SelectionRequest {
    groups: Vec<String>,
}

#[derive(Serialize)]
struct SelectionResponse {
    selected: Vec<String>,
    symbol_count: usize,
    message: String,
}

/// Update the selected groups. Takes effect on the next scan cycle; the
/// running cycle is never interrupted.
async fn set_selection(
    _auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectionRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let mut config = state.runtime_config.write();

    if let Some(unknown) = req.groups.iter().find(|g| !config.has_group(g)) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("Unknown symbol group: '{unknown}'"),
            })),
        ));
    }

    config.selected_groups = req.groups;
    let selected = config.selected_groups.clone();
    let symbol_count = config.selected_symbols().len();

    // Clone config and drop write lock before saving.
    let config_clone = config.clone();
    drop(config);

    // Save to disk (best-effort).
    if let Err(e) = config_clone.save("runtime_config.json") {
        warn!(error = %e, "Failed to save selection to disk");
    }

    state.increment_version();
    info!(selected = ?selected, symbol_count, "symbol selection updated");

    Ok(Json(SelectionResponse {
        selected,
        symbol_count,
        message: "Selection updated — applies from the next scan cycle".to_string(),
    }))
}

// =============================================================================
// Notepad (authenticated, session-scoped)
// =============================================================================

#[derive(Serialize)]
struct NotesResponse {
    text: String,
}

async fn get_notes(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let text = state.session_notepad(&auth.token).unwrap_or_default();
    Json(NotesResponse { text })
}

#[derive(Deserialize)]
struct NotesRequest {
    text: String,
}

async fn set_notes(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NotesRequest>,
) -> impl IntoResponse {
    state.set_session_notepad(&auth.token, req.text);
    Json(serde_json::json!({ "status": "saved" }))
}

#[derive(Deserialize, Default)]
struct ExportRequest {
    #[serde(default)]
    filename: Option<String>,
}

/// Offer the session's notepad text as a plain-text file download. No
/// validation, no persistence beyond the single response.
async fn export_notes(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExportRequest>,
) -> impl IntoResponse {
    let text = state.session_notepad(&auth.token).unwrap_or_default();

    let filename = req.filename.unwrap_or_else(|| {
        format!(
            "user_notes_{}.txt",
            chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S")
        )
    });

    info!(username = %auth.username, filename = %filename, "notes exported");

    (
        [
            (
                header::CONTENT_TYPE,
                "text/plain; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        text,
    )
}
