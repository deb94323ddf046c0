// =============================================================================
// API module — REST endpoints, session auth, WebSocket push
// =============================================================================

pub mod auth;
pub mod rest;
pub mod ws;
