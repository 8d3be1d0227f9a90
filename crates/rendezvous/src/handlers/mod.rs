//! HTTP handlers for the request-response surface.

mod lobbies;

pub use lobbies::{create_lobby, join_lobby, list_lobbies, start_mediation};

/// Handler for GET /ping
///
/// Liveness probe; always answers `pong`.
pub async fn ping() -> &'static str {
    "pong"
}
