//! HTTP routes and shared application state.

use crate::config::Config;
use crate::handlers;
use crate::lobby::LobbyRegistry;
use crate::mediation::MediatorConfig;
use crate::server::ws;
use crate::session::SessionRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers and listener tasks.
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Live reliable-stream sessions.
    pub sessions: SessionRegistry,

    /// Live lobbies and their mediators.
    pub lobbies: Arc<LobbyRegistry>,

    /// The UDP port actually bound (differs from the configured port
    /// when that was 0).
    pub udp_port: u16,

    /// Root cancellation token for process shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, udp_port: u16, shutdown: CancellationToken) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(),
            lobbies: Arc::new(LobbyRegistry::new()),
            udp_port,
            shutdown,
        }
    }

    /// Mediator timer settings derived from the configuration, plus
    /// the bound UDP port.
    #[must_use]
    pub fn mediator_config(&self) -> MediatorConfig {
        MediatorConfig {
            udp_port: self.udp_port,
            reminder_interval: self.config.connect_request_interval(),
            capture_timeout: self.config.capture_timeout(),
            connect_timeout: self.config.connect_timeout(),
        }
    }
}

/// Build the application routes.
///
/// The request-response surface gets a request timeout; the stream
/// upgrade at `/` does not (the upgrade response itself is immediate,
/// and the upgraded connection lives for the session).
pub fn build_routes(state: Arc<AppState>) -> Router {
    let rest = Router::new()
        .route(
            "/lobbies",
            get(handlers::list_lobbies).post(handlers::create_lobby),
        )
        .route("/lobbies/:lobby_id/join", post(handlers::join_lobby))
        .route("/lobbies/:lobby_id/ptp/start", post(handlers::start_mediation))
        .route("/ping", get(handlers::ping))
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    Router::new()
        .route("/", get(ws::upgrade))
        .merge(rest)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mediator_config_uses_bound_udp_port() {
        let config = Config::default();
        let state = AppState::new(config, 49152, CancellationToken::new());

        let mediator_config = state.mediator_config();
        assert_eq!(mediator_config.udp_port, 49152);
        assert_eq!(
            mediator_config.reminder_interval,
            Duration::from_millis(crate::config::DEFAULT_CONNECT_REQUEST_INTERVAL_MS)
        );
    }
}
