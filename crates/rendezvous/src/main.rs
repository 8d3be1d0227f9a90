//! Orion rendezvous server entry point.
//!
//! # Listeners
//!
//! - HTTP server for the request-response surface and the WebSocket
//!   stream upgrade (default: 0.0.0.0:5980)
//! - Receive-only UDP socket for mediation datagrams
//!   (default: 0.0.0.0:5990)

use rendezvous::config::Config;
use rendezvous::routes::{self, AppState};
use rendezvous::server::udp;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Orion rendezvous server");

    let config = Config::from_env();
    info!(
        http_port = config.http_port,
        udp_port = config.udp_port,
        capture_timeout_ms = config.capture_timeout_ms,
        connect_request_interval_ms = config.connect_request_interval_ms,
        connect_timeout_ms = config.connect_timeout_ms,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();

    // Bind the UDP socket first: mediations advertise the bound port.
    let udp_socket = UdpSocket::bind(("0.0.0.0", config.udp_port)).await?;
    let udp_port = udp_socket.local_addr()?.port();

    let state = Arc::new(AppState::new(config.clone(), udp_port, shutdown.clone()));

    let udp_task = tokio::spawn(udp::run(udp_socket, Arc::clone(&state), shutdown.clone()));

    let listener = TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!(
        "Rendezvous HTTP server listening on {}",
        listener.local_addr()?
    );
    info!("Rendezvous UDP listener on port {udp_port}");

    let app = routes::build_routes(Arc::clone(&state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Process shutdown: no closure cascade is dispatched because every
    // peer is being disconnected anyway.
    shutdown.cancel();
    state.lobbies.shutdown();
    state.sessions.shutdown();

    if let Err(e) = udp_task.await {
        error!("UDP listener task error: {e}");
    }

    info!("Rendezvous server shutdown complete");
    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
///
/// Returns when a signal is received; also triggers the cancellation
/// token so the listener tasks stop alongside the HTTP server.
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    cancel_token.cancel();
}
