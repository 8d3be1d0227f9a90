//! Test server harness for E2E testing.
//!
//! Spawns the real router, WebSocket handler, and UDP listener on
//! ephemeral loopback ports. Tests talk to the server exactly the way
//! a client would: HTTP requests, a WebSocket stream, and UDP
//! datagrams.

use anyhow::{anyhow, Context};
use futures_util::{SinkExt, StreamExt};
use lobby_protocol::frame::{self, ClientRegistered};
use lobby_protocol::codec;
use rendezvous::config::Config;
use rendezvous::routes::{self, AppState};
use rendezvous::server::udp;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// How long the test client waits for any single expected frame.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Test harness for spawning a rendezvous server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ping() -> anyhow::Result<()> {
///     let server = TestServer::spawn().await?;
///     let body = reqwest::get(format!("{}/ping", server.url()))
///         .await?
///         .text()
///         .await?;
///     assert_eq!(body, "pong");
///     Ok(())
/// }
/// ```
pub struct TestServer {
    http_addr: SocketAddr,
    udp_addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: CancellationToken,
    _http_handle: JoinHandle<()>,
    _udp_handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a server with default (production) timer settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::new()).await
    }

    /// Spawn a server with configuration overrides, e.g. shortened
    /// mediation timers.
    pub async fn spawn_with_vars(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let mut vars = vars;
        // Ephemeral ports unless the test pinned them.
        vars.entry("ORION_HTTP_PORT".to_string())
            .or_insert_with(|| "0".to_string());
        vars.entry("ORION_UDP_PORT".to_string())
            .or_insert_with(|| "0".to_string());

        let config = Config::from_vars(&vars);
        let shutdown = CancellationToken::new();

        let udp_socket = UdpSocket::bind(("127.0.0.1", config.udp_port))
            .await
            .context("failed to bind test UDP socket")?;
        let udp_addr = udp_socket.local_addr()?;

        let state = Arc::new(AppState::new(config, udp_addr.port(), shutdown.clone()));

        let udp_handle = tokio::spawn(udp::run(
            udp_socket,
            Arc::clone(&state),
            shutdown.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test server")?;
        let http_addr = listener.local_addr()?;

        let app = routes::build_routes(Arc::clone(&state));
        let http_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {e}");
            }
        });

        Ok(Self {
            http_addr,
            udp_addr,
            state,
            shutdown,
            _http_handle: http_handle,
            _udp_handle: udp_handle,
        })
    }

    /// Base URL of the request-response surface.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.http_addr)
    }

    /// URL of the stream upgrade endpoint.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.http_addr)
    }

    /// Address of the UDP listener.
    #[must_use]
    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    /// Direct access to the server state, for invariant assertions.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Open a stream and consume the `client_registered` frame.
    ///
    /// Returns the connected test stream and its session token.
    pub async fn connect(&self) -> Result<(TestStream, String), anyhow::Error> {
        let (socket, _response) = connect_async(self.ws_url())
            .await
            .context("websocket connect failed")?;
        let mut stream = TestStream { inner: socket };

        let value = stream.expect_method(frame::CLIENT_REGISTERED).await?;
        let registered: ClientRegistered = serde_json::from_value(value)?;
        let token = registered.token.expose().to_string();
        Ok((stream, token))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Stop the listeners and every session task spawned off them.
        self.shutdown.cancel();
        self._http_handle.abort();
        self._udp_handle.abort();
    }
}

/// One client-side view of a reliable stream.
pub struct TestStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestStream {
    /// Receive the next text frame, decoded.
    pub async fn recv_frame(&mut self) -> Result<(String, Value), anyhow::Error> {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.inner.next())
                .await
                .context("timed out waiting for a frame")?
                .ok_or_else(|| anyhow!("stream closed"))??;

            match message {
                Message::Text(text) => {
                    let (method, value) = codec::decode(&text)
                        .map_err(|e| anyhow!("undecodable frame from server: {e}"))?;
                    return Ok((method.to_string(), value));
                }
                Message::Close(_) => return Err(anyhow!("stream closed")),
                // Control frames are not part of the protocol.
                _ => {}
            }
        }
    }

    /// Receive the next frame and assert its method.
    pub async fn expect_method(&mut self, expected: &str) -> Result<Value, anyhow::Error> {
        let (method, value) = self.recv_frame().await?;
        if method != expected {
            return Err(anyhow!("expected frame {expected}, got {method}"));
        }
        Ok(value)
    }

    /// Assert that no frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(window, self.inner.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => Err(anyhow!("unexpected frame: {text}")),
            Ok(Some(Ok(_))) => Ok(()),
            Ok(Some(Err(e))) => Err(anyhow!("stream error: {e}")),
            Ok(None) => Err(anyhow!("stream closed")),
        }
    }

    /// Send an encoded frame to the server.
    pub async fn send_frame<T: Serialize>(
        &mut self,
        method: &str,
        payload: &T,
    ) -> Result<(), anyhow::Error> {
        let encoded = lobby_protocol::encode(method, payload)?;
        self.inner.send(Message::Text(encoded)).await?;
        Ok(())
    }

    /// Send raw text on the stream (for malformed-input tests).
    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.inner.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Close the stream, triggering the server's session-close cascade.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.inner.close(None).await?;
        Ok(())
    }
}

/// Emit a `ptpMediation_connect` datagram from a fresh ephemeral
/// socket, returning the source address the server should observe.
///
/// The socket is kept alive and returned so the source port stays
/// reserved for the rest of the test.
pub async fn send_connect_datagram(
    server: SocketAddr,
    token: &str,
) -> Result<(UdpSocket, SocketAddr), anyhow::Error> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let source = socket.local_addr()?;

    let datagram = lobby_protocol::encode(
        frame::PTP_MEDIATION_CONNECT,
        &serde_json::json!({ "token": token }),
    )?;
    socket.send_to(datagram.as_bytes(), server).await?;

    Ok((socket, source))
}
