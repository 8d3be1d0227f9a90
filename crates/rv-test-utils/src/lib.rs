//! Test utilities for Orion E2E tests.
//!
//! Provides [`TestServer`] for spawning real rendezvous server
//! instances on ephemeral ports, plus a WebSocket test client and a
//! UDP datagram helper.

pub mod server_harness;

pub use server_harness::{send_connect_datagram, TestServer, TestStream};
