//! Network listeners: the WebSocket stream handler and the UDP
//! datagram handler.

pub mod udp;
pub mod ws;
