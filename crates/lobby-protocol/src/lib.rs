//! Wire protocol for the Orion rendezvous server.
//!
//! Every message on both channels (the WebSocket stream and the UDP
//! datagram socket) is one UTF-8 text frame of the form
//! `method:base64(JSON(payload))`. This crate owns the codec and the
//! typed payload structs for every frame in the protocol.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod frame;

pub use codec::{decode, encode, CodecError};
