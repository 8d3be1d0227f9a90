//! Common types shared across Orion components.

#![warn(clippy::pedantic)]

/// Module for display-name validation
pub mod names;

/// Module for the session token secret type
pub mod token;

/// Module for common identifier types
pub mod types;

pub use names::{validate_name, NameError};
pub use token::SessionToken;
pub use types::{LobbyId, SessionId};
