//! Rendezvous server error types.
//!
//! Errors on the request-response surface map to HTTP status codes via
//! the `IntoResponse` impl: 400 for malformed bodies and unknown
//! tokens, 409 for state conflicts. Conflict bodies carry the
//! user-facing explanation in an `errors` array. Errors observed on
//! the stream or datagram channels are never answered; callers drop
//! the offending input and log at warn.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// A precondition failure: the request is well-formed but the current
/// state forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("already in a lobby")]
    AlreadyInLobby,

    #[error("not the host")]
    NotHost,

    #[error("must be at least 2")]
    InsufficientMembers,

    #[error("lobby is full")]
    LobbyFull,

    #[error("name is taken")]
    NameTaken,

    #[error("lobby doesn't exist")]
    LobbyNotFound,

    #[error("already mediating")]
    AlreadyMediating,

    #[error("lobby is locked")]
    LobbyLocked,
}

/// Rendezvous server error type.
#[derive(Debug, Error)]
pub enum RvError {
    /// The request body failed validation (format, range, length).
    #[error("invalid request: {0}")]
    SchemaInvalid(String),

    /// The supplied token does not resolve to a live session.
    #[error("invalid token")]
    TokenUnknown,

    /// The operation conflicts with current lobby state.
    #[error(transparent)]
    Conflict(#[from] ConflictKind),
}

impl RvError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            RvError::SchemaInvalid(_) | RvError::TokenUnknown => StatusCode::BAD_REQUEST,
            RvError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    errors: Vec<String>,
}

impl IntoResponse for RvError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            errors: vec![self.to_string()],
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_conflict_messages_are_user_facing() {
        assert_eq!(ConflictKind::AlreadyInLobby.to_string(), "already in a lobby");
        assert_eq!(ConflictKind::NotHost.to_string(), "not the host");
        assert_eq!(
            ConflictKind::InsufficientMembers.to_string(),
            "must be at least 2"
        );
        assert_eq!(ConflictKind::LobbyFull.to_string(), "lobby is full");
        assert_eq!(ConflictKind::NameTaken.to_string(), "name is taken");
        assert_eq!(ConflictKind::LobbyNotFound.to_string(), "lobby doesn't exist");
        assert_eq!(
            ConflictKind::AlreadyMediating.to_string(),
            "already mediating"
        );
        assert_eq!(ConflictKind::LobbyLocked.to_string(), "lobby is locked");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RvError::SchemaInvalid("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(RvError::TokenUnknown.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RvError::Conflict(ConflictKind::LobbyFull).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_conflict_response_body() {
        let response = RvError::Conflict(ConflictKind::AlreadyMediating).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["errors"][0], "already mediating");
    }

    #[tokio::test]
    async fn test_schema_invalid_response_body() {
        let response =
            RvError::SchemaInvalid("lobbyName: name is too long".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert!(body["errors"][0]
            .as_str()
            .unwrap()
            .contains("name is too long"));
    }
}
