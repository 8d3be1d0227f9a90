//! Lobby handlers: list, create, join, start mediation.
//!
//! Every POST validates in the same order: body format first (400),
//! then token resolution (400), then state preconditions (409). The
//! conflict strings in the 409 bodies are user-facing and fixed.

use crate::errors::RvError;
use crate::lobby::{registry::CreateLobby, JoinView, LobbySummary, MAX_CAPACITY};
use crate::routes::AppState;
use crate::session::SessionHandle;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::{validate_name, LobbyId, SessionToken};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyList {
    pub lobbies: Vec<LobbySummary>,
}

/// Handler for GET /lobbies
///
/// Lists every public lobby with its current occupancy.
pub async fn list_lobbies(State(state): State<Arc<AppState>>) -> Json<LobbyList> {
    Json(LobbyList {
        lobbies: state.lobbies.list_public(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyRequest {
    token: SessionToken,
    host_name: String,
    lobby_name: String,
    is_public: bool,
    max_members: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyResponse {
    lobby_name: String,
    lobby_id: LobbyId,
}

/// Handler for POST /lobbies
///
/// Creates a lobby with the calling session as host.
///
/// # Response
///
/// - 201 Created: `{lobbyName, lobbyId}`
/// - 400 Bad Request: malformed name, capacity out of range, or
///   unknown token
/// - 409 Conflict: the session already belongs to a lobby
#[instrument(skip_all, name = "rv.http.create_lobby")]
pub async fn create_lobby(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateLobbyRequest>,
) -> Result<(StatusCode, Json<CreateLobbyResponse>), RvError> {
    validate_name(&request.host_name)
        .map_err(|e| RvError::SchemaInvalid(format!("hostName: {e}")))?;
    validate_name(&request.lobby_name)
        .map_err(|e| RvError::SchemaInvalid(format!("lobbyName: {e}")))?;
    let capacity = validate_capacity(request.max_members)?;

    let host = resolve_token(&state, &request.token)?;

    let lobby_id = state.lobbies.create(
        &host,
        CreateLobby {
            host_name: request.host_name,
            lobby_name: request.lobby_name.clone(),
            is_public: request.is_public,
            capacity,
        },
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CreateLobbyResponse {
            lobby_name: request.lobby_name,
            lobby_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLobbyRequest {
    token: SessionToken,
    peer_name: String,
}

/// Handler for POST /lobbies/{lobbyId}/join
///
/// Joins the calling session to a lobby; every existing member is
/// notified with `lobby_peerConnect` over its stream.
///
/// # Response
///
/// - 200 OK: the joiner's view `{lobbyId, lobbyName, lobbyMembers, host}`
/// - 400 Bad Request: malformed name or unknown token
/// - 409 Conflict: already in a lobby, lobby unknown/locked/full, or
///   display name taken
#[instrument(skip_all, name = "rv.http.join_lobby", fields(lobby_id = %lobby_id))]
pub async fn join_lobby(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
    Json(request): Json<JoinLobbyRequest>,
) -> Result<Json<JoinView>, RvError> {
    validate_name(&request.peer_name)
        .map_err(|e| RvError::SchemaInvalid(format!("peerName: {e}")))?;

    let session = resolve_token(&state, &request.token)?;

    let view = state.lobbies.join(
        &LobbyId::from_external(lobby_id),
        &session,
        request.peer_name,
    )?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMediationRequest {
    token: SessionToken,
}

/// Handler for POST /lobbies/{lobbyId}/ptp/start
///
/// Starts the hole-punch mediation for a lobby. Host only; the lobby
/// locks for the duration of the attempt.
///
/// # Response
///
/// - 200 OK: empty body
/// - 400 Bad Request: unknown token
/// - 409 Conflict: lobby unknown, caller is not the host, a mediation
///   is already running, or fewer than two members
#[instrument(skip_all, name = "rv.http.start_mediation", fields(lobby_id = %lobby_id))]
pub async fn start_mediation(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
    Json(request): Json<StartMediationRequest>,
) -> Result<StatusCode, RvError> {
    let session = resolve_token(&state, &request.token)?;

    state.lobbies.start_mediation(
        session.token(),
        &LobbyId::from_external(lobby_id),
        state.mediator_config(),
    )?;
    Ok(StatusCode::OK)
}

fn resolve_token(state: &AppState, token: &SessionToken) -> Result<SessionHandle, RvError> {
    state.sessions.lookup_by_token(token).ok_or_else(|| {
        warn!(target: "rv.http", "request with unknown token");
        RvError::TokenUnknown
    })
}

fn validate_capacity(max_members: i64) -> Result<u32, RvError> {
    if (1..=i64::from(MAX_CAPACITY)).contains(&max_members) {
        Ok(max_members as u32)
    } else {
        Err(RvError::SchemaInvalid(format!(
            "maxMembers must be between 1 and {MAX_CAPACITY}"
        )))
    }
}
