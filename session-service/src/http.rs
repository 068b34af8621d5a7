// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use elias_common::{
    GameStats, OutboundFrame, Player, Room, SessionId, SwipeAction, UserId, UserProfile, WordId,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    actor::SwipeOutcome,
    config::ConnectionSettings,
    connection::ws_handler,
    error::SessionError,
    identity::IdentityVerifier,
    lobby::{self, CreateRoom},
    persistence::Persistence,
    registry::SessionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub persistence: Arc<dyn Persistence>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub connection: ConnectionSettings,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/{session_id}", get(ws_handler))
        .route("/internal/v1/sessions", post(create_session_handler))
        .route(
            "/internal/v1/sessions/{session_id}/players",
            post(join_session_handler),
        )
        .route(
            "/internal/v1/sessions/{session_id}/players/{user_id}/team",
            put(change_team_handler),
        )
        .route(
            "/internal/v1/sessions/{session_id}/start",
            post(start_game_handler),
        )
        .route(
            "/internal/v1/sessions/{session_id}/swipe",
            post(swipe_handler),
        )
        .route(
            "/internal/v1/sessions/{session_id}/stats",
            get(stats_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "session-service"}))
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    user: UserProfile,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    num_teams: Option<u8>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    room: Room,
    player: Player,
}

#[derive(Debug, Deserialize)]
struct JoinSessionRequest {
    user: UserProfile,
}

#[derive(Debug, Serialize)]
struct JoinSessionResponse {
    player: Player,
    newly_joined: bool,
}

#[derive(Debug, Deserialize)]
struct ChangeTeamRequest {
    #[serde(default)]
    team: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlayerResponse {
    player: Player,
}

#[derive(Debug, Deserialize)]
struct StartGameRequest {
    user_id: UserId,
}

#[derive(Debug, Serialize)]
struct StartGameResponse {
    status: &'static str,
    current_round: u32,
    explainer_id: UserId,
    round_end_at: i64,
    word_dealt: bool,
}

#[derive(Debug, Deserialize)]
struct SwipeRequest {
    user_id: UserId,
    action: String,
}

#[derive(Debug, Serialize)]
struct SwipeResponse {
    applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    word_id: Option<WordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guessed: Option<bool>,
    round_quota_reached: bool,
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let (room, player) = lobby::create_room(
        state.persistence.as_ref(),
        CreateRoom {
            host: request.user,
            category: request.category,
            num_teams: request.num_teams,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { room, player })))
}

async fn join_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<JoinSessionResponse>, ApiError> {
    let outcome = lobby::join_room(state.persistence.as_ref(), session_id, request.user).await?;
    if outcome.newly_joined {
        state
            .registry
            .broadcast(
                session_id,
                OutboundFrame::PlayerJoined {
                    player: outcome.player.clone(),
                },
            )
            .await;
    }
    Ok(Json(JoinSessionResponse {
        player: outcome.player,
        newly_joined: outcome.newly_joined,
    }))
}

async fn change_team_handler(
    State(state): State<AppState>,
    Path((session_id, user_id)): Path<(SessionId, UserId)>,
    Json(request): Json<ChangeTeamRequest>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let player =
        lobby::change_team(state.persistence.as_ref(), session_id, user_id, request.team).await?;
    state
        .registry
        .broadcast(
            session_id,
            OutboundFrame::TeamChanged {
                user_id,
                team: player.team.clone().unwrap_or_default(),
            },
        )
        .await;
    Ok(Json(PlayerResponse { player }))
}

async fn start_game_handler(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<StartGameRequest>,
) -> Result<Json<StartGameResponse>, ApiError> {
    if !lobby::is_host(state.persistence.as_ref(), session_id, request.user_id).await? {
        return Err(ApiError::conflict("only host can start game"));
    }
    let outcome = state.registry.start_game(session_id).await?;
    info!(
        session_id = %session_id,
        explainer = outcome.state.current_explainer,
        word_dealt = outcome.word_dealt,
        "start requested by host"
    );
    Ok(Json(StartGameResponse {
        status: "started",
        current_round: outcome.state.current_round,
        explainer_id: outcome.state.current_explainer,
        round_end_at: outcome.state.round_end_at.timestamp(),
        word_dealt: outcome.word_dealt,
    }))
}

async fn swipe_handler(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<SwipeRequest>,
) -> Result<Json<SwipeResponse>, ApiError> {
    let action = SwipeAction::parse(&request.action).ok_or_else(|| {
        ApiError::bad_request(format!("invalid swipe action {:?}", request.action))
    })?;
    let outcome = state
        .registry
        .swipe(session_id, request.user_id, action)
        .await?;
    let response = match outcome {
        SwipeOutcome::Ignored => SwipeResponse {
            applied: false,
            word_id: None,
            guessed: None,
            round_quota_reached: false,
        },
        SwipeOutcome::Resolved {
            word,
            guessed,
            round_quota_reached,
        } => SwipeResponse {
            applied: true,
            word_id: Some(word.id),
            guessed: Some(guessed),
            round_quota_reached,
        },
    };
    Ok(Json(response))
}

async fn stats_handler(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<GameStats>, ApiError> {
    Ok(Json(
        lobby::session_stats(state.persistence.as_ref(), session_id).await?,
    ))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        let status = match &error {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Conflict(_) => StatusCode::CONFLICT,
            SessionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SessionError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Collaborator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: format!("{error:#}"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        SessionError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
