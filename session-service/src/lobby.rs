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

//! Room rules that run outside the session actor: creating rooms, joining,
//! picking teams and reading final stats.

use elias_common::{
    DEFAULT_CATEGORY, GameStats, MAX_PLAYERS_PER_ROOM, Player, PlayerStats, Room, SessionId,
    SessionStatus, UserId, UserProfile, clamp_team_count, generate_unique_team_names,
};
use tracing::info;

use crate::{
    error::SessionError,
    persistence::{NewPlayer, NewRoom, Persistence, PlayerInsert, TeamChange},
    rules::initial_team_scores,
};

#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub host: UserProfile,
    pub category: Option<String>,
    pub num_teams: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player: Player,
    pub newly_joined: bool,
}

async fn require_room(
    persistence: &dyn Persistence,
    room_id: SessionId,
) -> Result<Room, SessionError> {
    persistence
        .get_room(room_id)
        .await?
        .ok_or_else(|| SessionError::not_found(format!("room {room_id} not found")))
}

pub async fn create_room(
    persistence: &dyn Persistence,
    request: CreateRoom,
) -> Result<(Room, Player), SessionError> {
    let category = request
        .category
        .map(|category| category.trim().to_string())
        .filter(|category| !category.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let num_teams = clamp_team_count(request.num_teams);

    let room = persistence
        .create_room(NewRoom {
            category,
            num_teams,
            team_names: generate_unique_team_names(usize::from(num_teams)),
        })
        .await?;
    let host = match persistence
        .insert_player(
            NewPlayer {
                room_id: room.id,
                profile: request.host,
                is_host: true,
            },
            MAX_PLAYERS_PER_ROOM,
        )
        .await?
    {
        PlayerInsert::Inserted(host) | PlayerInsert::AlreadyJoined(host) => host,
        PlayerInsert::RoomFull => return Err(SessionError::conflict("room is full")),
    };

    info!(
        room_id = %room.id,
        host = host.user_id,
        num_teams,
        category = %room.category,
        "room created"
    );
    Ok((room, host))
}

/// Joining twice returns the existing membership. The seat limit is
/// enforced by the insert itself.
pub async fn join_room(
    persistence: &dyn Persistence,
    room_id: SessionId,
    profile: UserProfile,
) -> Result<JoinOutcome, SessionError> {
    let room = require_room(persistence, room_id).await?;
    if let Some(existing) = persistence.get_player(room_id, profile.user_id).await? {
        return Ok(JoinOutcome {
            player: existing,
            newly_joined: false,
        });
    }
    if room.status != SessionStatus::Lobby {
        return Err(SessionError::conflict("game already in progress"));
    }

    let inserted = persistence
        .insert_player(
            NewPlayer {
                room_id,
                profile,
                is_host: false,
            },
            MAX_PLAYERS_PER_ROOM,
        )
        .await?;
    match inserted {
        PlayerInsert::Inserted(player) => {
            info!(room_id = %room_id, user_id = player.user_id, "player joined room");
            Ok(JoinOutcome {
                player,
                newly_joined: true,
            })
        }
        PlayerInsert::AlreadyJoined(player) => Ok(JoinOutcome {
            player,
            newly_joined: false,
        }),
        PlayerInsert::RoomFull => Err(SessionError::conflict("room is full")),
    }
}

/// An empty or missing team clears the assignment.
pub async fn change_team(
    persistence: &dyn Persistence,
    room_id: SessionId,
    user_id: UserId,
    team: Option<String>,
) -> Result<Player, SessionError> {
    require_room(persistence, room_id).await?;
    match persistence
        .update_player_team(room_id, user_id, team)
        .await?
    {
        TeamChange::Updated(player) => Ok(player),
        TeamChange::PlayerNotFound => Err(SessionError::not_found(format!(
            "player {user_id} not found in room {room_id}"
        ))),
        TeamChange::InvalidTeam => Err(SessionError::conflict("invalid team")),
    }
}

pub async fn is_host(
    persistence: &dyn Persistence,
    room_id: SessionId,
    user_id: UserId,
) -> Result<bool, SessionError> {
    Ok(persistence
        .get_player(room_id, user_id)
        .await?
        .is_some_and(|player| player.is_host))
}

/// Team totals here are summed from player scores and can differ from the
/// live game's team tally after mid-game team changes.
pub async fn session_stats(
    persistence: &dyn Persistence,
    room_id: SessionId,
) -> Result<GameStats, SessionError> {
    let room = require_room(persistence, room_id).await?;
    let players = persistence.list_players(room_id).await?;
    let rounds = persistence.round_stats(room_id).await?;

    Ok(GameStats {
        room_id,
        team_scores: initial_team_scores(&room.team_names, &players),
        players: players
            .iter()
            .map(|player| PlayerStats {
                user_id: player.user_id,
                first_name: player.first_name.clone(),
                team: player.assigned_team().map(str::to_string),
                score: player.score,
            })
            .collect(),
        rounds,
    })
}
