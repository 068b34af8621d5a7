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

//! Round state machine. Pure functions over [`GameState`]; the session actor
//! owns sequencing, persistence and broadcasting.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use elias_common::{GameState, Player, Room, SessionStatus, UserId, WordState};

use crate::{config::GameRules, error::SessionError};

pub fn deadline_after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX / 2);
    now + TimeDelta::milliseconds(millis)
}

/// Every configured team at zero, plus whatever score players already carry.
pub fn initial_team_scores(team_names: &[String], players: &[Player]) -> BTreeMap<String, u32> {
    let mut scores: BTreeMap<String, u32> =
        team_names.iter().map(|name| (name.clone(), 0)).collect();
    for player in players {
        if let Some(team) = player.assigned_team()
            && let Some(score) = scores.get_mut(team)
        {
            *score += player.score;
        }
    }
    scores
}

/// First player with a team, else the first player to join.
pub fn first_explainer(players: &[Player]) -> Option<UserId> {
    players
        .iter()
        .find(|player| player.assigned_team().is_some())
        .or_else(|| players.first())
        .map(|player| player.user_id)
}

/// Next player with a team after `current`, in join order, wrapping around.
/// Keeps `current` when nobody has picked a team.
pub fn next_explainer(players: &[Player], current: UserId) -> UserId {
    let eligible: Vec<UserId> = players
        .iter()
        .filter(|player| player.assigned_team().is_some())
        .map(|player| player.user_id)
        .collect();
    let Some(first) = eligible.first().copied() else {
        return current;
    };
    eligible
        .iter()
        .position(|user_id| *user_id == current)
        .and_then(|index| eligible.get(index + 1).copied())
        .unwrap_or(first)
}

pub fn start_game(
    room: &Room,
    players: &[Player],
    rules: &GameRules,
    now: DateTime<Utc>,
) -> Result<GameState, SessionError> {
    if room.status != SessionStatus::Lobby {
        return Err(SessionError::conflict("game already started"));
    }
    let explainer = first_explainer(players)
        .ok_or_else(|| SessionError::conflict("cannot start a game without players"))?;

    Ok(GameState {
        room_id: room.id,
        status: SessionStatus::Playing,
        current_round: 1,
        current_explainer: explainer,
        current_word: None,
        round_end_at: deadline_after(now, rules.round_duration),
        words_this_round: 0,
        team_scores: initial_team_scores(&room.team_names, players),
    })
}

pub fn swipe_applies(state: &GameState, user_id: UserId) -> bool {
    state.is_playing() && state.current_explainer == user_id && state.current_word.is_some()
}

/// Clears the current word and counts it. A guessed word adds one point to
/// `team` when the explainer has one of the room's teams.
pub fn resolve_word(state: &mut GameState, team: Option<&str>, guessed: bool) -> Option<WordState> {
    let word = state.current_word.take()?;
    state.words_this_round += 1;
    if guessed
        && let Some(team) = team
        && let Some(score) = state.team_scores.get_mut(team)
    {
        *score += 1;
    }
    Some(word)
}

/// Moves to the next round and returns the number of the round that ended.
pub fn advance_round(
    state: &mut GameState,
    players: &[Player],
    now: DateTime<Utc>,
    duration: Duration,
) -> u32 {
    let ended = state.current_round;
    state.current_round += 1;
    state.current_explainer = next_explainer(players, state.current_explainer);
    state.current_word = None;
    state.words_this_round = 0;
    state.round_end_at = deadline_after(now, duration);
    ended
}

/// Highest team at or above `threshold`. Ties go to the team listed first
/// in `team_order`.
pub fn winner(
    team_scores: &BTreeMap<String, u32>,
    threshold: u32,
    team_order: &[String],
) -> Option<String> {
    let rank = |team: &str| {
        team_order
            .iter()
            .position(|name| name == team)
            .unwrap_or(usize::MAX)
    };
    team_scores
        .iter()
        .filter(|(_, score)| **score >= threshold)
        .min_by(|(left, left_score), (right, right_score)| {
            right_score
                .cmp(left_score)
                .then_with(|| rank(left).cmp(&rank(right)))
                .then_with(|| left.cmp(right))
        })
        .map(|(team, _)| team.clone())
}

/// Rebuilds a playing mirror from durable rows when the cached state is gone.
/// The in-flight word is lost.
pub fn recover_state(room: &Room, players: &[Player]) -> Option<GameState> {
    if room.status != SessionStatus::Playing {
        return None;
    }
    Some(GameState {
        room_id: room.id,
        status: SessionStatus::Playing,
        current_round: room.current_round.max(1),
        current_explainer: room.current_explainer_id.or_else(|| first_explainer(players))?,
        current_word: None,
        round_end_at: room.round_end_at?,
        words_this_round: 0,
        team_scores: initial_team_scores(&room.team_names, players),
    })
}
