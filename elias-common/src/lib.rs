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

use std::{collections::BTreeMap, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod protocol;
pub mod teams;

pub use protocol::{ClientCommand, DecodeError, OutboundFrame, SwipeAction, decode_inbound};
pub use teams::{generate_team_name, generate_unique_team_names};

pub const DEFAULT_ROUND_DURATION_SECONDS: u64 = 60;
pub const DEFAULT_WINNING_SCORE: u32 = 20;
/// Soft cap; reaching it never ends a round by itself.
pub const DEFAULT_MAX_WORDS_PER_ROUND: u32 = 5;
pub const DEFAULT_STATE_TTL_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_CATEGORY: &str = "general";
pub const MIN_TEAMS: u8 = 2;
pub const MAX_TEAMS: u8 = 5;
pub const MAX_PLAYERS_PER_ROOM: usize = 8;

pub type SessionId = Uuid;
pub type UserId = i64;
pub type WordId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Lobby,
    Playing,
    Finished,
}

/// Durable room row. Round, explainer and deadline mirror the live
/// [`GameState`] and may lag behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: SessionId,
    pub status: SessionStatus,
    pub current_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_explainer_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_end_at: Option<DateTime<Utc>>,
    pub category: String,
    pub num_teams: u8,
    pub team_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn has_team(&self, team: &str) -> bool {
        self.team_names.iter().any(|name| name == team)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: i64,
    pub room_id: SessionId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub score: u32,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    /// Team name if one has been chosen. An empty string counts as unassigned.
    pub fn assigned_team(&self) -> Option<&str> {
        self.team.as_deref().filter(|team| !team.is_empty())
    }
}

/// Identity handed over by the authentication collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub id: WordId,
    pub word: String,
    pub lang: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordState {
    pub id: WordId,
    pub word: String,
}

impl From<&Word> for WordState {
    fn from(word: &Word) -> Self {
        Self {
            id: word.id,
            word: word.word.clone(),
        }
    }
}

/// Live game record for one session, cached in the session state store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameState {
    pub room_id: SessionId,
    pub status: SessionStatus,
    pub current_round: u32,
    pub current_explainer: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_word: Option<WordState>,
    pub round_end_at: DateTime<Utc>,
    pub words_this_round: u32,
    pub team_scores: BTreeMap<String, u32>,
}

impl GameState {
    pub fn is_playing(&self) -> bool {
        self.status == SessionStatus::Playing
    }

    /// Whole seconds left in the round, truncated. Zero or negative once the
    /// deadline has passed.
    pub fn seconds_left(&self, now: DateTime<Utc>) -> i64 {
        (self.round_end_at - now).num_seconds()
    }
}

/// One dealt word and how it was resolved. At most one per (room, word).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub room_id: SessionId,
    pub word_id: WordId,
    pub round_num: u32,
    pub guessed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundStats {
    pub round_num: u32,
    pub words_guessed: u32,
    pub words_missed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStats {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameStats {
    pub room_id: SessionId,
    pub team_scores: BTreeMap<String, u32>,
    pub players: Vec<PlayerStats>,
    pub rounds: Vec<RoundStats>,
}

/// Clamp a requested team count into the supported range.
pub fn clamp_team_count(requested: Option<u8>) -> u8 {
    requested.unwrap_or(MIN_TEAMS).clamp(MIN_TEAMS, MAX_TEAMS)
}

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

/// Expands `${NAME}` references from the process environment. Unset names
/// expand to nothing.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |captures: &regex::Captures| {
            std::env::var(&captures[1]).unwrap_or_default()
        })
        .into_owned()
}
