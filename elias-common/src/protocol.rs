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

//! Client wire protocol. Every outbound frame is `{"type": .., "payload": ..}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Player, UserId, WordId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwipeAction {
    /// Guessed.
    Up,
    /// Skipped.
    Down,
}

impl SwipeAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn guessed(self) -> bool {
        self == Self::Up
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// A decoded, validated inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Swipe(SwipeAction),
    VoteStart,
    VotePause,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
    #[error("invalid swipe action {0:?}")]
    InvalidSwipeAction(String),
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    action: Option<String>,
}

pub fn decode_inbound(raw: &str) -> Result<ClientCommand, DecodeError> {
    let message = serde_json::from_str::<IncomingMessage>(raw)
        .map_err(|error| DecodeError::Malformed(error.to_string()))?;

    match message.kind.as_str() {
        "swipe" => {
            let action = message.action.unwrap_or_default();
            SwipeAction::parse(&action)
                .map(ClientCommand::Swipe)
                .ok_or(DecodeError::InvalidSwipeAction(action))
        }
        "vote_start" => Ok(ClientCommand::VoteStart),
        "vote_pause" => Ok(ClientCommand::VotePause),
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundFrame {
    PlayerJoined {
        player: Player,
    },
    TeamChanged {
        user_id: UserId,
        team: String,
    },
    GameStarted {
        explainer_id: UserId,
        /// Unix seconds.
        round_end_at: i64,
    },
    NewWord {
        word_id: WordId,
        word: String,
    },
    WordResult {
        word_id: WordId,
        word: String,
        guessed: bool,
    },
    Timer {
        seconds_left: u64,
    },
    RoundEnd {
        round: u32,
        team_scores: BTreeMap<String, u32>,
        next_explainer: UserId,
    },
    GameEnd {
        winner: String,
        team_scores: BTreeMap<String, u32>,
    },
    ScoreUpdate {
        team_scores: BTreeMap<String, u32>,
    },
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoined { .. } => "player_joined",
            Self::TeamChanged { .. } => "team_changed",
            Self::GameStarted { .. } => "game_started",
            Self::NewWord { .. } => "new_word",
            Self::WordResult { .. } => "word_result",
            Self::Timer { .. } => "timer",
            Self::RoundEnd { .. } => "round_end",
            Self::GameEnd { .. } => "game_end",
            Self::ScoreUpdate { .. } => "score_update",
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
