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

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use elias_common::{
    DEFAULT_MAX_WORDS_PER_ROUND, DEFAULT_ROUND_DURATION_SECONDS, DEFAULT_STATE_TTL_SECONDS,
    DEFAULT_WINNING_SCORE,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GameRules {
    pub round_duration: Duration,
    pub winning_score: u32,
    pub max_words_per_round: u32,
    pub language: String,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(DEFAULT_ROUND_DURATION_SECONDS),
            winning_score: DEFAULT_WINNING_SCORE,
            max_words_per_round: DEFAULT_MAX_WORDS_PER_ROUND,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub outbound_capacity: usize,
    pub max_message_bytes: usize,
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            max_message_bytes: 512,
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }
}

/// Where live session state and durable rooms are kept. Both live in the
/// same backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSettings {
    InMemory,
    Dynamo {
        state_table: String,
        rooms_table: String,
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutSettings {
    pub bootstrap_servers: String,
    pub topic: String,
    pub group_prefix: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub replica_id: String,
    pub rules: GameRules,
    pub connection: ConnectionSettings,
    pub state_ttl: Duration,
    pub inbox_capacity: usize,
    pub lexicon_words_path: Option<String>,
    pub storage: StorageSettings,
    pub fanout: Option<FanoutSettings>,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |name: &str, default: &str| -> String {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |name: &str, default: u64| -> u64 {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(default)
                .max(1)
        };
        let optional = |name: &str| -> Option<String> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_raw = text("SESSION_SERVICE_BIND", "0.0.0.0:8080");
        let bind_addr = bind_raw
            .parse()
            .context("invalid SESSION_SERVICE_BIND")?;

        let rules = GameRules {
            round_duration: Duration::from_secs(number(
                "ROUND_DURATION_SECONDS",
                DEFAULT_ROUND_DURATION_SECONDS,
            )),
            winning_score: number("WINNING_SCORE", u64::from(DEFAULT_WINNING_SCORE)) as u32,
            max_words_per_round: number(
                "MAX_WORDS_PER_ROUND",
                u64::from(DEFAULT_MAX_WORDS_PER_ROUND),
            ) as u32,
            language: text("WORD_LANGUAGE", "en"),
        };

        let connection = ConnectionSettings {
            outbound_capacity: number("CLIENT_OUTBOUND_CAPACITY", 256) as usize,
            max_message_bytes: number("WS_MAX_MESSAGE_BYTES", 512) as usize,
            ping_period: Duration::from_secs(number("WS_PING_PERIOD_SECONDS", 54)),
            pong_wait: Duration::from_secs(number("WS_PONG_WAIT_SECONDS", 60)),
            write_wait: Duration::from_secs(number("WS_WRITE_WAIT_SECONDS", 10)),
        };

        let storage = if lookup("DYNAMODB_ENDPOINT").is_some() || lookup("AWS_REGION").is_some() {
            StorageSettings::Dynamo {
                state_table: text("SESSION_STATE_TABLE", "elias_session_state"),
                rooms_table: text("SESSION_ROOMS_TABLE", "elias_rooms"),
                endpoint: optional("DYNAMODB_ENDPOINT"),
            }
        } else {
            StorageSettings::InMemory
        };

        let fanout = optional("KAFKA_BOOTSTRAP_SERVERS").map(|bootstrap_servers| FanoutSettings {
            bootstrap_servers,
            topic: text("SESSION_FANOUT_TOPIC", "elias.session-events.v1"),
            group_prefix: text("SESSION_FANOUT_GROUP_PREFIX", "session-service-fanout"),
        });
        // Replicas only agree on rooms when they share a durable store.
        if fanout.is_some() && storage == StorageSettings::InMemory {
            anyhow::bail!(
                "KAFKA_BOOTSTRAP_SERVERS requires shared storage; set AWS_REGION or DYNAMODB_ENDPOINT"
            );
        }

        Ok(Self {
            bind_addr,
            replica_id: optional("REPLICA_ID").unwrap_or_else(|| Uuid::new_v4().to_string()),
            rules,
            connection,
            state_ttl: Duration::from_secs(number(
                "SESSION_STATE_TTL_SECONDS",
                DEFAULT_STATE_TTL_SECONDS,
            )),
            inbox_capacity: number("SESSION_INBOX_CAPACITY", 256) as usize,
            lexicon_words_path: optional("LEXICON_WORDS_PATH"),
            storage,
            fanout,
        })
    }
}
