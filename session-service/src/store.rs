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

use std::{collections::HashMap, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{Client as DynamoClient, types::AttributeValue};
use chrono::{DateTime, Utc};
use elias_common::{GameState, SessionId};
use tokio::sync::RwLock;

use crate::rules::deadline_after;

/// Cache of the live [`GameState`] per session. Absent means no live game.
/// Only the owning session actor writes here.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn get(&self, session_id: SessionId) -> anyhow::Result<Option<GameState>>;
    async fn put(&self, state: &GameState, ttl: Duration) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InMemorySessionStateStore {
    entries: RwLock<HashMap<SessionId, (GameState, DateTime<Utc>)>>,
}

impl InMemorySessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStateStore {
    async fn get(&self, session_id: SessionId) -> anyhow::Result<Option<GameState>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&session_id)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(state, _)| state.clone()))
    }

    /// Expired entries are dropped on every write.
    async fn put(&self, state: &GameState, ttl: Duration) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(state.room_id, (state.clone(), deadline_after(now, ttl)));
        Ok(())
    }
}

/// One item per session: `session_id` (S), `state` (S, JSON) and
/// `expires_at` (N, unix seconds) for the table's TTL attribute.
pub struct DynamoSessionStateStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoSessionStateStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl SessionStateStore for DynamoSessionStateStore {
    async fn get(&self, session_id: SessionId) -> anyhow::Result<Option<GameState>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context("failed to get item from session state table")?;

        match output.item() {
            Some(item) => state_from_item(item, Utc::now()),
            None => Ok(None),
        }
    }

    async fn put(&self, state: &GameState, ttl: Duration) -> anyhow::Result<()> {
        let expires_at = deadline_after(Utc::now(), ttl);
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(state_to_item(state, expires_at)?))
            .send()
            .await
            .context("failed to put item into session state table")?;
        Ok(())
    }
}

fn state_to_item(
    state: &GameState,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<HashMap<String, AttributeValue>> {
    let mut item = HashMap::new();
    item.insert(
        "session_id".to_string(),
        AttributeValue::S(state.room_id.to_string()),
    );
    item.insert(
        "state".to_string(),
        AttributeValue::S(serde_json::to_string(state)?),
    );
    item.insert(
        "expires_at".to_string(),
        AttributeValue::N(expires_at.timestamp().to_string()),
    );
    Ok(item)
}

/// DynamoDB deletes expired items lazily, so an item past `expires_at`
/// is treated as absent.
fn state_from_item(
    item: &HashMap<String, AttributeValue>,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<GameState>> {
    if let Some(expires_at) = item
        .get("expires_at")
        .and_then(|value| value.as_n().ok())
        .and_then(|value| value.parse::<i64>().ok())
        && expires_at <= now.timestamp()
    {
        return Ok(None);
    }

    let raw = item
        .get("state")
        .and_then(|value| value.as_s().ok())
        .context("session state item has no state attribute")?;
    let state = serde_json::from_str::<GameState>(raw).context("invalid session state json")?;
    Ok(Some(state))
}
