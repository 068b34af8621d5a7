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

use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client as DynamoClient,
    error::SdkError,
    operation::transact_write_items::TransactWriteItemsError,
    types::{AttributeValue, CancellationReason, Put, ReturnValue, TransactWriteItem, Update},
};
use chrono::{DateTime, SecondsFormat, Utc};
use elias_common::{
    Player, Room, RoundRecord, RoundStats, SessionId, SessionStatus, UserId, UserProfile, WordId,
};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub category: String,
    pub num_teams: u8,
    pub team_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub room_id: SessionId,
    pub profile: UserProfile,
    pub is_host: bool,
}

/// Room columns mirrored from the live game state.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomProgress {
    pub status: SessionStatus,
    pub current_round: u32,
    pub current_explainer_id: Option<UserId>,
    pub round_end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TeamChange {
    Updated(Player),
    PlayerNotFound,
    InvalidTeam,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerInsert {
    Inserted(Player),
    AlreadyJoined(Player),
    RoomFull,
}

/// Durable rooms, players and per-round word outcomes.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_room(&self, room: NewRoom) -> anyhow::Result<Room>;
    async fn get_room(&self, room_id: SessionId) -> anyhow::Result<Option<Room>>;
    /// Players ordered by join time.
    async fn list_players(&self, room_id: SessionId) -> anyhow::Result<Vec<Player>>;
    async fn get_player(&self, room_id: SessionId, user_id: UserId)
    -> anyhow::Result<Option<Player>>;
    /// Seat check and insert are one step, so concurrent joins never push a
    /// room past `capacity`. Fails when the room does not exist.
    async fn insert_player(
        &self,
        player: NewPlayer,
        capacity: usize,
    ) -> anyhow::Result<PlayerInsert>;
    /// `None` clears the assignment. A name outside the room's team list is refused.
    async fn update_player_team(
        &self,
        room_id: SessionId,
        user_id: UserId,
        team: Option<String>,
    ) -> anyhow::Result<TeamChange>;
    async fn update_room_progress(
        &self,
        room_id: SessionId,
        progress: RoomProgress,
    ) -> anyhow::Result<()>;
    /// Stores a word outcome and, in the same step, adds one point to
    /// `scorer`. Returns `false` and changes nothing when a record for
    /// (room, word) already existed. A scorer no longer in the room is skipped.
    async fn record_round_word(
        &self,
        record: RoundRecord,
        scorer: Option<UserId>,
    ) -> anyhow::Result<bool>;
    async fn round_stats(&self, room_id: SessionId) -> anyhow::Result<Vec<RoundStats>>;
}

/// Guessed and missed counts per round, ordered by round.
fn tally_rounds<'a>(records: impl IntoIterator<Item = &'a RoundRecord>) -> Vec<RoundStats> {
    let mut by_round: BTreeMap<u32, RoundStats> = BTreeMap::new();
    for record in records {
        let stats = by_round.entry(record.round_num).or_insert(RoundStats {
            round_num: record.round_num,
            words_guessed: 0,
            words_missed: 0,
        });
        if record.guessed {
            stats.words_guessed += 1;
        } else {
            stats.words_missed += 1;
        }
    }
    by_round.into_values().collect()
}

#[derive(Default)]
struct Tables {
    rooms: HashMap<SessionId, Room>,
    players: HashMap<SessionId, Vec<Player>>,
    round_words: HashMap<(SessionId, WordId), RoundRecord>,
    next_player_id: i64,
}

#[derive(Default)]
pub struct InMemoryPersistence {
    tables: RwLock<Tables>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl InMemoryPersistence {
    pub async fn set_player_score(&self, room_id: SessionId, user_id: UserId, score: u32) {
        let mut tables = self.tables.write().await;
        if let Some(player) = tables
            .players
            .get_mut(&room_id)
            .and_then(|players| players.iter_mut().find(|p| p.user_id == user_id))
        {
            player.score = score;
        }
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn create_room(&self, room: NewRoom) -> anyhow::Result<Room> {
        let created = Room {
            id: Uuid::new_v4(),
            status: SessionStatus::Lobby,
            current_round: 0,
            current_explainer_id: None,
            round_end_at: None,
            category: room.category,
            num_teams: room.num_teams,
            team_names: room.team_names,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.write().await;
        tables.rooms.insert(created.id, created.clone());
        tables.players.entry(created.id).or_default();
        Ok(created)
    }

    async fn get_room(&self, room_id: SessionId) -> anyhow::Result<Option<Room>> {
        Ok(self.tables.read().await.rooms.get(&room_id).cloned())
    }

    async fn list_players(&self, room_id: SessionId) -> anyhow::Result<Vec<Player>> {
        let tables = self.tables.read().await;
        let mut players = tables.players.get(&room_id).cloned().unwrap_or_default();
        players.sort_by_key(|player| (player.joined_at, player.id));
        Ok(players)
    }

    async fn get_player(
        &self,
        room_id: SessionId,
        user_id: UserId,
    ) -> anyhow::Result<Option<Player>> {
        let tables = self.tables.read().await;
        Ok(tables
            .players
            .get(&room_id)
            .and_then(|players| players.iter().find(|player| player.user_id == user_id))
            .cloned())
    }

    async fn insert_player(
        &self,
        player: NewPlayer,
        capacity: usize,
    ) -> anyhow::Result<PlayerInsert> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&player.room_id) {
            anyhow::bail!("room {} does not exist", player.room_id);
        }

        let id = tables.next_player_id + 1;
        let members = tables.players.entry(player.room_id).or_default();
        if let Some(existing) = members
            .iter()
            .find(|member| member.user_id == player.profile.user_id)
        {
            return Ok(PlayerInsert::AlreadyJoined(existing.clone()));
        }
        if members.len() >= capacity {
            return Ok(PlayerInsert::RoomFull);
        }

        let inserted = Player {
            id,
            room_id: player.room_id,
            user_id: player.profile.user_id,
            username: player.profile.username,
            first_name: player.profile.first_name,
            team: None,
            score: 0,
            is_host: player.is_host,
            joined_at: Utc::now(),
        };
        members.push(inserted.clone());
        tables.next_player_id = id;
        Ok(PlayerInsert::Inserted(inserted))
    }

    async fn update_player_team(
        &self,
        room_id: SessionId,
        user_id: UserId,
        team: Option<String>,
    ) -> anyhow::Result<TeamChange> {
        let mut tables = self.tables.write().await;
        let team = team.filter(|name| !name.is_empty());
        if let Some(name) = team.as_deref() {
            let known = tables
                .rooms
                .get(&room_id)
                .is_some_and(|room| room.has_team(name));
            if !known {
                return Ok(TeamChange::InvalidTeam);
            }
        }

        let Some(player) = tables
            .players
            .get_mut(&room_id)
            .and_then(|players| players.iter_mut().find(|p| p.user_id == user_id))
        else {
            return Ok(TeamChange::PlayerNotFound);
        };
        player.team = team;
        Ok(TeamChange::Updated(player.clone()))
    }

    async fn update_room_progress(
        &self,
        room_id: SessionId,
        progress: RoomProgress,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        let room = tables
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| anyhow::anyhow!("room {room_id} does not exist"))?;
        room.status = progress.status;
        room.current_round = progress.current_round;
        room.current_explainer_id = progress.current_explainer_id;
        room.round_end_at = progress.round_end_at;
        Ok(())
    }

    async fn record_round_word(
        &self,
        record: RoundRecord,
        scorer: Option<UserId>,
    ) -> anyhow::Result<bool> {
        let mut tables = self.tables.write().await;
        let key = (record.room_id, record.word_id);
        if tables.round_words.contains_key(&key) {
            return Ok(false);
        }
        if let Some(user_id) = scorer
            && let Some(player) = tables
                .players
                .get_mut(&record.room_id)
                .and_then(|players| players.iter_mut().find(|p| p.user_id == user_id))
        {
            player.score = player.score.saturating_add(1);
        }
        tables.round_words.insert(key, record);
        Ok(true)
    }

    async fn round_stats(&self, room_id: SessionId) -> anyhow::Result<Vec<RoundStats>> {
        let tables = self.tables.read().await;
        Ok(tally_rounds(
            tables
                .round_words
                .values()
                .filter(|record| record.room_id == room_id),
        ))
    }
}

const ROOM_SK: &str = "room";
const PLAYER_PREFIX: &str = "player#";
const WORD_PREFIX: &str = "word#";
const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";

/// Rooms, players and word outcomes share one table keyed by `room_id` (S)
/// and `sk` (S). The room item is `sk = "room"` and also counts seats taken
/// in `player_count`. Players live under `player#<user_id>` and word
/// outcomes under `word#<word_id>`.
pub struct DynamoPersistence {
    client: DynamoClient,
    table_name: String,
}

impl DynamoPersistence {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get(
        &self,
        room_id: SessionId,
        sk: String,
    ) -> anyhow::Result<Option<HashMap<String, AttributeValue>>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(item_key(room_id, sk)))
            .consistent_read(true)
            .send()
            .await
            .context("failed to get item from rooms table")?;
        Ok(output.item().cloned())
    }

    /// Every item of a room whose sort key starts with `prefix`, across pages.
    async fn query_prefix(
        &self,
        room_id: SessionId,
        prefix: &str,
    ) -> anyhow::Result<Vec<HashMap<String, AttributeValue>>> {
        let mut items = Vec::new();
        let mut start_key = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("room_id = :room_id AND begins_with(sk, :prefix)")
                .expression_attribute_values(":room_id", AttributeValue::S(room_id.to_string()))
                .expression_attribute_values(":prefix", AttributeValue::S(prefix.to_string()))
                .consistent_read(true)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .context("failed to query rooms table")?;
            items.extend(output.items().iter().cloned());
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => return Ok(items),
            }
        }
    }

    async fn put_round_word(&self, record: &RoundRecord) -> anyhow::Result<bool> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(round_record_to_item(record)))
            .condition_expression("attribute_not_exists(sk)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|error| error.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(error) => Err(error).context("failed to put round word item"),
        }
    }
}

#[async_trait]
impl Persistence for DynamoPersistence {
    async fn create_room(&self, room: NewRoom) -> anyhow::Result<Room> {
        let created = Room {
            id: Uuid::new_v4(),
            status: SessionStatus::Lobby,
            current_round: 0,
            current_explainer_id: None,
            round_end_at: None,
            category: room.category,
            num_teams: room.num_teams,
            team_names: room.team_names,
            created_at: Utc::now(),
        };
        let mut item = room_to_item(&created);
        item.insert("player_count".to_string(), AttributeValue::N("0".to_string()));
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(sk)")
            .send()
            .await
            .context("failed to put room item")?;
        Ok(created)
    }

    async fn get_room(&self, room_id: SessionId) -> anyhow::Result<Option<Room>> {
        self.get(room_id, ROOM_SK.to_string())
            .await?
            .map(|item| room_from_item(&item))
            .transpose()
    }

    async fn list_players(&self, room_id: SessionId) -> anyhow::Result<Vec<Player>> {
        let mut players = self
            .query_prefix(room_id, PLAYER_PREFIX)
            .await?
            .iter()
            .map(player_from_item)
            .collect::<anyhow::Result<Vec<_>>>()?;
        players.sort_by_key(|player| (player.joined_at, player.id));
        Ok(players)
    }

    async fn get_player(
        &self,
        room_id: SessionId,
        user_id: UserId,
    ) -> anyhow::Result<Option<Player>> {
        self.get(room_id, player_sk(user_id))
            .await?
            .map(|item| player_from_item(&item))
            .transpose()
    }

    async fn insert_player(
        &self,
        player: NewPlayer,
        capacity: usize,
    ) -> anyhow::Result<PlayerInsert> {
        let room_id = player.room_id;
        let joined_at = Utc::now();
        let inserted = Player {
            id: joined_at.timestamp_micros(),
            room_id,
            user_id: player.profile.user_id,
            username: player.profile.username,
            first_name: player.profile.first_name,
            team: None,
            score: 0,
            is_host: player.is_host,
            joined_at,
        };

        let claim_seat = Update::builder()
            .table_name(&self.table_name)
            .set_key(Some(item_key(room_id, ROOM_SK)))
            .update_expression("SET player_count = player_count + :one")
            .condition_expression("attribute_exists(sk) AND player_count < :capacity")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":capacity", AttributeValue::N(capacity.to_string()))
            .build()?;
        let add_player = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(player_to_item(&inserted)))
            .condition_expression("attribute_not_exists(sk)")
            .build()?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().update(claim_seat).build())
            .transact_items(TransactWriteItem::builder().put(add_player).build())
            .send()
            .await;
        let failed = match result {
            Ok(_) => return Ok(PlayerInsert::Inserted(inserted)),
            Err(error) => match failed_conditions(&error) {
                Some(failed) => failed,
                None => return Err(error).context("failed to insert player"),
            },
        };

        if failed.get(1).copied().unwrap_or(false)
            && let Some(existing) = self.get_player(room_id, inserted.user_id).await?
        {
            return Ok(PlayerInsert::AlreadyJoined(existing));
        }
        if failed.first().copied().unwrap_or(false) {
            if self.get_room(room_id).await?.is_none() {
                anyhow::bail!("room {room_id} does not exist");
            }
            return Ok(PlayerInsert::RoomFull);
        }
        anyhow::bail!("player insert into room {room_id} was cancelled")
    }

    async fn update_player_team(
        &self,
        room_id: SessionId,
        user_id: UserId,
        team: Option<String>,
    ) -> anyhow::Result<TeamChange> {
        let team = team.filter(|name| !name.is_empty());
        if let Some(name) = team.as_deref() {
            let known = self
                .get_room(room_id)
                .await?
                .is_some_and(|room| room.has_team(name));
            if !known {
                return Ok(TeamChange::InvalidTeam);
            }
        }

        let request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(item_key(room_id, player_sk(user_id))))
            .condition_expression("attribute_exists(sk)")
            .return_values(ReturnValue::AllNew);
        let request = match team {
            Some(name) => request
                .update_expression("SET team_name = :team")
                .expression_attribute_values(":team", AttributeValue::S(name)),
            None => request.update_expression("REMOVE team_name"),
        };

        match request.send().await {
            Ok(output) => {
                let item = output
                    .attributes()
                    .context("team update returned no attributes")?;
                Ok(TeamChange::Updated(player_from_item(item)?))
            }
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|error| error.is_conditional_check_failed_exception()) =>
            {
                Ok(TeamChange::PlayerNotFound)
            }
            Err(error) => Err(error).context("failed to update player team"),
        }
    }

    async fn update_room_progress(
        &self,
        room_id: SessionId,
        progress: RoomProgress,
    ) -> anyhow::Result<()> {
        let mut set = vec!["room_status = :status", "current_round = :round"];
        let mut remove = Vec::new();
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(item_key(room_id, ROOM_SK)))
            .condition_expression("attribute_exists(sk)")
            .expression_attribute_values(
                ":status",
                AttributeValue::S(status_value(progress.status).to_string()),
            )
            .expression_attribute_values(
                ":round",
                AttributeValue::N(progress.current_round.to_string()),
            );
        match progress.current_explainer_id {
            Some(explainer) => {
                set.push("explainer_id = :explainer");
                request = request
                    .expression_attribute_values(":explainer", AttributeValue::N(explainer.to_string()));
            }
            None => remove.push("explainer_id"),
        }
        match progress.round_end_at {
            Some(deadline) => {
                set.push("round_end_at = :deadline");
                request = request.expression_attribute_values(":deadline", timestamp_value(deadline));
            }
            None => remove.push("round_end_at"),
        }

        let mut expression = format!("SET {}", set.join(", "));
        if !remove.is_empty() {
            expression.push_str(" REMOVE ");
            expression.push_str(&remove.join(", "));
        }

        match request.update_expression(expression).send().await {
            Ok(_) => Ok(()),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|error| error.is_conditional_check_failed_exception()) =>
            {
                anyhow::bail!("room {room_id} does not exist")
            }
            Err(error) => Err(error).context("failed to update room progress"),
        }
    }

    async fn record_round_word(
        &self,
        record: RoundRecord,
        scorer: Option<UserId>,
    ) -> anyhow::Result<bool> {
        let Some(user_id) = scorer else {
            return self.put_round_word(&record).await;
        };

        let add_record = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(round_record_to_item(&record)))
            .condition_expression("attribute_not_exists(sk)")
            .build()?;
        let add_point = Update::builder()
            .table_name(&self.table_name)
            .set_key(Some(item_key(record.room_id, player_sk(user_id))))
            .update_expression("ADD player_score :one")
            .condition_expression("attribute_exists(sk)")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .build()?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(add_record).build())
            .transact_items(TransactWriteItem::builder().update(add_point).build())
            .send()
            .await;
        let failed = match result {
            Ok(_) => return Ok(true),
            Err(error) => match failed_conditions(&error) {
                Some(failed) => failed,
                None => return Err(error).context("failed to record round word"),
            },
        };

        if failed.first().copied().unwrap_or(false) {
            return Ok(false);
        }
        if failed.get(1).copied().unwrap_or(false) {
            warn!(room_id = %record.room_id, user_id, "scorer left the room, recording word only");
            return self.put_round_word(&record).await;
        }
        anyhow::bail!("round word {} was cancelled", record.word_id)
    }

    async fn round_stats(&self, room_id: SessionId) -> anyhow::Result<Vec<RoundStats>> {
        let records = self
            .query_prefix(room_id, WORD_PREFIX)
            .await?
            .iter()
            .map(|item| round_record_from_item(room_id, item))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(tally_rounds(&records))
    }
}

/// For a cancelled transaction, which items failed their condition, in
/// request order. `None` for any other failure.
fn failed_conditions<R>(error: &SdkError<TransactWriteItemsError, R>) -> Option<Vec<bool>> {
    match error.as_service_error()? {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => {
            Some(condition_failures(cancelled.cancellation_reasons()))
        }
        _ => None,
    }
}

fn condition_failures(reasons: &[CancellationReason]) -> Vec<bool> {
    reasons
        .iter()
        .map(|reason| reason.code() == Some(CONDITIONAL_CHECK_FAILED))
        .collect()
}

fn player_sk(user_id: UserId) -> String {
    format!("{PLAYER_PREFIX}{user_id}")
}

fn word_sk(word_id: WordId) -> String {
    format!("{WORD_PREFIX}{word_id}")
}

fn item_key(room_id: SessionId, sk: impl Into<String>) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("room_id".to_string(), AttributeValue::S(room_id.to_string())),
        ("sk".to_string(), AttributeValue::S(sk.into())),
    ])
}

fn status_value(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Lobby => "lobby",
        SessionStatus::Playing => "playing",
        SessionStatus::Finished => "finished",
    }
}

fn parse_status(raw: &str) -> anyhow::Result<SessionStatus> {
    match raw {
        "lobby" => Ok(SessionStatus::Lobby),
        "playing" => Ok(SessionStatus::Playing),
        "finished" => Ok(SessionStatus::Finished),
        other => anyhow::bail!("unknown room status {other:?}"),
    }
}

fn timestamp_value(at: DateTime<Utc>) -> AttributeValue {
    AttributeValue::S(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn string_attr<'a>(item: &'a HashMap<String, AttributeValue>, name: &str) -> anyhow::Result<&'a str> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .map(String::as_str)
        .with_context(|| format!("item has no string attribute {name}"))
}

fn optional_string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .cloned()
}

fn number_attr<T: FromStr>(item: &HashMap<String, AttributeValue>, name: &str) -> anyhow::Result<T> {
    optional_number_attr(item, name)
        .with_context(|| format!("item has no numeric attribute {name}"))
}

fn optional_number_attr<T: FromStr>(item: &HashMap<String, AttributeValue>, name: &str) -> Option<T> {
    item.get(name)
        .and_then(|value| value.as_n().ok())
        .and_then(|value| value.parse().ok())
}

fn bool_attr(item: &HashMap<String, AttributeValue>, name: &str) -> anyhow::Result<bool> {
    item.get(name)
        .and_then(|value| value.as_bool().ok())
        .copied()
        .with_context(|| format!("item has no boolean attribute {name}"))
}

fn timestamp_attr(item: &HashMap<String, AttributeValue>, name: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = string_attr(item, name)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("attribute {name} is not an rfc3339 timestamp"))
}

fn room_to_item(room: &Room) -> HashMap<String, AttributeValue> {
    let mut item = item_key(room.id, ROOM_SK);
    item.insert(
        "room_status".to_string(),
        AttributeValue::S(status_value(room.status).to_string()),
    );
    item.insert(
        "current_round".to_string(),
        AttributeValue::N(room.current_round.to_string()),
    );
    if let Some(explainer) = room.current_explainer_id {
        item.insert("explainer_id".to_string(), AttributeValue::N(explainer.to_string()));
    }
    if let Some(deadline) = room.round_end_at {
        item.insert("round_end_at".to_string(), timestamp_value(deadline));
    }
    item.insert("category".to_string(), AttributeValue::S(room.category.clone()));
    item.insert("num_teams".to_string(), AttributeValue::N(room.num_teams.to_string()));
    item.insert(
        "team_names".to_string(),
        AttributeValue::L(
            room.team_names
                .iter()
                .map(|name| AttributeValue::S(name.clone()))
                .collect(),
        ),
    );
    item.insert("created_at".to_string(), timestamp_value(room.created_at));
    item
}

fn room_from_item(item: &HashMap<String, AttributeValue>) -> anyhow::Result<Room> {
    let id = Uuid::parse_str(string_attr(item, "room_id")?).context("invalid room id")?;
    let team_names = item
        .get("team_names")
        .and_then(|value| value.as_l().ok())
        .context("room item has no team_names list")?
        .iter()
        .map(|value| value.as_s().cloned().map_err(|_| anyhow::anyhow!("team name is not a string")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Room {
        id,
        status: parse_status(string_attr(item, "room_status")?)?,
        current_round: number_attr(item, "current_round")?,
        current_explainer_id: optional_number_attr(item, "explainer_id"),
        round_end_at: item
            .contains_key("round_end_at")
            .then(|| timestamp_attr(item, "round_end_at"))
            .transpose()?,
        category: string_attr(item, "category")?.to_string(),
        num_teams: number_attr(item, "num_teams")?,
        team_names,
        created_at: timestamp_attr(item, "created_at")?,
    })
}

fn player_to_item(player: &Player) -> HashMap<String, AttributeValue> {
    let mut item = item_key(player.room_id, player_sk(player.user_id));
    item.insert("player_id".to_string(), AttributeValue::N(player.id.to_string()));
    item.insert("user_id".to_string(), AttributeValue::N(player.user_id.to_string()));
    if let Some(username) = &player.username {
        item.insert("username".to_string(), AttributeValue::S(username.clone()));
    }
    if let Some(first_name) = &player.first_name {
        item.insert("first_name".to_string(), AttributeValue::S(first_name.clone()));
    }
    if let Some(team) = &player.team {
        item.insert("team_name".to_string(), AttributeValue::S(team.clone()));
    }
    item.insert("player_score".to_string(), AttributeValue::N(player.score.to_string()));
    item.insert("is_host".to_string(), AttributeValue::Bool(player.is_host));
    item.insert("joined_at".to_string(), timestamp_value(player.joined_at));
    item
}

fn player_from_item(item: &HashMap<String, AttributeValue>) -> anyhow::Result<Player> {
    Ok(Player {
        id: number_attr(item, "player_id")?,
        room_id: Uuid::parse_str(string_attr(item, "room_id")?).context("invalid room id")?,
        user_id: number_attr(item, "user_id")?,
        username: optional_string_attr(item, "username"),
        first_name: optional_string_attr(item, "first_name"),
        team: optional_string_attr(item, "team_name"),
        score: optional_number_attr(item, "player_score").unwrap_or(0),
        is_host: bool_attr(item, "is_host")?,
        joined_at: timestamp_attr(item, "joined_at")?,
    })
}

fn round_record_to_item(record: &RoundRecord) -> HashMap<String, AttributeValue> {
    let mut item = item_key(record.room_id, word_sk(record.word_id));
    item.insert("word_id".to_string(), AttributeValue::N(record.word_id.to_string()));
    item.insert("round_num".to_string(), AttributeValue::N(record.round_num.to_string()));
    item.insert("guessed".to_string(), AttributeValue::Bool(record.guessed));
    item
}

fn round_record_from_item(
    room_id: SessionId,
    item: &HashMap<String, AttributeValue>,
) -> anyhow::Result<RoundRecord> {
    Ok(RoundRecord {
        room_id,
        word_id: number_attr(item, "word_id")?,
        round_num: number_attr(item, "round_num")?,
        guessed: bool_attr(item, "guessed")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn profile(user_id: UserId) -> UserProfile {
        UserProfile {
            user_id,
            username: None,
            first_name: Some(format!("user-{user_id}")),
        }
    }

    fn new_player(room_id: SessionId, user_id: UserId) -> NewPlayer {
        NewPlayer {
            room_id,
            profile: profile(user_id),
            is_host: false,
        }
    }

    async fn room_with_players(store: &InMemoryPersistence, users: &[UserId]) -> Room {
        let room = store
            .create_room(NewRoom {
                category: "general".to_string(),
                num_teams: 2,
                team_names: vec!["Foxes".to_string(), "Owls".to_string()],
            })
            .await
            .unwrap();
        for (index, user_id) in users.iter().enumerate() {
            let inserted = store
                .insert_player(
                    NewPlayer {
                        is_host: index == 0,
                        ..new_player(room.id, *user_id)
                    },
                    8,
                )
                .await
                .unwrap();
            assert!(matches!(inserted, PlayerInsert::Inserted(_)));
        }
        room
    }

    fn record(room_id: SessionId, word_id: WordId, round_num: u32, guessed: bool) -> RoundRecord {
        RoundRecord {
            room_id,
            word_id,
            round_num,
            guessed,
        }
    }

    #[tokio::test]
    async fn players_are_listed_in_join_order() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[30, 10, 20]).await;

        let players = store.list_players(room.id).await.unwrap();
        let ids: Vec<UserId> = players.iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert!(players[0].is_host);
        assert!(!players[1].is_host);
    }

    #[tokio::test]
    async fn repeated_insert_returns_existing_member() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1]).await;
        let existing = store.get_player(room.id, 1).await.unwrap().unwrap();

        let again = store.insert_player(new_player(room.id, 1), 8).await.unwrap();
        assert_eq!(again, PlayerInsert::AlreadyJoined(existing));
        assert_eq!(store.list_players(room.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_into_missing_room_fails() {
        let store = InMemoryPersistence::new();
        assert!(
            store
                .insert_player(new_player(Uuid::new_v4(), 1), 8)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn insert_stops_at_capacity() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1, 2]).await;

        assert_eq!(
            store.insert_player(new_player(room.id, 3), 2).await.unwrap(),
            PlayerInsert::RoomFull
        );
        assert!(matches!(
            store.insert_player(new_player(room.id, 3), 3).await.unwrap(),
            PlayerInsert::Inserted(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_never_exceed_capacity() {
        let store = Arc::new(InMemoryPersistence::new());
        let room_id = room_with_players(&store, &[1]).await.id;

        let joins: Vec<_> = (2..=12)
            .map(|user_id| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.insert_player(new_player(room_id, user_id), 8).await
                })
            })
            .collect();
        let mut inserted = 0;
        for join in joins {
            if let PlayerInsert::Inserted(_) = join.await.unwrap().unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 7);
        assert_eq!(store.list_players(room_id).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn team_change_is_validated_against_room_team_names() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1]).await;

        let invalid = store
            .update_player_team(room.id, 1, Some("Eagles".to_string()))
            .await
            .unwrap();
        assert_eq!(invalid, TeamChange::InvalidTeam);

        let missing = store
            .update_player_team(room.id, 99, Some("Owls".to_string()))
            .await
            .unwrap();
        assert_eq!(missing, TeamChange::PlayerNotFound);

        let TeamChange::Updated(player) = store
            .update_player_team(room.id, 1, Some("Owls".to_string()))
            .await
            .unwrap()
        else {
            panic!("expected team update");
        };
        assert_eq!(player.team.as_deref(), Some("Owls"));

        let TeamChange::Updated(cleared) = store
            .update_player_team(room.id, 1, Some(String::new()))
            .await
            .unwrap()
        else {
            panic!("expected team update");
        };
        assert_eq!(cleared.team, None);
    }

    #[tokio::test]
    async fn round_word_and_point_are_recorded_once() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1]).await;

        assert!(
            store
                .record_round_word(record(room.id, 5, 1, true), Some(1))
                .await
                .unwrap()
        );
        assert!(
            !store
                .record_round_word(record(room.id, 5, 1, false), Some(1))
                .await
                .unwrap()
        );

        let player = store.get_player(room.id, 1).await.unwrap().unwrap();
        assert_eq!(player.score, 1);
        let stats = store.round_stats(room.id).await.unwrap();
        assert_eq!(
            stats,
            vec![RoundStats {
                round_num: 1,
                words_guessed: 1,
                words_missed: 0
            }]
        );
    }

    #[tokio::test]
    async fn round_word_for_departed_scorer_is_still_recorded() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1]).await;

        assert!(
            store
                .record_round_word(record(room.id, 5, 1, true), Some(42))
                .await
                .unwrap()
        );
        assert_eq!(store.round_stats(room.id).await.unwrap().len(), 1);
        assert_eq!(store.get_player(room.id, 1).await.unwrap().unwrap().score, 0);
    }

    #[tokio::test]
    async fn round_stats_group_by_round_in_order() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1]).await;
        for (word_id, round_num, guessed) in [(1, 2, true), (2, 1, false), (3, 2, false), (4, 1, true)]
        {
            store
                .record_round_word(record(room.id, word_id, round_num, guessed), None)
                .await
                .unwrap();
        }

        let stats = store.round_stats(room.id).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!((stats[0].round_num, stats[0].words_guessed, stats[0].words_missed), (1, 1, 1));
        assert_eq!((stats[1].round_num, stats[1].words_guessed, stats[1].words_missed), (2, 1, 1));
        assert_eq!(store.get_player(room.id, 1).await.unwrap().unwrap().score, 0);
    }

    #[tokio::test]
    async fn room_progress_applies() {
        let store = InMemoryPersistence::new();
        let room = room_with_players(&store, &[1]).await;

        let deadline = Utc::now();
        store
            .update_room_progress(
                room.id,
                RoomProgress {
                    status: SessionStatus::Playing,
                    current_round: 2,
                    current_explainer_id: Some(1),
                    round_end_at: Some(deadline),
                },
            )
            .await
            .unwrap();
        let stored = store.get_room(room.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Playing);
        assert_eq!(stored.current_round, 2);
        assert_eq!(stored.current_explainer_id, Some(1));
        assert_eq!(stored.round_end_at, Some(deadline));
    }

    fn dynamo_room() -> Room {
        let at = DateTime::parse_from_rfc3339("2026-03-01T10:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        Room {
            id: Uuid::new_v4(),
            status: SessionStatus::Playing,
            current_round: 3,
            current_explainer_id: Some(7),
            round_end_at: Some(at),
            category: "animals".to_string(),
            num_teams: 2,
            team_names: vec!["Quiet Otters".to_string(), "Bold Hawks".to_string()],
            created_at: at,
        }
    }

    #[test]
    fn dynamo_room_item_keeps_team_order_and_optional_fields() {
        let room = dynamo_room();
        let item = room_to_item(&room);
        assert_eq!(
            item.get("sk").and_then(|v| v.as_s().ok()).map(String::as_str),
            Some(ROOM_SK)
        );
        assert_eq!(room_from_item(&item).unwrap(), room);

        let lobby = Room {
            status: SessionStatus::Lobby,
            current_round: 0,
            current_explainer_id: None,
            round_end_at: None,
            ..room
        };
        let item = room_to_item(&lobby);
        assert!(!item.contains_key("explainer_id"));
        assert!(!item.contains_key("round_end_at"));
        assert_eq!(room_from_item(&item).unwrap(), lobby);
    }

    #[test]
    fn dynamo_player_item_reads_back_with_team_and_score() {
        let room = dynamo_room();
        let player = Player {
            id: room.created_at.timestamp_micros(),
            room_id: room.id,
            user_id: 42,
            username: Some("otter".to_string()),
            first_name: None,
            team: Some("Quiet Otters".to_string()),
            score: 6,
            is_host: true,
            joined_at: room.created_at,
        };
        let mut item = player_to_item(&player);
        assert_eq!(
            item.get("sk").and_then(|v| v.as_s().ok()),
            Some(&"player#42".to_string())
        );
        assert_eq!(player_from_item(&item).unwrap(), player);

        item.remove("team_name");
        item.remove("player_score");
        let unassigned = player_from_item(&item).unwrap();
        assert_eq!(unassigned.team, None);
        assert_eq!(unassigned.score, 0);
    }

    #[test]
    fn dynamo_word_items_tally_by_round() {
        let room_id = Uuid::new_v4();
        let records = [
            record(room_id, 11, 2, true),
            record(room_id, 12, 1, false),
            record(room_id, 13, 2, true),
        ];
        let decoded = records
            .iter()
            .map(|record| round_record_from_item(room_id, &round_record_to_item(record)).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(decoded, records);
        assert_eq!(
            tally_rounds(&decoded),
            vec![
                RoundStats {
                    round_num: 1,
                    words_guessed: 0,
                    words_missed: 1
                },
                RoundStats {
                    round_num: 2,
                    words_guessed: 2,
                    words_missed: 0
                },
            ]
        );
    }

    #[test]
    fn dynamo_item_with_bad_status_is_an_error() {
        let mut item = room_to_item(&dynamo_room());
        item.insert("room_status".to_string(), AttributeValue::S("paused".to_string()));
        assert!(room_from_item(&item).is_err());
    }

    #[test]
    fn cancelled_transaction_reports_failed_conditions_in_order() {
        let reasons = [
            CancellationReason::builder().code("None").build(),
            CancellationReason::builder()
                .code(CONDITIONAL_CHECK_FAILED)
                .build(),
        ];
        assert_eq!(condition_failures(&reasons), vec![false, true]);
        assert!(condition_failures(&[]).is_empty());
    }
}
