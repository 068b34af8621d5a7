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

//! One task per live session. Every connect, disconnect, player action,
//! clock signal and broadcast for a session goes through its inbox and is
//! handled to completion before the next one, so the client set and the
//! game mirror need no locking.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use elias_common::{
    DEFAULT_CATEGORY, GameState, OutboundFrame, Room, RoundRecord, SessionId, SessionStatus,
    SwipeAction, UserId, WordState,
};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock::{ClockSignal, RoundClock},
    error::SessionError,
    persistence::RoomProgress,
    registry::{SessionDeps, SessionRegistry},
    rules,
};

/// Outbound side of one socket, as seen by the actor.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub connection_id: Uuid,
    pub user_id: UserId,
    sender: mpsc::Sender<Arc<str>>,
}

impl ClientHandle {
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                connection_id: Uuid::new_v4(),
                user_id,
                sender,
            },
            receiver,
        )
    }

    fn try_deliver(&self, frame: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.sender.try_send(frame)
    }
}

#[derive(Debug, Clone)]
pub struct StartGameOutcome {
    pub state: GameState,
    pub word_dealt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwipeOutcome {
    /// Not the explainer, or no word on the table.
    Ignored,
    Resolved {
        word: WordState,
        guessed: bool,
        round_quota_reached: bool,
    },
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub enum SessionEvent {
    Connect {
        client: ClientHandle,
        ack: Reply<()>,
    },
    Disconnect {
        user_id: UserId,
        connection_id: Uuid,
    },
    StartGame {
        reply: Reply<StartGameOutcome>,
    },
    Swipe {
        user_id: UserId,
        action: SwipeAction,
        reply: Option<Reply<SwipeOutcome>>,
    },
    /// Deliver locally and publish to other replicas.
    Broadcast(OutboundFrame),
    /// Already-encoded frame from another replica. Local delivery only.
    Relay(Arc<str>),
    Clock(ClockSignal),
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    actor_id: u64,
    sender: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn actor_id(&self) -> u64 {
        self.actor_id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionEvent,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    pub async fn connect(&self, client: ClientHandle) -> Result<(), SessionError> {
        self.request(|ack| SessionEvent::Connect { client, ack })
            .await
    }

    pub async fn disconnect(&self, user_id: UserId, connection_id: Uuid) {
        let _ = self
            .sender
            .send(SessionEvent::Disconnect {
                user_id,
                connection_id,
            })
            .await;
    }

    pub async fn start_game(&self) -> Result<StartGameOutcome, SessionError> {
        self.request(|reply| SessionEvent::StartGame { reply }).await
    }

    pub async fn swipe(
        &self,
        user_id: UserId,
        action: SwipeAction,
    ) -> Result<SwipeOutcome, SessionError> {
        self.request(|reply| SessionEvent::Swipe {
            user_id,
            action,
            reply: Some(reply),
        })
        .await
    }

    /// Socket path: the outcome reaches the player as broadcast frames.
    pub async fn submit_swipe(
        &self,
        user_id: UserId,
        action: SwipeAction,
    ) -> Result<(), SessionError> {
        self.sender
            .send(SessionEvent::Swipe {
                user_id,
                action,
                reply: None,
            })
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    pub async fn broadcast(&self, frame: OutboundFrame) -> Result<(), SessionError> {
        self.sender
            .send(SessionEvent::Broadcast(frame))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    pub async fn relay(&self, frame: Arc<str>) -> Result<(), SessionError> {
        self.sender
            .send(SessionEvent::Relay(frame))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }
}

pub struct SessionActor {
    session_id: SessionId,
    actor_id: u64,
    deps: SessionDeps,
    registry: SessionRegistry,
    clients: HashMap<UserId, ClientHandle>,
    room: Option<Room>,
    state: Option<GameState>,
    loaded: bool,
    clock: RoundClock,
}

impl SessionActor {
    pub fn spawn(
        session_id: SessionId,
        actor_id: u64,
        deps: SessionDeps,
        registry: SessionRegistry,
    ) -> SessionHandle {
        let (sender, inbox) = mpsc::channel(deps.inbox_capacity.max(1));
        let actor = Self {
            session_id,
            actor_id,
            clock: RoundClock::new(session_id, sender.clone()),
            deps,
            registry,
            clients: HashMap::new(),
            room: None,
            state: None,
            loaded: false,
        };
        tokio::spawn(actor.run(inbox));
        SessionHandle {
            session_id,
            actor_id,
            sender,
        }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<SessionEvent>) {
        info!(session_id = %self.session_id, actor_id = self.actor_id, "session actor started");
        while let Some(event) = inbox.recv().await {
            self.handle(event).await;
            if self.should_stop() {
                break;
            }
        }

        self.clock.stop();
        self.registry.remove(self.session_id, self.actor_id);
        inbox.close();
        // Pending replies are dropped here; their callers see SessionClosed.
        while inbox.try_recv().is_ok() {}
        info!(session_id = %self.session_id, actor_id = self.actor_id, "session actor stopped");
    }

    /// Nobody attached here means nothing to serve. A playing game left
    /// alone resumes from the state store on the next connect or swipe.
    fn should_stop(&self) -> bool {
        self.clients.is_empty()
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connect { client, ack } => {
                let result = self.connect(client).await;
                let _ = ack.send(result);
            }
            SessionEvent::Disconnect {
                user_id,
                connection_id,
            } => self.disconnect(user_id, connection_id),
            SessionEvent::StartGame { reply } => {
                let result = self.start_game().await;
                if let Err(error) = &result {
                    warn!(session_id = %self.session_id, %error, "start game refused");
                }
                let _ = reply.send(result);
            }
            SessionEvent::Swipe {
                user_id,
                action,
                reply,
            } => {
                let result = self.swipe(user_id, action).await;
                if let Err(error) = &result {
                    warn!(session_id = %self.session_id, user_id, %error, "swipe failed");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionEvent::Broadcast(frame) => self.broadcast(&frame),
            SessionEvent::Relay(frame) => self.deliver(&frame),
            SessionEvent::Clock(signal) => self.on_clock(signal).await,
        }
    }

    async fn connect(&mut self, client: ClientHandle) -> Result<(), SessionError> {
        self.ensure_loaded().await?;
        self.resume_round().await;

        let user_id = client.user_id;
        let connection_id = client.connection_id;
        if let Some(previous) = self.clients.insert(user_id, client) {
            debug!(
                session_id = %self.session_id,
                user_id,
                replaced = %previous.connection_id,
                "replacing previous connection"
            );
        }
        info!(
            session_id = %self.session_id,
            user_id,
            connection_id = %connection_id,
            clients = self.clients.len(),
            "client joined session"
        );
        self.resync(user_id);
        Ok(())
    }

    fn disconnect(&mut self, user_id: UserId, connection_id: Uuid) {
        let current = self
            .clients
            .get(&user_id)
            .is_some_and(|client| client.connection_id == connection_id);
        if !current {
            return;
        }
        self.clients.remove(&user_id);
        info!(
            session_id = %self.session_id,
            user_id,
            clients = self.clients.len(),
            "client left session"
        );
    }

    async fn ensure_loaded(&mut self) -> Result<(), SessionError> {
        if self.loaded {
            return Ok(());
        }
        let room = self.load_room().await?;

        let cached = match self.deps.store.get(self.session_id).await {
            Ok(cached) => cached,
            Err(error) => {
                warn!(session_id = %self.session_id, ?error, "failed to read session state");
                None
            }
        };
        let state = match cached {
            Some(state) => Some(state),
            None if room.status == SessionStatus::Playing => {
                let players = self.deps.persistence.list_players(self.session_id).await?;
                let recovered = rules::recover_state(&room, &players);
                if recovered.is_some() {
                    info!(session_id = %self.session_id, "recovered game state from room row");
                }
                recovered
            }
            None => None,
        };

        self.state = state;
        self.loaded = true;
        Ok(())
    }

    async fn load_room(&mut self) -> Result<Room, SessionError> {
        let room = self
            .deps
            .persistence
            .get_room(self.session_id)
            .await?
            .ok_or_else(|| SessionError::not_found(format!("session {} not found", self.session_id)))?;
        self.room = Some(room.clone());
        Ok(room)
    }

    /// Re-arms the clock after an actor restart and closes a round whose
    /// deadline passed while no actor was running. Retries dealing when the
    /// table is empty.
    async fn resume_round(&mut self) {
        let Some(state) = self.state.as_ref().filter(|state| state.is_playing()) else {
            return;
        };
        let needs_word = state.current_word.is_none();
        if !self.clock.is_running() {
            let left = (state.round_end_at - Utc::now()).num_milliseconds();
            if left <= 0 {
                self.end_round().await;
                return;
            }
            self.clock.start(Duration::from_millis(left.unsigned_abs()));
        }
        if needs_word {
            self.deal_word().await;
        }
    }

    fn resync(&mut self, user_id: UserId) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let mut frames = Vec::new();
        match state.status {
            SessionStatus::Playing => {
                frames.push(OutboundFrame::GameStarted {
                    explainer_id: state.current_explainer,
                    round_end_at: state.round_end_at.timestamp(),
                });
                if let Some(word) = &state.current_word {
                    frames.push(OutboundFrame::NewWord {
                        word_id: word.id,
                        word: word.word.clone(),
                    });
                }
                frames.push(OutboundFrame::ScoreUpdate {
                    team_scores: state.team_scores.clone(),
                });
                let seconds_left = state.seconds_left(Utc::now());
                if seconds_left > 0 {
                    frames.push(OutboundFrame::Timer {
                        seconds_left: seconds_left.unsigned_abs(),
                    });
                }
            }
            SessionStatus::Finished => {
                if let Some(winner) = rules::winner(
                    &state.team_scores,
                    self.deps.rules.winning_score,
                    self.team_order(),
                ) {
                    frames.push(OutboundFrame::GameEnd {
                        winner,
                        team_scores: state.team_scores.clone(),
                    });
                }
            }
            SessionStatus::Lobby => {}
        }
        for frame in frames {
            self.send_to(user_id, &frame);
        }
    }

    fn team_order(&self) -> &[String] {
        self.room
            .as_ref()
            .map(|room| room.team_names.as_slice())
            .unwrap_or_default()
    }

    async fn start_game(&mut self) -> Result<StartGameOutcome, SessionError> {
        self.ensure_loaded().await?;
        let room = self.load_room().await?;
        if self.state.is_some() {
            return Err(SessionError::conflict("game already started"));
        }
        let players = self.deps.persistence.list_players(self.session_id).await?;
        let state = rules::start_game(&room, &players, &self.deps.rules, Utc::now())?;

        self.deps.store.put(&state, self.deps.state_ttl).await?;
        info!(
            session_id = %self.session_id,
            explainer = state.current_explainer,
            players = players.len(),
            "game started"
        );
        let started = OutboundFrame::GameStarted {
            explainer_id: state.current_explainer,
            round_end_at: state.round_end_at.timestamp(),
        };
        self.state = Some(state);
        self.sync_room_progress().await;
        self.broadcast(&started);

        let word_dealt = self.deal_word().await;
        self.clock.start(self.deps.rules.round_duration);

        let state = self
            .state
            .clone()
            .ok_or_else(|| SessionError::conflict("game state missing after start"))?;
        Ok(StartGameOutcome { state, word_dealt })
    }

    /// Puts a fresh word on the table. The mirror only changes once the
    /// lexicon has produced one.
    async fn deal_word(&mut self) -> bool {
        if !self.state.as_ref().is_some_and(GameState::is_playing) {
            return false;
        }
        let category = self
            .room
            .as_ref()
            .map(|room| room.category.clone())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let word = match self
            .deps
            .lexicon
            .random_unseen_word(self.session_id, &self.deps.rules.language, &category)
            .await
        {
            Ok(Some(word)) => word,
            Ok(None) => {
                warn!(session_id = %self.session_id, category = %category, "no unseen words left");
                return false;
            }
            Err(error) => {
                warn!(session_id = %self.session_id, ?error, "failed to deal word");
                return false;
            }
        };

        let Some(state) = self.state.as_mut() else {
            return false;
        };
        state.current_word = Some(WordState::from(&word));
        debug!(session_id = %self.session_id, word_id = word.id, "word dealt");
        self.persist().await;
        self.broadcast(&OutboundFrame::NewWord {
            word_id: word.id,
            word: word.word,
        });
        true
    }

    async fn swipe(
        &mut self,
        user_id: UserId,
        action: SwipeAction,
    ) -> Result<SwipeOutcome, SessionError> {
        self.ensure_loaded().await?;
        self.resume_round().await;
        let Some(state) = self.state.as_ref() else {
            return Ok(SwipeOutcome::Ignored);
        };
        if !rules::swipe_applies(state, user_id) {
            debug!(session_id = %self.session_id, user_id, "swipe ignored");
            return Ok(SwipeOutcome::Ignored);
        }
        let Some(word) = state.current_word.clone() else {
            return Ok(SwipeOutcome::Ignored);
        };
        let guessed = action.guessed();

        // Record and point are one write; a retried swipe adds nothing.
        let inserted = self
            .deps
            .persistence
            .record_round_word(
                RoundRecord {
                    room_id: self.session_id,
                    word_id: word.id,
                    round_num: state.current_round,
                    guessed,
                },
                guessed.then_some(user_id),
            )
            .await?;
        if !inserted {
            debug!(session_id = %self.session_id, word_id = word.id, "word already recorded");
        }
        let team = if guessed {
            self.deps
                .persistence
                .get_player(self.session_id, user_id)
                .await?
                .and_then(|player| player.assigned_team().map(str::to_string))
        } else {
            None
        };

        let Some(state) = self.state.as_mut() else {
            return Ok(SwipeOutcome::Ignored);
        };
        rules::resolve_word(state, team.as_deref(), guessed);
        let round_quota_reached = state.words_this_round >= self.deps.rules.max_words_per_round;
        let team_scores = state.team_scores.clone();
        info!(
            session_id = %self.session_id,
            user_id,
            word_id = word.id,
            action = action.as_str(),
            team = team.as_deref().unwrap_or("none"),
            "word resolved"
        );

        self.persist().await;
        self.broadcast(&OutboundFrame::WordResult {
            word_id: word.id,
            word: word.word.clone(),
            guessed,
        });
        self.broadcast(&OutboundFrame::ScoreUpdate { team_scores });
        self.deal_word().await;

        Ok(SwipeOutcome::Resolved {
            word,
            guessed,
            round_quota_reached,
        })
    }

    async fn on_clock(&mut self, signal: ClockSignal) {
        if !self.clock.accepts(signal) {
            debug!(session_id = %self.session_id, ?signal, "stale clock signal dropped");
            return;
        }
        match signal {
            ClockSignal::Tick { seconds_left, .. } => {
                self.broadcast(&OutboundFrame::Timer { seconds_left });
            }
            ClockSignal::Expired { .. } => {
                self.clock.stop();
                self.end_round().await;
            }
        }
    }

    async fn end_round(&mut self) {
        self.clock.stop();
        let Some(state) = self.state.as_ref().filter(|state| state.is_playing()) else {
            return;
        };

        if let Some(winner) = rules::winner(
            &state.team_scores,
            self.deps.rules.winning_score,
            self.team_order(),
        ) {
            let Some(state) = self.state.as_mut() else {
                return;
            };
            state.status = SessionStatus::Finished;
            state.current_word = None;
            let team_scores = state.team_scores.clone();
            info!(session_id = %self.session_id, winner = %winner, "game finished");
            self.persist().await;
            self.sync_room_progress().await;
            self.deps.lexicon.forget(self.session_id).await;
            self.broadcast(&OutboundFrame::GameEnd {
                winner,
                team_scores,
            });
            return;
        }

        let players = match self.deps.persistence.list_players(self.session_id).await {
            Ok(players) => players,
            Err(error) => {
                warn!(session_id = %self.session_id, ?error, "failed to list players, keeping explainer");
                Vec::new()
            }
        };
        let round_duration = self.deps.rules.round_duration;
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let ended = rules::advance_round(state, &players, Utc::now(), round_duration);
        let frame = OutboundFrame::RoundEnd {
            round: ended,
            team_scores: state.team_scores.clone(),
            next_explainer: state.current_explainer,
        };
        info!(
            session_id = %self.session_id,
            round = ended,
            next_explainer = state.current_explainer,
            "round ended"
        );

        self.persist().await;
        self.sync_room_progress().await;
        self.broadcast(&frame);
        self.deal_word().await;
        self.clock.start(round_duration);
    }

    /// Mid-game writes are best effort; the mirror stays authoritative.
    async fn persist(&self) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        if let Err(error) = self.deps.store.put(state, self.deps.state_ttl).await {
            warn!(session_id = %self.session_id, ?error, "failed to write session state");
        }
    }

    async fn sync_room_progress(&mut self) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let progress = RoomProgress {
            status: state.status,
            current_round: state.current_round,
            current_explainer_id: Some(state.current_explainer),
            round_end_at: Some(state.round_end_at),
        };
        if let Some(room) = self.room.as_mut() {
            room.status = progress.status;
            room.current_round = progress.current_round;
            room.current_explainer_id = progress.current_explainer_id;
            room.round_end_at = progress.round_end_at;
        }
        if let Err(error) = self
            .deps
            .persistence
            .update_room_progress(self.session_id, progress)
            .await
        {
            warn!(session_id = %self.session_id, ?error, "failed to update room progress");
        }
    }

    fn broadcast(&mut self, frame: &OutboundFrame) {
        let encoded: Arc<str> = match frame.encode() {
            Ok(encoded) => encoded.into(),
            Err(error) => {
                warn!(session_id = %self.session_id, kind = frame.kind(), ?error, "failed to encode frame");
                return;
            }
        };
        debug!(
            session_id = %self.session_id,
            kind = frame.kind(),
            clients = self.clients.len(),
            "broadcasting frame"
        );
        self.deliver(&encoded);
        if let Some(fanout) = &self.deps.fanout {
            fanout.publish(self.session_id, encoded);
        }
    }

    /// Full or closed client queues are evicted rather than waited on.
    fn deliver(&mut self, frame: &Arc<str>) {
        if self.clients.is_empty() {
            return;
        }
        let session_id = self.session_id;
        self.clients
            .retain(|user_id, client| match client.try_deliver(frame.clone()) {
                Ok(()) => true,
                Err(error) => {
                    let reason = match error {
                        TrySendError::Full(_) => "full",
                        TrySendError::Closed(_) => "closed",
                    };
                    warn!(session_id = %session_id, user_id = *user_id, reason, "evicting client");
                    false
                }
            });
    }

    fn send_to(&mut self, user_id: UserId, frame: &OutboundFrame) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };
        let encoded: Arc<str> = match frame.encode() {
            Ok(encoded) => encoded.into(),
            Err(error) => {
                warn!(session_id = %self.session_id, kind = frame.kind(), ?error, "failed to encode frame");
                return;
            }
        };
        if client.try_deliver(encoded).is_err() {
            warn!(session_id = %self.session_id, user_id, "evicting client during resync");
            self.clients.remove(&user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::TimeDelta;
    use elias_common::{Player, RoundStats, UserProfile, Word};
    use serde_json::Value;

    use crate::{
        config::GameRules,
        fanout::SessionFanout,
        lexicon::{InMemoryLexicon, Lexicon},
        persistence::{
            InMemoryPersistence, NewPlayer, NewRoom, Persistence, PlayerInsert, TeamChange,
        },
        store::{InMemorySessionStateStore, SessionStateStore},
    };

    struct FailingLexicon;

    #[async_trait]
    impl Lexicon for FailingLexicon {
        async fn random_unseen_word(
            &self,
            _session_id: SessionId,
            _language: &str,
            _category: &str,
        ) -> anyhow::Result<Option<Word>> {
            anyhow::bail!("lexicon offline")
        }
    }

    struct FailingStore;

    #[async_trait]
    impl SessionStateStore for FailingStore {
        async fn get(&self, _session_id: SessionId) -> anyhow::Result<Option<GameState>> {
            Ok(None)
        }

        async fn put(&self, _state: &GameState, _ttl: Duration) -> anyhow::Result<()> {
            anyhow::bail!("store offline")
        }
    }

    /// Number of upcoming calls to fail, per operation.
    #[derive(Default)]
    struct Faults {
        record_round_word: AtomicUsize,
        get_player: AtomicUsize,
    }

    fn take_fault(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    struct FlakyPersistence {
        inner: Arc<InMemoryPersistence>,
        faults: Arc<Faults>,
    }

    #[async_trait]
    impl Persistence for FlakyPersistence {
        async fn create_room(&self, room: NewRoom) -> anyhow::Result<Room> {
            self.inner.create_room(room).await
        }

        async fn get_room(&self, room_id: SessionId) -> anyhow::Result<Option<Room>> {
            self.inner.get_room(room_id).await
        }

        async fn list_players(&self, room_id: SessionId) -> anyhow::Result<Vec<Player>> {
            self.inner.list_players(room_id).await
        }

        async fn get_player(
            &self,
            room_id: SessionId,
            user_id: UserId,
        ) -> anyhow::Result<Option<Player>> {
            if take_fault(&self.faults.get_player) {
                anyhow::bail!("player lookup timed out");
            }
            self.inner.get_player(room_id, user_id).await
        }

        async fn insert_player(
            &self,
            player: NewPlayer,
            capacity: usize,
        ) -> anyhow::Result<PlayerInsert> {
            self.inner.insert_player(player, capacity).await
        }

        async fn update_player_team(
            &self,
            room_id: SessionId,
            user_id: UserId,
            team: Option<String>,
        ) -> anyhow::Result<TeamChange> {
            self.inner.update_player_team(room_id, user_id, team).await
        }

        async fn update_room_progress(
            &self,
            room_id: SessionId,
            progress: RoomProgress,
        ) -> anyhow::Result<()> {
            self.inner.update_room_progress(room_id, progress).await
        }

        async fn record_round_word(
            &self,
            record: RoundRecord,
            scorer: Option<UserId>,
        ) -> anyhow::Result<bool> {
            if take_fault(&self.faults.record_round_word) {
                anyhow::bail!("round word write timed out");
            }
            self.inner.record_round_word(record, scorer).await
        }

        async fn round_stats(&self, room_id: SessionId) -> anyhow::Result<Vec<RoundStats>> {
            self.inner.round_stats(room_id).await
        }
    }

    #[derive(Default)]
    struct RecordingFanout {
        published: Mutex<Vec<(SessionId, String)>>,
    }

    impl SessionFanout for RecordingFanout {
        fn publish(&self, session_id: SessionId, frame: Arc<str>) {
            self.published
                .lock()
                .unwrap()
                .push((session_id, frame.to_string()));
        }
    }

    struct TestSession {
        registry: SessionRegistry,
        persistence: Arc<InMemoryPersistence>,
        store: Arc<dyn SessionStateStore>,
        room_id: SessionId,
    }

    impl TestSession {
        async fn state(&self) -> GameState {
            self.store.get(self.room_id).await.unwrap().unwrap()
        }

        /// Returns the connection id and the client's outbound queue.
        async fn connect(&self, user_id: UserId) -> (Uuid, mpsc::Receiver<Arc<str>>) {
            let (client, rx) = ClientHandle::new(user_id, 64);
            let connection_id = client.connection_id;
            self.registry.connect(self.room_id, client).await.unwrap();
            (connection_id, rx)
        }
    }

    fn words() -> Vec<Word> {
        (1..=10)
            .map(|id| Word {
                id,
                word: format!("word-{id}"),
                lang: "en".to_string(),
                category: "general".to_string(),
            })
            .collect()
    }

    fn round_rules(round_seconds: u64) -> GameRules {
        GameRules {
            round_duration: Duration::from_secs(round_seconds),
            ..GameRules::default()
        }
    }

    async fn session(
        rules: GameRules,
        lexicon: Arc<dyn Lexicon>,
        store: Arc<dyn SessionStateStore>,
        fanout: Option<Arc<dyn SessionFanout>>,
    ) -> TestSession {
        session_with_persistence(rules, lexicon, store, fanout, |persistence| {
            persistence as Arc<dyn Persistence>
        })
        .await
    }

    /// Host 1 without a team, 2 on Foxes, 3 on Owls. The actor sees the
    /// room through `wrap`.
    async fn session_with_persistence(
        rules: GameRules,
        lexicon: Arc<dyn Lexicon>,
        store: Arc<dyn SessionStateStore>,
        fanout: Option<Arc<dyn SessionFanout>>,
        wrap: impl FnOnce(Arc<InMemoryPersistence>) -> Arc<dyn Persistence>,
    ) -> TestSession {
        let persistence = Arc::new(InMemoryPersistence::new());
        let room = persistence
            .create_room(NewRoom {
                category: "general".to_string(),
                num_teams: 2,
                team_names: vec!["Foxes".to_string(), "Owls".to_string()],
            })
            .await
            .unwrap();
        for (user_id, team) in [(1, None), (2, Some("Foxes")), (3, Some("Owls"))] {
            persistence
                .insert_player(
                    NewPlayer {
                        room_id: room.id,
                        profile: UserProfile {
                            user_id,
                            username: None,
                            first_name: Some(format!("player-{user_id}")),
                        },
                        is_host: user_id == 1,
                    },
                    8,
                )
                .await
                .unwrap();
            if let Some(team) = team {
                persistence
                    .update_player_team(room.id, user_id, Some(team.to_string()))
                    .await
                    .unwrap();
            }
        }

        let registry = SessionRegistry::new(SessionDeps {
            store: store.clone(),
            persistence: wrap(persistence.clone()),
            lexicon,
            fanout,
            rules,
            state_ttl: Duration::from_secs(3600),
            inbox_capacity: 64,
        });
        TestSession {
            registry,
            persistence,
            store,
            room_id: room.id,
        }
    }

    async fn default_session(round_seconds: u64) -> TestSession {
        session(
            round_rules(round_seconds),
            Arc::new(InMemoryLexicon::new(words())),
            Arc::new(InMemorySessionStateStore::new()),
            None,
        )
        .await
    }

    fn drain_all(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    /// Queued frames minus clock ticks, which depend on wall time here.
    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<Value> {
        drain_all(rx)
            .into_iter()
            .filter(|frame| frame["type"] != "timer")
            .collect()
    }

    fn kinds(frames: &[Value]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|frame| frame["type"].as_str())
            .filter(|kind| *kind != "timer")
            .map(str::to_string)
            .collect()
    }

    async fn next_of_kind(rx: &mut mpsc::Receiver<Arc<str>>, kind: &str) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(300), rx.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("client channel closed");
            let value: Value = serde_json::from_str(&frame).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    }

    #[tokio::test]
    async fn start_then_explainer_swipe_scores_and_deals_next_word() {
        let session = default_session(60).await;
        let (_host, mut host_rx) = session.connect(1).await;
        let (_owl, mut owl_rx) = session.connect(3).await;

        let outcome = session.registry.start_game(session.room_id).await.unwrap();
        assert_eq!(outcome.state.current_explainer, 2);
        assert_eq!(outcome.state.current_round, 1);
        assert!(outcome.word_dealt);
        let first_word = outcome.state.current_word.clone().unwrap();

        let frames = drain(&mut host_rx);
        assert_eq!(kinds(&frames), vec!["game_started", "new_word"]);
        assert_eq!(frames[0]["payload"]["explainer_id"], 2);
        assert_eq!(frames[1]["payload"]["word_id"], first_word.id);
        drain(&mut owl_rx);

        let result = session
            .registry
            .swipe(session.room_id, 2, SwipeAction::Up)
            .await
            .unwrap();
        assert_eq!(
            result,
            SwipeOutcome::Resolved {
                word: first_word.clone(),
                guessed: true,
                round_quota_reached: false,
            }
        );

        let player = session
            .persistence
            .get_player(session.room_id, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(player.score, 1);

        let state = session.state().await;
        assert_eq!(state.team_scores["Foxes"], 1);
        assert_eq!(state.team_scores["Owls"], 0);
        assert_eq!(state.words_this_round, 1);
        let second_word = state.current_word.unwrap();
        assert_ne!(second_word.id, first_word.id);

        let frames = drain(&mut owl_rx);
        assert_eq!(kinds(&frames), vec!["word_result", "score_update", "new_word"]);
        assert_eq!(frames[0]["payload"]["guessed"], true);
        assert_eq!(frames[1]["payload"]["team_scores"]["Foxes"], 1);
        assert_eq!(frames[2]["payload"]["word_id"], second_word.id);

        let rounds = session.persistence.round_stats(session.room_id).await.unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].words_guessed, 1);
    }

    #[tokio::test]
    async fn swipe_from_anyone_but_explainer_is_silent() {
        let session = default_session(60).await;
        let (_host, mut host_rx) = session.connect(1).await;
        session.registry.start_game(session.room_id).await.unwrap();
        drain(&mut host_rx);

        for user_id in [1, 3, 42] {
            let result = session
                .registry
                .swipe(session.room_id, user_id, SwipeAction::Up)
                .await
                .unwrap();
            assert_eq!(result, SwipeOutcome::Ignored);
        }

        assert!(kinds(&drain(&mut host_rx)).is_empty());
        let state = session.state().await;
        assert_eq!(state.words_this_round, 0);
        assert!(state.current_word.is_some());
        assert_eq!(state.team_scores["Foxes"], 0);
    }

    #[tokio::test]
    async fn skipped_word_counts_without_scoring() {
        let session = default_session(60).await;
        session.registry.start_game(session.room_id).await.unwrap();

        let result = session
            .registry
            .swipe(session.room_id, 2, SwipeAction::Down)
            .await
            .unwrap();
        assert!(matches!(
            result,
            SwipeOutcome::Resolved { guessed: false, .. }
        ));

        let state = session.state().await;
        assert_eq!(state.words_this_round, 1);
        assert_eq!(state.team_scores["Foxes"], 0);
        let rounds = session.persistence.round_stats(session.room_id).await.unwrap();
        assert_eq!(rounds[0].words_missed, 1);
    }

    #[tokio::test]
    async fn swipe_retried_after_storage_failures_scores_once() {
        let faults = Arc::new(Faults::default());
        let session = session_with_persistence(
            round_rules(60),
            Arc::new(InMemoryLexicon::new(words())),
            Arc::new(InMemorySessionStateStore::new()),
            None,
            {
                let faults = faults.clone();
                move |inner| Arc::new(FlakyPersistence { inner, faults }) as Arc<dyn Persistence>
            },
        )
        .await;
        let (_host, mut host_rx) = session.connect(1).await;
        let outcome = session.registry.start_game(session.room_id).await.unwrap();
        let word = outcome.state.current_word.unwrap();
        drain(&mut host_rx);

        faults.record_round_word.store(1, Ordering::SeqCst);
        faults.get_player.store(1, Ordering::SeqCst);
        for _ in 0..2 {
            let failed = session
                .registry
                .swipe(session.room_id, 2, SwipeAction::Up)
                .await;
            assert!(matches!(failed, Err(SessionError::Collaborator(_))));
            assert_eq!(session.state().await.words_this_round, 0);
        }
        assert!(drain(&mut host_rx).is_empty());

        let retried = session
            .registry
            .swipe(session.room_id, 2, SwipeAction::Up)
            .await
            .unwrap();
        assert_eq!(
            retried,
            SwipeOutcome::Resolved {
                word,
                guessed: true,
                round_quota_reached: false,
            }
        );

        let player = session
            .persistence
            .get_player(session.room_id, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(player.score, 1);
        let state = session.state().await;
        assert_eq!(state.team_scores["Foxes"], 1);
        assert_eq!(state.words_this_round, 1);
        assert_eq!(
            kinds(&drain(&mut host_rx)),
            vec!["word_result", "score_update", "new_word"]
        );
        let rounds = session.persistence.round_stats(session.room_id).await.unwrap();
        assert_eq!((rounds[0].words_guessed, rounds[0].words_missed), (1, 0));
    }

    #[tokio::test]
    async fn soft_word_cap_is_reported_but_round_continues() {
        let session = session(
            GameRules {
                max_words_per_round: 2,
                ..round_rules(60)
            },
            Arc::new(InMemoryLexicon::new(words())),
            Arc::new(InMemorySessionStateStore::new()),
            None,
        )
        .await;
        session.registry.start_game(session.room_id).await.unwrap();

        let mut reached = Vec::new();
        for _ in 0..3 {
            match session
                .registry
                .swipe(session.room_id, 2, SwipeAction::Up)
                .await
                .unwrap()
            {
                SwipeOutcome::Resolved {
                    round_quota_reached,
                    ..
                } => reached.push(round_quota_reached),
                SwipeOutcome::Ignored => panic!("swipe should apply"),
            }
        }
        assert_eq!(reached, vec![false, true, true]);

        let state = session.state().await;
        assert_eq!(state.current_round, 1);
        assert!(state.current_word.is_some());
    }

    #[tokio::test]
    async fn starting_twice_is_a_conflict() {
        let session = default_session(60).await;
        session.registry.start_game(session.room_id).await.unwrap();
        let second = session.registry.start_game(session.room_id).await;
        assert!(matches!(second, Err(SessionError::Conflict(_))));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let session = default_session(60).await;
        let missing = Uuid::new_v4();
        let (client, _rx) = ClientHandle::new(1, 8);

        assert!(matches!(
            session.registry.connect(missing, client).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            session.registry.start_game(missing).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lexicon_failure_leaves_game_playing_without_word() {
        let session = session(
            round_rules(60),
            Arc::new(FailingLexicon),
            Arc::new(InMemorySessionStateStore::new()),
            None,
        )
        .await;
        let (_host, mut host_rx) = session.connect(1).await;

        let outcome = session.registry.start_game(session.room_id).await.unwrap();
        assert!(!outcome.word_dealt);
        assert!(outcome.state.is_playing());
        assert_eq!(outcome.state.current_word, None);
        assert_eq!(kinds(&drain(&mut host_rx)), vec!["game_started"]);

        let result = session
            .registry
            .swipe(session.room_id, 2, SwipeAction::Up)
            .await
            .unwrap();
        assert_eq!(result, SwipeOutcome::Ignored);
        assert_eq!(session.state().await.words_this_round, 0);
    }

    #[tokio::test]
    async fn failed_first_state_write_aborts_start() {
        let session = session(
            round_rules(60),
            Arc::new(InMemoryLexicon::new(words())),
            Arc::new(FailingStore),
            None,
        )
        .await;
        let (_host, mut host_rx) = session.connect(1).await;

        let result = session.registry.start_game(session.room_id).await;
        assert!(matches!(result, Err(SessionError::Collaborator(_))));
        assert!(drain(&mut host_rx).is_empty());

        let room = session
            .persistence
            .get_room(session.room_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room.status, SessionStatus::Lobby);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_expiry_rotates_explainer_and_restarts_round() {
        let session = default_session(3).await;
        let (_host, mut host_rx) = session.connect(1).await;
        let outcome = session.registry.start_game(session.room_id).await.unwrap();
        let first_word = outcome.state.current_word.unwrap();

        let timer = next_of_kind(&mut host_rx, "timer").await;
        assert_eq!(timer["payload"]["seconds_left"], 2);

        let round_end = next_of_kind(&mut host_rx, "round_end").await;
        assert_eq!(round_end["payload"]["round"], 1);
        assert_eq!(round_end["payload"]["next_explainer"], 3);

        let new_word = next_of_kind(&mut host_rx, "new_word").await;
        assert_ne!(new_word["payload"]["word_id"], first_word.id);

        let timer = next_of_kind(&mut host_rx, "timer").await;
        assert_eq!(timer["payload"]["seconds_left"], 2);

        let state = session.state().await;
        assert_eq!(state.current_round, 2);
        assert_eq!(state.current_explainer, 3);
        assert_eq!(state.words_this_round, 0);

        let room = session
            .persistence
            .get_room(session.room_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room.current_round, 2);
        assert_eq!(room.current_explainer_id, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_threshold_finishes_game_at_expiry() {
        let session = default_session(3).await;
        session
            .persistence
            .set_player_score(session.room_id, 2, 19)
            .await;
        let (_host, mut host_rx) = session.connect(1).await;

        let outcome = session.registry.start_game(session.room_id).await.unwrap();
        assert_eq!(outcome.state.team_scores["Foxes"], 19);
        session
            .registry
            .swipe(session.room_id, 2, SwipeAction::Up)
            .await
            .unwrap();

        let game_end = next_of_kind(&mut host_rx, "game_end").await;
        assert_eq!(game_end["payload"]["winner"], "Foxes");
        assert_eq!(game_end["payload"]["team_scores"]["Foxes"], 20);

        let after = tokio::time::timeout(Duration::from_secs(30), host_rx.recv()).await;
        assert!(after.is_err(), "no frames expected after game end");

        let state = session.state().await;
        assert_eq!(state.status, SessionStatus::Finished);
        assert_eq!(state.current_word, None);
        let room = session
            .persistence
            .get_room(session.room_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room.status, SessionStatus::Finished);
    }

    #[tokio::test]
    async fn reconnect_mid_round_resyncs_without_touching_state() {
        let session = default_session(60).await;
        let (_host, _host_rx) = session.connect(1).await;
        let (explainer, _explainer_rx) = session.connect(2).await;
        session.registry.start_game(session.room_id).await.unwrap();
        session
            .registry
            .swipe(session.room_id, 2, SwipeAction::Up)
            .await
            .unwrap();
        let before = session.state().await;

        let handle = session.registry.get(session.room_id).unwrap();
        handle.disconnect(2, explainer).await;
        let (_again, mut again_rx) = session.connect(2).await;

        let frames = drain_all(&mut again_rx);
        let frame_kinds: Vec<&str> = frames
            .iter()
            .filter_map(|frame| frame["type"].as_str())
            .collect();
        assert_eq!(
            frame_kinds,
            vec!["game_started", "new_word", "score_update", "timer"]
        );
        assert_eq!(frames[0]["payload"]["explainer_id"], 2);
        assert_eq!(
            frames[1]["payload"]["word_id"],
            before.current_word.as_ref().unwrap().id
        );
        assert_eq!(frames[2]["payload"]["team_scores"]["Foxes"], 1);
        let seconds_left = frames[3]["payload"]["seconds_left"].as_u64().unwrap();
        assert!((1..=60).contains(&seconds_left));

        assert_eq!(session.state().await, before);
    }

    #[tokio::test]
    async fn last_disconnect_tears_down_and_reconnect_recovers() {
        let session = default_session(60).await;
        let (host, _host_rx) = session.connect(1).await;
        session.registry.start_game(session.room_id).await.unwrap();
        let before = session.state().await;

        let handle = session.registry.get(session.room_id).unwrap();
        handle.disconnect(1, host).await;
        for _ in 0..100 {
            if session.registry.get(session.room_id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.registry.is_empty());

        let (_again, mut again_rx) = session.connect(1).await;
        let frames = drain(&mut again_rx);
        assert_eq!(
            kinds(&frames),
            vec!["game_started", "new_word", "score_update"]
        );
        let reborn = session.registry.get(session.room_id).unwrap();
        assert_ne!(reborn.actor_id(), handle.actor_id());
        assert_eq!(session.state().await, before);
    }

    async fn wait_for_teardown(registry: &SessionRegistry) {
        for _ in 0..100 {
            if registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn game_started_without_clients_releases_its_actor() {
        let session = default_session(60).await;
        let outcome = session.registry.start_game(session.room_id).await.unwrap();
        wait_for_teardown(&session.registry).await;
        assert!(session.registry.is_empty());

        let state = session.state().await;
        assert!(state.is_playing());
        assert_eq!(state.current_round, 1);
        assert_eq!(state.current_word, outcome.state.current_word);

        let (_host, mut host_rx) = session.connect(1).await;
        let frames = drain(&mut host_rx);
        assert_eq!(
            kinds(&frames),
            vec!["game_started", "new_word", "score_update"]
        );
        assert_eq!(session.state().await, state);
    }

    #[tokio::test]
    async fn overdue_round_is_closed_when_a_client_returns() {
        let session = default_session(60).await;
        session.registry.start_game(session.room_id).await.unwrap();
        wait_for_teardown(&session.registry).await;

        let mut state = session.state().await;
        state.round_end_at = Utc::now() - TimeDelta::seconds(5);
        session
            .store
            .put(&state, Duration::from_secs(3600))
            .await
            .unwrap();

        let (_host, mut host_rx) = session.connect(1).await;
        let frames = drain(&mut host_rx);
        assert_eq!(
            kinds(&frames),
            vec!["game_started", "new_word", "score_update"]
        );
        assert_eq!(frames[0]["payload"]["explainer_id"], 3);

        let resumed = session.state().await;
        assert_eq!(resumed.current_round, 2);
        assert_eq!(resumed.current_explainer, 3);
        assert!(resumed.round_end_at > Utc::now());
    }

    #[tokio::test]
    async fn connected_set_follows_latest_event_per_player() {
        let session = default_session(60).await;
        let (first_one, mut first_one_rx) = session.connect(1).await;
        let (two, mut two_rx) = session.connect(2).await;
        let handle = session.registry.get(session.room_id).unwrap();

        handle.disconnect(1, first_one).await;
        let (_three, mut three_rx) = session.connect(3).await;
        let (_one, mut one_rx) = session.connect(1).await;
        // Stale id from the first connection of player 1.
        handle.disconnect(1, first_one).await;
        handle.disconnect(2, two).await;

        session
            .registry
            .broadcast(
                session.room_id,
                OutboundFrame::TeamChanged {
                    user_id: 3,
                    team: "Owls".to_string(),
                },
            )
            .await;
        // Any request/reply round trip orders after the broadcast.
        session
            .registry
            .swipe(session.room_id, 99, SwipeAction::Up)
            .await
            .unwrap();

        assert_eq!(kinds(&drain(&mut one_rx)), vec!["team_changed"]);
        assert_eq!(kinds(&drain(&mut three_rx)), vec!["team_changed"]);
        assert!(drain(&mut two_rx).is_empty());
        assert!(drain(&mut first_one_rx).is_empty());
        assert!(two_rx.recv().await.is_none());
        assert!(first_one_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_client_queue_is_evicted_without_stalling_others() {
        let session = default_session(60).await;
        let (slow, mut slow_rx) = ClientHandle::new(1, 1);
        session
            .registry
            .connect(session.room_id, slow)
            .await
            .unwrap();
        let (_fast, mut fast_rx) = session.connect(2).await;

        session.registry.start_game(session.room_id).await.unwrap();

        assert_eq!(kinds(&drain(&mut fast_rx)), vec!["game_started", "new_word"]);
        let first = slow_rx.recv().await.unwrap();
        assert!(first.contains("game_started"));
        assert!(slow_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn broadcasts_are_published_but_relays_are_not() {
        let fanout = Arc::new(RecordingFanout::default());
        let session = session(
            round_rules(60),
            Arc::new(InMemoryLexicon::new(words())),
            Arc::new(InMemorySessionStateStore::new()),
            Some(fanout.clone()),
        )
        .await;
        let (_host, mut host_rx) = session.connect(1).await;

        session.registry.start_game(session.room_id).await.unwrap();
        let relayed: Arc<str> = Arc::from(r#"{"type":"timer","payload":{"seconds_left":5}}"#);
        assert!(session.registry.relay(session.room_id, relayed).await);
        session
            .registry
            .swipe(session.room_id, 99, SwipeAction::Up)
            .await
            .unwrap();

        let frames = drain(&mut host_rx);
        assert!(frames.iter().any(|frame| frame["payload"]["seconds_left"] == 5));

        let published = fanout.published.lock().unwrap();
        let published_kinds: Vec<String> = published
            .iter()
            .map(|(session_id, frame)| {
                assert_eq!(*session_id, session.room_id);
                let value: Value = serde_json::from_str(frame).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .filter(|kind| kind != "timer")
            .collect();
        assert_eq!(published_kinds, vec!["game_started", "new_word"]);
        assert!(
            !published
                .iter()
                .any(|(_, frame)| frame.contains(r#""seconds_left":5"#))
        );
    }

    #[tokio::test]
    async fn lobby_broadcast_without_local_actor_goes_to_fanout() {
        let fanout = Arc::new(RecordingFanout::default());
        let session = session(
            round_rules(60),
            Arc::new(InMemoryLexicon::new(words())),
            Arc::new(InMemorySessionStateStore::new()),
            Some(fanout.clone()),
        )
        .await;

        session
            .registry
            .broadcast(
                session.room_id,
                OutboundFrame::TeamChanged {
                    user_id: 2,
                    team: "Foxes".to_string(),
                },
            )
            .await;
        assert!(session.registry.is_empty());
        let published = fanout.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(published[0].1.contains("team_changed"));
    }
}
