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
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use elias_common::{OutboundFrame, SessionId, SwipeAction, UserId};
use tracing::{debug, warn};

use crate::{
    actor::{ClientHandle, SessionActor, SessionHandle, StartGameOutcome, SwipeOutcome},
    config::GameRules,
    error::SessionError,
    fanout::SessionFanout,
    lexicon::Lexicon,
    persistence::Persistence,
    store::SessionStateStore,
};

/// A request can land on an actor that is shutting down; it is retried on a
/// fresh one this many times.
const DELIVERY_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn SessionStateStore>,
    pub persistence: Arc<dyn Persistence>,
    pub lexicon: Arc<dyn Lexicon>,
    pub fanout: Option<Arc<dyn SessionFanout>>,
    pub rules: GameRules,
    pub state_ttl: Duration,
    pub inbox_capacity: usize,
}

struct RegistryInner {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    deps: SessionDeps,
    next_actor_id: AtomicU64,
}

/// Process-wide map of live session actors. The lock only guards the map.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                deps,
                next_actor_id: AtomicU64::new(1),
            }),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_create(&self, session_id: SessionId) -> SessionHandle {
        let mut sessions = self.sessions();
        if let Some(handle) = sessions.get(&session_id)
            && !handle.is_closed()
        {
            return handle.clone();
        }
        let actor_id = self.inner.next_actor_id.fetch_add(1, Ordering::Relaxed);
        let handle = SessionActor::spawn(session_id, actor_id, self.inner.deps.clone(), self.clone());
        sessions.insert(session_id, handle.clone());
        debug!(session_id = %session_id, actor_id, live_sessions = sessions.len(), "session actor registered");
        handle
    }

    pub fn get(&self, session_id: SessionId) -> Option<SessionHandle> {
        self.sessions()
            .get(&session_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Called by an actor on its way out. A newer actor registered under
    /// the same id is left alone.
    pub fn remove(&self, session_id: SessionId, actor_id: u64) {
        let mut sessions = self.sessions();
        if sessions
            .get(&session_id)
            .is_some_and(|handle| handle.actor_id() == actor_id)
        {
            sessions.remove(&session_id);
            debug!(session_id = %session_id, actor_id, "session removed from registry");
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    pub async fn connect(
        &self,
        session_id: SessionId,
        client: ClientHandle,
    ) -> Result<SessionHandle, SessionError> {
        for _ in 0..DELIVERY_ATTEMPTS {
            let handle = self.get_or_create(session_id);
            match handle.connect(client.clone()).await {
                Ok(()) => return Ok(handle),
                Err(SessionError::SessionClosed) => continue,
                Err(error) => return Err(error),
            }
        }
        Err(SessionError::SessionClosed)
    }

    pub async fn start_game(&self, session_id: SessionId) -> Result<StartGameOutcome, SessionError> {
        for _ in 0..DELIVERY_ATTEMPTS {
            match self.get_or_create(session_id).start_game().await {
                Err(SessionError::SessionClosed) => continue,
                result => return result,
            }
        }
        Err(SessionError::SessionClosed)
    }

    pub async fn swipe(
        &self,
        session_id: SessionId,
        user_id: UserId,
        action: SwipeAction,
    ) -> Result<SwipeOutcome, SessionError> {
        for _ in 0..DELIVERY_ATTEMPTS {
            match self.get_or_create(session_id).swipe(user_id, action).await {
                Err(SessionError::SessionClosed) => continue,
                result => return result,
            }
        }
        Err(SessionError::SessionClosed)
    }

    /// Lobby events. With no local actor the frame still goes to other
    /// replicas.
    pub async fn broadcast(&self, session_id: SessionId, frame: OutboundFrame) {
        if let Some(handle) = self.get(session_id)
            && handle.broadcast(frame.clone()).await.is_ok()
        {
            return;
        }
        if let Some(fanout) = &self.inner.deps.fanout {
            match frame.encode() {
                Ok(encoded) => fanout.publish(session_id, encoded.into()),
                Err(error) => warn!(session_id = %session_id, ?error, "failed to encode frame"),
            }
        }
    }

    /// Frames from other replicas. Returns whether a local actor took it.
    pub async fn relay(&self, session_id: SessionId, frame: Arc<str>) -> bool {
        match self.get(session_id) {
            Some(handle) => handle.relay(frame).await.is_ok(),
            None => false,
        }
    }
}
