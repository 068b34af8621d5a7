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

use std::time::Duration;

use elias_common::SessionId;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::actor::SessionEvent;

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    Tick { generation: u64, seconds_left: u64 },
    Expired { generation: u64 },
}

impl ClockSignal {
    pub fn generation(self) -> u64 {
        match self {
            Self::Tick { generation, .. } | Self::Expired { generation } => generation,
        }
    }
}

/// Per-session round timer. Ticks once a second into the actor inbox and
/// fires `Expired` exactly once per `start`. Each `start` bumps the
/// generation so signals already queued from an earlier arm can be told
/// apart and dropped.
pub struct RoundClock {
    session_id: SessionId,
    events: mpsc::Sender<SessionEvent>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl RoundClock {
    pub fn new(session_id: SessionId, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            session_id,
            events,
            generation: 0,
            task: None,
        }
    }

    pub fn start(&mut self, duration: Duration) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let deadline = Instant::now() + duration;
        let events = self.events.clone();
        debug!(
            session_id = %self.session_id,
            generation,
            seconds = duration.as_secs(),
            "round clock armed"
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    let _ = events
                        .send(SessionEvent::Clock(ClockSignal::Expired { generation }))
                        .await;
                    return;
                }
                let seconds_left = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                let signal = ClockSignal::Tick {
                    generation,
                    seconds_left,
                };
                if events.send(SessionEvent::Clock(signal)).await.is_err() {
                    return;
                }
            }
        }));
    }

    /// Safe to call when nothing is armed.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(session_id = %self.session_id, generation = self.generation, "round clock stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Whether a signal belongs to the currently armed clock.
    pub fn accepts(&self, signal: ClockSignal) -> bool {
        self.task.is_some() && signal.generation() == self.generation
    }
}

impl Drop for RoundClock {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
