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

//! Cross-replica broadcast. Every frame a session broadcasts locally is also
//! published here; other replicas relay it to the clients they hold for the
//! same session.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use elias_common::SessionId;
use rdkafka::{
    ClientConfig, Message,
    consumer::{Consumer, StreamConsumer},
    producer::{FutureProducer, FutureRecord},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{config::FanoutSettings, registry::SessionRegistry};

pub trait SessionFanout: Send + Sync {
    /// Never blocks the caller; delivery failures are logged.
    fn publish(&self, session_id: SessionId, frame: Arc<str>);
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanoutEnvelope {
    pub session_id: SessionId,
    pub origin: String,
    pub frame: String,
}

impl FanoutEnvelope {
    fn relay_target(&self, replica_id: &str) -> Option<(SessionId, Arc<str>)> {
        (self.origin != replica_id).then(|| (self.session_id, Arc::from(self.frame.as_str())))
    }
}

pub struct KafkaFanout {
    producer: FutureProducer,
    topic: String,
    replica_id: String,
}

impl KafkaFanout {
    pub fn new(settings: &FanoutSettings, replica_id: impl Into<String>) -> anyhow::Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &settings.bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("failed to create Kafka producer for session fanout")?;
        Ok(Self {
            producer,
            topic: settings.topic.clone(),
            replica_id: replica_id.into(),
        })
    }
}

impl SessionFanout for KafkaFanout {
    fn publish(&self, session_id: SessionId, frame: Arc<str>) {
        let envelope = FanoutEnvelope {
            session_id,
            origin: self.replica_id.clone(),
            frame: frame.to_string(),
        };
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(session_id = %session_id, ?error, "failed to encode fanout envelope");
                return;
            }
        };

        let producer = self.producer.clone();
        let topic = self.topic.clone();
        tokio::spawn(async move {
            let key = session_id.to_string();
            let result = producer
                .send(
                    FutureRecord::to(&topic).key(&key).payload(&payload),
                    Duration::from_secs(5),
                )
                .await;
            if let Err((error, _)) = result {
                warn!(session_id = %session_id, ?error, "session fanout publish failed");
            }
        });
    }
}

pub async fn run_fanout_consumer(
    settings: FanoutSettings,
    replica_id: String,
    registry: SessionRegistry,
) -> anyhow::Result<()> {
    let group_id = format!("{}-{}", settings.group_prefix, replica_id);
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &settings.bootstrap_servers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "latest")
        .set("topic.metadata.refresh.interval.ms", "1000")
        .create()
        .context("failed to create Kafka consumer for session fanout")?;

    consumer
        .subscribe(&[settings.topic.as_str()])
        .context("failed to subscribe to session fanout topic")?;
    info!(topic = %settings.topic, group_id = %group_id, "session fanout consumer subscribed");

    loop {
        let message = match consumer.recv().await {
            Ok(message) => message,
            Err(error) => {
                warn!(?error, "session fanout receive error");
                tokio::time::sleep(Duration::from_millis(400)).await;
                continue;
            }
        };

        let Some(payload) = message.payload() else {
            warn!("received empty session fanout payload");
            continue;
        };

        let envelope = match serde_json::from_slice::<FanoutEnvelope>(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(?error, "invalid session fanout payload");
                continue;
            }
        };

        if let Some((session_id, frame)) = envelope.relay_target(&replica_id) {
            let delivered = registry.relay(session_id, frame).await;
            debug!(
                session_id = %session_id,
                origin = %envelope.origin,
                delivered,
                "relayed fanout frame"
            );
        }
    }
}
