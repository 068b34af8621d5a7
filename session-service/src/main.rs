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

mod actor;
mod clock;
mod config;
mod connection;
mod error;
mod fanout;
mod http;
mod identity;
mod lexicon;
mod lobby;
mod persistence;
mod registry;
mod rules;
mod store;

use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{ServiceConfig, StorageSettings},
    fanout::{KafkaFanout, SessionFanout, run_fanout_consumer},
    http::{AppState, build_router},
    identity::TrustedUserIdVerifier,
    lexicon::InMemoryLexicon,
    persistence::{DynamoPersistence, InMemoryPersistence, Persistence},
    registry::{SessionDeps, SessionRegistry},
    store::{DynamoSessionStateStore, InMemorySessionStateStore, SessionStateStore},
};

async fn build_storage(
    settings: &StorageSettings,
) -> (Arc<dyn SessionStateStore>, Arc<dyn Persistence>) {
    match settings {
        StorageSettings::InMemory => {
            warn!("rooms and session state kept in memory, not shared between replicas");
            (
                Arc::new(InMemorySessionStateStore::new()),
                Arc::new(InMemoryPersistence::new()),
            )
        }
        StorageSettings::Dynamo {
            state_table,
            rooms_table,
            endpoint,
        } => {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(endpoint) = endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            let client = DynamoClient::new(&loader.load().await);
            info!(state_table = %state_table, rooms_table = %rooms_table, "storage kept in dynamodb");
            (
                Arc::new(DynamoSessionStateStore::new(client.clone(), state_table.clone())),
                Arc::new(DynamoPersistence::new(client, rooms_table.clone())),
            )
        }
    }
}

fn build_lexicon(path: Option<&str>) -> anyhow::Result<InMemoryLexicon> {
    let lexicon = match path {
        Some(path) => InMemoryLexicon::load(path)?,
        None => InMemoryLexicon::builtin(),
    };
    info!(words = lexicon.len(), "lexicon loaded");
    Ok(lexicon)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("session_service=debug,tower_http=info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    info!(replica_id = %config.replica_id, "session-service starting");

    let (store, persistence) = build_storage(&config.storage).await;
    let lexicon = Arc::new(build_lexicon(config.lexicon_words_path.as_deref())?);
    let fanout: Option<Arc<dyn SessionFanout>> = match &config.fanout {
        Some(settings) => Some(Arc::new(KafkaFanout::new(
            settings,
            config.replica_id.clone(),
        )?)),
        None => None,
    };

    let registry = SessionRegistry::new(SessionDeps {
        store,
        persistence: persistence.clone(),
        lexicon,
        fanout,
        rules: config.rules.clone(),
        state_ttl: config.state_ttl,
        inbox_capacity: config.inbox_capacity,
    });

    if let Some(settings) = config.fanout.clone() {
        let consumer_registry = registry.clone();
        let replica_id = config.replica_id.clone();
        tokio::spawn(async move {
            if let Err(error) = run_fanout_consumer(settings, replica_id, consumer_registry).await
            {
                warn!(error = %error, "session fanout consumer stopped");
            }
        });
    }

    let app = build_router(AppState {
        registry,
        persistence,
        verifier: Arc::new(TrustedUserIdVerifier),
        connection: config.connection.clone(),
    });

    info!(bind_addr = %config.bind_addr, "session-service listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
