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

//! One task pair per socket. The reader decodes frames and forwards them to
//! the session actor; the writer drains the client's bounded queue and keeps
//! the peer alive with pings.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use elias_common::{ClientCommand, SessionId, UserId, decode_inbound};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Deserialize;
use tokio::{
    sync::mpsc,
    time::{Instant, interval_at, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    actor::{ClientHandle, SessionHandle},
    config::ConnectionSettings,
    http::{ApiError, AppState},
};

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    init_data: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Path(session_id): Path<SessionId>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authorize(&state, session_id, query.init_data.as_deref()).await?;
    let max_message_bytes = state.connection.max_message_bytes;
    Ok(ws
        .max_message_size(max_message_bytes)
        .on_upgrade(move |socket| serve_socket(socket, state, session_id, user_id)))
}

async fn authorize(
    state: &AppState,
    session_id: SessionId,
    init_data: Option<&str>,
) -> Result<UserId, ApiError> {
    let user_id = state.verifier.verify(init_data.unwrap_or_default())?;
    if state.persistence.get_room(session_id).await?.is_none() {
        return Err(ApiError::not_found(format!("room {session_id} not found")));
    }
    Ok(user_id)
}

async fn serve_socket(socket: WebSocket, state: AppState, session_id: SessionId, user_id: UserId) {
    let settings = state.connection.clone();
    let (client, outbound) = ClientHandle::new(user_id, settings.outbound_capacity);
    let connection_id = client.connection_id;

    let handle = match state.registry.connect(session_id, client).await {
        Ok(handle) => handle,
        Err(error) => {
            warn!(session_id = %session_id, user_id, %error, "failed to attach client");
            return;
        }
    };
    info!(session_id = %session_id, user_id, %connection_id, "client connected");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound, settings.clone()));
    let mut reader = tokio::spawn(read_loop(
        stream,
        handle.clone(),
        user_id,
        settings.pong_wait,
    ));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    handle.disconnect(user_id, connection_id).await;
    info!(session_id = %session_id, user_id, %connection_id, "client disconnected");
}

/// Ends when the actor drops the client's queue, a write fails, or a write
/// takes longer than `write_wait`.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    settings: ConnectionSettings,
) {
    let mut ping = interval_at(
        Instant::now() + settings.ping_period,
        settings.ping_period,
    );

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame.as_ref().into()),
                None => {
                    let _ = timeout(settings.write_wait, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(settings.write_wait, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(%error, "socket write failed");
                return;
            }
            Err(_) => {
                debug!("socket write timed out");
                return;
            }
        }
    }
}

/// Any inbound frame, pongs included, resets the liveness deadline.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    handle: SessionHandle,
    user_id: UserId,
    pong_wait: Duration,
) {
    loop {
        let message = match timeout(pong_wait, stream.next()).await {
            Err(_) => {
                info!(session_id = %handle.session_id(), user_id, "peer stopped answering pings");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(error))) => {
                debug!(session_id = %handle.session_id(), user_id, %error, "socket read failed");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => handle_text(&handle, user_id, text.as_str()).await,
            Message::Close(_) => return,
            Message::Binary(_) => {
                debug!(session_id = %handle.session_id(), user_id, "binary frame dropped");
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

pub(crate) async fn handle_text(handle: &SessionHandle, user_id: UserId, raw: &str) {
    let session_id = handle.session_id();
    match decode_inbound(raw) {
        Ok(ClientCommand::Swipe(action)) => {
            debug!(session_id = %session_id, user_id, action = action.as_str(), "swipe received");
            if let Err(error) = handle.submit_swipe(user_id, action).await {
                warn!(session_id = %session_id, user_id, %error, "swipe not delivered");
            }
        }
        Ok(ClientCommand::VoteStart) => {
            info!(session_id = %session_id, user_id, "vote to start received");
        }
        Ok(ClientCommand::VotePause) => {
            info!(session_id = %session_id, user_id, "vote to pause received");
        }
        Err(error) => {
            warn!(session_id = %session_id, user_id, %error, "dropping inbound frame");
        }
    }
}
