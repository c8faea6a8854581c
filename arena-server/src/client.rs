//! One WebSocket session: join the arena, stream the full snapshot and then the
//! per-tick diff frames, and feed direction input back into the coordinator.
//! Any failure on either side synthesizes a `PlayerDisconnect`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arena_core::actor::Pid;
use arena_core::game_actor::{Frame, GameMsg};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::InputMessage;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::rooms::AppState;

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// `/ws?room=<name>`; the default room is "main".
#[derive(Deserialize)]
pub struct RoomQuery {
    room: Option<String>,
}

impl RoomQuery {
    pub fn room_name(&self) -> String {
        self.room.clone().unwrap_or_else(|| "main".to_string())
    }
}

/// Does the whole handling from start to finish: join the arena, stream state in
/// one direction and input in the other, then synthesize the disconnect.
pub async fn websocket(stream: WebSocket, room: String, addr: SocketAddr, state: Arc<AppState>) {
    // By splitting, we can send and receive at the same time.
    let (mut sender, receiver) = stream.split();
    let game = state.room(&room).await;

    let join = game
        .ask(|reply| GameMsg::PlayerConnect { remote: addr.to_string(), reply }, JOIN_TIMEOUT)
        .await;
    let info = match join {
        Ok(Ok(info)) => info,
        Ok(Err(refused)) => {
            tracing::info!(%addr, room, %refused, "Rejecting connection.");
            let _ = sender
                .send(Message::Text(format!("{{\"error\":\"{}\"}}", refused).into()))
                .await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        Err(err) => {
            tracing::error!(%err, room, "Arena did not answer the join request.");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let index = info.index;
    tracing::info!(%addr, room, index, player = %info.player_id, "Connection joined arena.");

    // The full snapshot goes out before any diff frame.
    let snapshot = match serde_json::to_string(&info.state) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::error!(?err, room, "Failed to serialize the join snapshot.");
            game.send(GameMsg::PlayerDisconnect { index });
            return;
        }
    };
    if sender.send(Message::Text(snapshot.into())).await.is_err() {
        game.send(GameMsg::PlayerDisconnect { index });
        return;
    }

    let mut send_task = tokio::spawn(write_loop(sender, info.frames, info.departed));
    let mut receive_task = tokio::spawn(read_loop(receiver, game.clone(), index));

    // If any one of the tasks runs to completion, we abort the other.
    let result = tokio::select! {
        res = &mut send_task => { receive_task.abort(); res }
        res = &mut receive_task => { send_task.abort(); res }
    };
    let reason = result.unwrap_or("Connection task panicked");

    // Repeated disconnects are no-ops in the arena, so this is always safe.
    game.send(GameMsg::PlayerDisconnect { index });
    tracing::info!(%addr, room, index, reason, "Connection closed.");
}

/// Forwards diff frames to the client until the socket breaks, the arena retires,
/// or the arena removes the player.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut frames: broadcast::Receiver<Frame>,
    mut departed: mpsc::UnboundedReceiver<()>,
) -> &'static str {
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return "Error in communication with client endpoint";
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow clients miss frames; the simulation never waits for them.
                    tracing::warn!(skipped, "Client lagging, frames dropped.");
                }
                Err(RecvError::Closed) => return "Arena retired",
            },
            _ = departed.recv() => return "Removed from arena",
        }
    }
}

/// Parses direction input from the client. Malformed frames are logged once and
/// ignored; they are never a disconnect reason.
async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    game: Pid<GameMsg>,
    index: u8,
) -> &'static str {
    let mut warned = false;
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<InputMessage>(text.as_str()) {
                Ok(input) => {
                    if !game.send(GameMsg::PlayerInput { index, direction: input.direction }) {
                        return "Arena retired";
                    }
                }
                Err(err) => {
                    if !warned {
                        tracing::warn!(?err, index, "Ignoring malformed input frame.");
                        warned = true;
                    }
                }
            },
            Ok(Message::Close(_)) => return "Client closed the connection",
            // We do not care about ping, pong or binary frames.
            Ok(_) => {}
            Err(_) => return "Connection lost",
        }
    }
    "Connection lost"
}
