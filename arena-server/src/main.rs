mod client;
mod rooms;

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arena_core::config::GameConfig;
use arena_core::game_actor::GameMsg;
use axum::Router;
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::fs;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::RoomQuery;
use crate::rooms::{AppState, cleanup_dead_rooms};

const CONFIG_PATH: &str = "ArenaConfig.json";

#[tokio::main]
/// Activates tracing, loads and validates the arena config, spawns a watchdog
/// task that sweeps retired rooms, then serves the WebSocket endpoint and the
/// room listing. The server listens on port 8080.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = match load_config().await {
        Ok(config) => config,
        Err(message) => {
            tracing::error!(message, "Invalid arena config.");
            panic!("Invalid arena config: {}", message);
        }
    };

    let app_state = Arc::new(AppState::new(config));
    let watchdog_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_dead_rooms(&watchdog_state).await;
        }
    });

    let app = Router::new()
        .route("/rooms", get(rooms_handler))
        .route("/ws", get(websocket_handler))
        .with_state(app_state)
        .fallback_service(ServeDir::new(".").not_found_service(ServeFile::new("index.html")));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .unwrap();

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}

/// Reads the config file beside the binary; a missing file means defaults. A file
/// that does not parse or validate is a startup error.
async fn load_config() -> Result<GameConfig, String> {
    match fs::read_to_string(CONFIG_PATH).await {
        Ok(json) => GameConfig::from_json(&json),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::info!("No {} found, using the default config.", CONFIG_PATH);
            let config = GameConfig::default();
            config.validate()?;
            Ok(config)
        }
        Err(err) => Err(format!("Failed to read {}: {}", CONFIG_PATH, err)),
    }
}

/// Generates a list with the current rooms, their player counts and liveness.
async fn rooms_handler(State(state): State<Arc<AppState>>) -> String {
    let rooms = state.rooms.lock().await;
    let mut lines = Vec::new();
    for (name, room) in rooms.iter() {
        let players = match room
            .game
            .ask(|reply| GameMsg::GetState { reply }, Duration::from_millis(500))
            .await
        {
            Ok(state) => state.players.len().to_string(),
            Err(_) => "-".to_string(),
        };
        lines.push(format!(
            "Room: {:<30} Players: {:>3} is alive: {}",
            name,
            players,
            !room.game.is_closed()
        ));
    }
    lines.join("\n")
}

/// This function gets immediately called and upgrades the web response to a web socket.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let room = query.room_name();
    ws.on_upgrade(move |socket| client::websocket(socket, room, addr, state))
}
