//! Named arenas, created on demand when the first player asks for them.
//! A room only holds the arena's mailbox handle; the GameActor owns everything
//! else and retires itself when its last player leaves.

use std::collections::HashMap;

use arena_core::actor::Pid;
use arena_core::config::GameConfig;
use arena_core::game_actor::{self, GameActor, GameMsg};
use arena_core::grid::Grid;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use tokio::sync::Mutex;

/// One arena as seen by the connection layer.
pub struct Room {
    pub game: Pid<GameMsg>,
}

/// The application state: the arena tuning and all active rooms.
pub struct AppState {
    pub config: GameConfig,
    pub rooms: Mutex<HashMap<String, Room>>,
}

impl AppState {
    pub fn new(config: GameConfig) -> AppState {
        AppState { config, rooms: Mutex::new(HashMap::new()) }
    }

    /// The arena behind `name`, creating a fresh one if the room does not exist
    /// yet or its previous arena has already retired.
    pub async fn room(&self, name: &str) -> Pid<GameMsg> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(name)
            && !room.game.is_closed()
        {
            return room.game.clone();
        }

        let cfg = self.config.clone();
        let seed = cfg.rng_seed.unwrap_or_else(rand::random);
        let mut rng = Pcg32::seed_from_u64(seed);
        let grid = Grid::generate(&cfg, &mut rng);
        let game = GameActor::spawn(cfg.clone(), grid, name.to_string());
        game_actor::start_ticker(game.clone(), cfg.tick_period());
        tracing::info!(room = name, "Created arena.");
        rooms.insert(name.to_string(), Room { game: game.clone() });
        game
    }
}

/// Runs over all rooms and drops the ones whose arena has retired. This is a
/// fallback sweep; rooms normally get replaced in place on the next join.
pub async fn cleanup_dead_rooms(state: &AppState) {
    let mut rooms = state.rooms.lock().await;
    rooms.retain(|room_id, room| {
        let is_alive = !room.game.is_closed();
        if !is_alive {
            tracing::info!("Removing dead room: {}", room_id);
        }
        is_alive
    });
}
