//! The simulation core of the arena server: one coordinating [`game_actor::GameActor`]
//! per arena, one actor per ball and paddle, and the small mailbox runtime they run on.
//!
//! Nothing in here touches sockets. The server binary feeds player connections and
//! input into the [`game_actor::GameMsg`] mailbox and forwards the broadcast frames
//! to its WebSocket clients.

pub mod actor;
pub mod ball;
pub mod ball_actor;
pub mod collision;
pub mod config;
pub mod game_actor;
pub mod grid;
pub mod paddle;
pub mod paddle_actor;
