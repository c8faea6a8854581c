//! The wire types for the arena. They are used consistently across the server and the clients.
//! Everything on the socket is JSON with camelCase keys: the client sends [`InputMessage`],
//! the server answers with one [`FullState`] on join and arrays of [`Diff`] records per tick.

use serde::{Deserialize, Serialize};

/// The buffer size for the per-arena frame broadcast channel.
pub const FRAME_CHANNEL_SIZE: usize = 256;

/// A paddle direction key as sent by the client. The empty string releases the paddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "ArrowLeft")]
    Left,
    #[serde(rename = "ArrowRight")]
    Right,
    #[serde(rename = "ArrowUp")]
    Up,
    #[serde(rename = "ArrowDown")]
    Down,
    #[serde(rename = "")]
    Idle,
}

impl Direction {
    /// Maps the key to a movement step along the paddle axis. Left/Up move toward the
    /// canvas origin on both axes, so the mapping is the same for every wall.
    pub fn step(self) -> i32 {
        match self {
            Direction::Left | Direction::Up => -1,
            Direction::Right | Direction::Down => 1,
            Direction::Idle => 0,
        }
    }
}

/// A single client input frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputMessage {
    pub direction: Direction,
}

/// Snapshot of one ball as shown to clients. Coordinates are canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallView {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub vx: i32,
    pub vy: i32,
    pub radius: i32,
    pub mass: i32,
    /// Index of the last player to strike the ball, -1 for ownerless.
    pub owner_index: i32,
    pub phasing: bool,
    pub permanent: bool,
    /// Set for one tick after any collision, for the client side flash.
    pub collided: bool,
}

/// Snapshot of one paddle as shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleView {
    pub index: u8,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub vx: i32,
    pub vy: i32,
    /// Wall index: 0 right, 1 top, 2 left, 3 bottom.
    pub wall: u8,
}

/// Public player information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub index: u8,
    pub id: String,
    pub color: [u8; 3],
    pub score: i64,
    pub connected: bool,
}

/// One brick cell. Only cells that currently hold a brick are listed in [`FullState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub col: u32,
    pub row: u32,
    pub life: u32,
    pub level: u32,
}

/// The complete arena snapshot a client receives right after joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    /// Always [`FullState::MESSAGE_TYPE`], so clients can discriminate on one key.
    pub message_type: String,
    pub canvas_size: i32,
    pub grid_size: u32,
    pub cell_size: i32,
    pub players: Vec<PlayerView>,
    pub paddles: Vec<PaddleView>,
    pub balls: Vec<BallView>,
    pub bricks: Vec<CellView>,
}

impl FullState {
    pub const MESSAGE_TYPE: &'static str = "fullState";
}

/// An incremental state change. The server sends an ordered array of these per tick;
/// `messageType` is the discriminator the clients switch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum Diff {
    /// A player's score changed; at most one of these per player per tick.
    #[serde(rename_all = "camelCase")]
    ScoreUpdate { player_index: u8, score: i64 },
    /// A ball changed hands (or became ownerless, owner index -1).
    #[serde(rename_all = "camelCase")]
    BallOwnerChanged { ball_id: u64, owner_index: i32 },
    #[serde(rename_all = "camelCase")]
    BallSpawned { ball: BallView },
    #[serde(rename_all = "camelCase")]
    BallRemoved { ball_id: u64 },
    /// A brick lost one life but still stands.
    #[serde(rename_all = "camelCase")]
    BrickDamaged { col: u32, row: u32, life: u32 },
    /// A brick reached zero life; `level` is the score it was worth.
    #[serde(rename_all = "camelCase")]
    BrickDestroyed { col: u32, row: u32, level: u32 },
    #[serde(rename_all = "camelCase")]
    PlayerJoined { player: PlayerView },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_index: u8 },
    /// Per-tick paddle position stream.
    #[serde(rename_all = "camelCase")]
    PaddleUpdate { paddle: PaddleView },
    /// Per-tick ball position stream.
    #[serde(rename_all = "camelCase")]
    BallUpdate { ball: BallView },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_mapping_matches_wire_strings() {
        let left: Direction = serde_json::from_str("\"ArrowLeft\"").unwrap();
        let up: Direction = serde_json::from_str("\"ArrowUp\"").unwrap();
        let idle: Direction = serde_json::from_str("\"\"").unwrap();
        assert_eq!(left.step(), -1);
        assert_eq!(up.step(), -1);
        assert_eq!(idle.step(), 0);
        let msg: InputMessage = serde_json::from_str(r#"{"direction":"ArrowRight"}"#).unwrap();
        assert_eq!(msg.direction.step(), 1);
    }

    #[test]
    fn diff_carries_camel_case_discriminator() {
        let diff = Diff::ScoreUpdate {
            player_index: 2,
            score: -1,
        };
        let json = serde_json::to_string(&diff).unwrap();
        assert!(json.contains(r#""messageType":"scoreUpdate""#));
        assert!(json.contains(r#""playerIndex":2"#));

        let diff = Diff::BallOwnerChanged {
            ball_id: 7,
            owner_index: -1,
        };
        let json = serde_json::to_string(&diff).unwrap();
        assert!(json.contains(r#""messageType":"ballOwnerChanged""#));
        assert!(json.contains(r#""ownerIndex":-1"#));
    }

    #[test]
    fn diff_round_trips_through_json() {
        let diffs = vec![
            Diff::BrickDamaged {
                col: 3,
                row: 4,
                life: 2,
            },
            Diff::PlayerLeft { player_index: 1 },
        ];
        let json = serde_json::to_string(&diffs).unwrap();
        let back: Vec<Diff> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diffs);
    }
}
