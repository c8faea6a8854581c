//! One actor per live ball. It owns the authoritative ball fields, the phasing
//! timer and the brick-damage marker; the arena coordinator only ever sees the
//! snapshots this actor pushes back after each advance.

use std::time::Duration;

use protocol::BallView;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::actor::{self, Actor, Flow, Pid};
use crate::ball::Ball;
use crate::collision::Axis;
use crate::game_actor::GameMsg;

pub enum BallMsg {
    /// Integrate one step and push a fresh snapshot to the arena coordinator.
    AdvancePosition,
    /// Authoritative position correction after a wall clamp.
    SetPosition { x: i32, y: i32 },
    SetVelocity { vx: i32, vy: i32 },
    ReflectVelocity { axis: Axis },
    /// Velocity power-up: scale both components.
    IncreaseVelocity { ratio: f64 },
    /// Mass power-up: grow mass and radius together.
    IncreaseMass { add: i32, radius_scale: i32 },
    /// Start (or re-arm) phasing for the given duration.
    SetPhasing { duration: Duration },
    SetOwner { owner: i32 },
    /// Phasing damage request; deduplicated here so one engagement with a brick
    /// commits exactly one point of damage no matter how many ticks it spans.
    DamageBrick { col: u32, row: u32 },
    /// Arms the dedupe marker without committing damage. Sent after a direct
    /// (non-phasing) brick hit so the lingering overlap cannot damage it twice.
    MarkBrickDamaged { col: u32, row: u32 },
    /// Internal: the phasing timer ran out. Stale generations are dropped.
    PhasingExpired { generation: u64 },
    GetSnapshot { reply: oneshot::Sender<BallView> },
    Destroy,
}

pub struct BallActor {
    ball: Ball,
    game: Pid<GameMsg>,
    self_pid: Pid<BallMsg>,
    phasing_generation: u64,
    phasing_timer: Option<JoinHandle<()>>,
    /// Last cell this ball committed damage for.
    damaged_cell: Option<(u32, u32)>,
}

impl BallActor {
    pub fn spawn(ball: Ball, game: Pid<GameMsg>) -> Pid<BallMsg> {
        actor::spawn_with(|self_pid| BallActor {
            ball,
            game,
            self_pid,
            phasing_generation: 0,
            phasing_timer: None,
            damaged_cell: None,
        })
    }

    fn start_phasing(&mut self, duration: Duration) {
        self.ball.phasing = true;
        self.phasing_generation += 1;
        if let Some(timer) = self.phasing_timer.take() {
            timer.abort();
        }
        self.phasing_timer = Some(actor::send_after(
            self.self_pid.clone(),
            duration,
            BallMsg::PhasingExpired { generation: self.phasing_generation },
        ));
    }
}

impl Actor for BallActor {
    type Message = BallMsg;

    async fn handle(&mut self, msg: BallMsg) -> Flow {
        match msg {
            BallMsg::AdvancePosition => {
                self.ball.advance();
                if !self.game.send(GameMsg::BallMoved(self.ball.view())) {
                    // The arena is gone; there is nobody left to simulate for.
                    return Flow::Stop;
                }
            }
            BallMsg::SetPosition { x, y } => {
                self.ball.x = x;
                self.ball.y = y;
            }
            BallMsg::SetVelocity { vx, vy } => {
                self.ball.set_velocity(vx, vy);
            }
            BallMsg::ReflectVelocity { axis } => {
                self.ball.reflect(axis);
            }
            BallMsg::IncreaseVelocity { ratio } => {
                if ratio <= 0.0 {
                    tracing::warn!(ratio, ball = self.ball.id, "Discarding illegal velocity ratio.");
                } else {
                    self.ball.increase_velocity(ratio);
                }
            }
            BallMsg::IncreaseMass { add, radius_scale } => {
                self.ball.increase_mass(add, radius_scale);
            }
            BallMsg::SetPhasing { duration } => {
                self.start_phasing(duration);
            }
            BallMsg::SetOwner { owner } => {
                self.ball.owner = owner;
            }
            BallMsg::DamageBrick { col, row } => {
                if self.damaged_cell != Some((col, row)) {
                    self.damaged_cell = Some((col, row));
                    self.game.send(GameMsg::BrickDamageCommitted {
                        ball_id: self.ball.id,
                        col,
                        row,
                    });
                }
            }
            BallMsg::MarkBrickDamaged { col, row } => {
                self.damaged_cell = Some((col, row));
            }
            BallMsg::PhasingExpired { generation } => {
                // A re-arm may have outrun an already queued expiry.
                if generation == self.phasing_generation {
                    self.ball.phasing = false;
                    self.phasing_timer = None;
                }
            }
            BallMsg::GetSnapshot { reply } => {
                let _ = reply.send(self.ball.view());
            }
            BallMsg::Destroy => return Flow::Stop,
        }
        Flow::Continue
    }

    async fn stopped(&mut self) {
        if let Some(timer) = self.phasing_timer.take() {
            timer.abort();
        }
    }
}
