//! One actor per live paddle. Direction input lands here; the position advance is
//! pushed back to the arena coordinator as a snapshot, one step per tick.

use protocol::PaddleView;
use tokio::sync::oneshot;

use crate::actor::{self, Actor, Flow, Pid};
use crate::config::GameConfig;
use crate::game_actor::GameMsg;
use crate::paddle::Paddle;

pub enum PaddleMsg {
    /// Player input, already mapped to -1, 0 or +1 along the paddle axis.
    SetDirection { step: i32 },
    /// Move one step and push a fresh snapshot to the arena coordinator.
    AdvancePosition,
    GetSnapshot { reply: oneshot::Sender<PaddleView> },
    Destroy,
}

pub struct PaddleActor {
    paddle: Paddle,
    cfg: GameConfig,
    game: Pid<GameMsg>,
}

impl PaddleActor {
    pub fn spawn(paddle: Paddle, cfg: GameConfig, game: Pid<GameMsg>) -> Pid<PaddleMsg> {
        actor::spawn(PaddleActor { paddle, cfg, game })
    }
}

impl Actor for PaddleActor {
    type Message = PaddleMsg;

    async fn handle(&mut self, msg: PaddleMsg) -> Flow {
        match msg {
            PaddleMsg::SetDirection { step } => {
                if !(-1..=1).contains(&step) {
                    tracing::warn!(step, paddle = self.paddle.index, "Discarding illegal direction.");
                } else {
                    self.paddle.direction = step;
                }
            }
            PaddleMsg::AdvancePosition => {
                self.paddle.advance(&self.cfg);
                if !self.game.send(GameMsg::PaddleMoved(self.paddle.view())) {
                    return Flow::Stop;
                }
            }
            PaddleMsg::GetSnapshot { reply } => {
                let _ = reply.send(self.paddle.view());
            }
            PaddleMsg::Destroy => return Flow::Stop,
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn;
    use crate::collision::Wall;
    use std::time::Duration;

    struct Sink {
        tx: tokio::sync::mpsc::UnboundedSender<GameMsg>,
    }

    impl Actor for Sink {
        type Message = GameMsg;

        async fn handle(&mut self, msg: GameMsg) -> Flow {
            let _ = self.tx.send(msg);
            Flow::Continue
        }
    }

    #[tokio::test]
    async fn direction_drives_the_advance() {
        let cfg = GameConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let game = spawn(Sink { tx });
        let pid = PaddleActor::spawn(Paddle::at_wall(0, Wall::Right, &cfg), cfg.clone(), game);

        pid.send(PaddleMsg::SetDirection { step: 1 });
        pid.send(PaddleMsg::AdvancePosition);
        match rx.recv().await.unwrap() {
            GameMsg::PaddleMoved(view) => {
                assert_eq!(view.y, 350 + cfg.paddle_speed);
                assert_eq!(view.vy, cfg.paddle_speed);
            }
            _ => panic!("expected a paddle snapshot"),
        }

        // Releasing the key stops the paddle.
        pid.send(PaddleMsg::SetDirection { step: 0 });
        pid.send(PaddleMsg::AdvancePosition);
        match rx.recv().await.unwrap() {
            GameMsg::PaddleMoved(view) => {
                assert_eq!(view.y, 350 + cfg.paddle_speed);
                assert_eq!(view.vy, 0);
            }
            _ => panic!("expected a paddle snapshot"),
        }
    }

    #[tokio::test]
    async fn illegal_direction_is_discarded() {
        let cfg = GameConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let game = spawn(Sink { tx });
        let pid = PaddleActor::spawn(Paddle::at_wall(1, Wall::Top, &cfg), cfg, game);

        pid.send(PaddleMsg::SetDirection { step: 5 });
        pid.send(PaddleMsg::AdvancePosition);
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap() {
            GameMsg::PaddleMoved(view) => assert_eq!(view.vx, 0),
            _ => panic!("expected a paddle snapshot"),
        }
    }
}
