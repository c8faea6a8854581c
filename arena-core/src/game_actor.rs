//! The arena coordinator. One GameActor owns the brick grid, the player table,
//! the snapshot caches and the scores for one arena; balls and paddles run as
//! their own actors and the coordinator talks to them in messages only.
//!
//! Per tick the coordinator fans out `AdvancePosition`, resolves collisions on
//! its local snapshot cache (walls, then paddles, then bricks), sends the
//! authoritative corrections back to the entity actors, and broadcasts the
//! accumulated diff records as one JSON frame.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use protocol::{BallView, Diff, Direction, FRAME_CHANNEL_SIZE, FullState, PaddleView, PlayerView};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::actor::{self, Actor, Flow, Pid};
use crate::ball::Ball;
use crate::ball_actor::{BallActor, BallMsg};
use crate::collision::{self, Axis, BounceTuning, Rect, Wall};
use crate::config::GameConfig;
use crate::grid::{BrickDamage, Grid};
use crate::paddle::Paddle;
use crate::paddle_actor::{PaddleActor, PaddleMsg};

/// One serialized diff batch, broadcast to every connection of the arena.
pub type Frame = Arc<str>;

const PLAYER_COLORS: [[u8; 3]; 4] = [
    [230, 57, 70],
    [69, 123, 157],
    [244, 162, 97],
    [42, 157, 143],
];

pub enum GameMsg {
    /// Fixed-period simulation step, driven by [`start_ticker`].
    Tick,
    /// Snapshot push from a ball actor after its advance.
    BallMoved(BallView),
    /// Snapshot push from a paddle actor after its advance.
    PaddleMoved(PaddleView),
    /// A ball actor committed one point of phasing damage; the cell is validated
    /// against the grid before the decrement lands.
    BrickDamageCommitted { ball_id: u64, col: u32, row: u32 },
    PlayerConnect {
        remote: String,
        reply: oneshot::Sender<Result<JoinInfo, JoinRefused>>,
    },
    PlayerDisconnect { index: u8 },
    PlayerInput { index: u8, direction: Direction },
    SpawnBall(SpawnBall),
    /// Full snapshot of the arena, for the join path and for tests.
    GetState { reply: oneshot::Sender<FullState> },
}

/// Ball creation request. The tick loop fills in whatever is left open.
pub struct SpawnBall {
    /// Owning player index, -1 for ownerless.
    pub owner: i32,
    pub x: i32,
    pub y: i32,
    /// Rolled from the velocity bounds when absent.
    pub velocity: Option<(i32, i32)>,
    /// Start the ball already phasing for this duration.
    pub phasing: Option<Duration>,
    /// Ephemeral balls carry an expiry; permanent balls never do.
    pub expire_in: Option<Duration>,
    pub permanent: bool,
    pub reply: Option<oneshot::Sender<(u64, Pid<BallMsg>)>>,
}

/// Everything a fresh connection needs after a successful join.
pub struct JoinInfo {
    pub index: u8,
    pub player_id: String,
    pub state: FullState,
    pub frames: broadcast::Receiver<Frame>,
    /// Closed by the arena when the player is gone; the write loop watches it.
    pub departed: mpsc::UnboundedReceiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRefused {
    /// All player slots are taken.
    Full,
}

impl fmt::Display for JoinRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinRefused::Full => write!(f, "arena is full"),
        }
    }
}

struct PlayerSlot {
    id: String,
    color: [u8; 3],
    score: i64,
    remote: String,
    paddle: Pid<PaddleMsg>,
    paddle_view: PaddleView,
    /// The player's permanent ball, destroyed with the player.
    ball_id: u64,
    departed: mpsc::UnboundedSender<()>,
}

struct BallEntry {
    pid: Pid<BallMsg>,
    view: BallView,
    expire_at: Option<Instant>,
    /// Set when corrections were sent this tick: the next snapshot push still
    /// predates them (it was produced by the advance sent earlier in the same
    /// tick) and must not overwrite the corrected cache.
    stale_push: bool,
}

/// Per-ball scratch state for one tick.
#[derive(Debug, Default, Clone, Copy)]
struct TickFlags {
    collided: bool,
    reflected_x: bool,
    reflected_y: bool,
}

/// A brick break that rolled a power-up, with the breaking ball frozen at that moment.
struct PowerUpTrigger {
    ball: BallView,
}

pub struct GameActor {
    cfg: GameConfig,
    room: String,
    grid: Grid,
    players: [Option<PlayerSlot>; 4],
    balls: HashMap<u64, BallEntry>,
    next_ball_id: u64,
    /// Diff accumulator for the current tick, drained into one broadcast frame.
    diffs: Vec<Diff>,
    frames: broadcast::Sender<Frame>,
    rng: Pcg32,
    self_pid: Pid<GameMsg>,
}

impl GameActor {
    /// Spawns the coordinator for one arena. The caller starts the tick source
    /// separately via [`start_ticker`], so tests can drive ticks by hand.
    pub fn spawn(cfg: GameConfig, grid: Grid, room: String) -> Pid<GameMsg> {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_SIZE);
        let seed = cfg.rng_seed.unwrap_or_else(rand::random);
        actor::spawn_with(|self_pid| GameActor {
            cfg,
            room,
            grid,
            players: [None, None, None, None],
            balls: HashMap::new(),
            next_ball_id: 1,
            diffs: Vec::new(),
            frames,
            rng: Pcg32::seed_from_u64(seed),
            self_pid,
        })
    }

    fn on_tick(&mut self) {
        // 1. Ask every entity for its next step; the pipeline below reads the
        //    snapshots pushed for the previous tick, never blocking on replies.
        for slot in self.players.iter().flatten() {
            slot.paddle.send(PaddleMsg::AdvancePosition);
        }
        // A failed send is the only sign a ball actor died; drop such balls here.
        let dead: Vec<u64> = self
            .balls
            .iter()
            .filter(|(_, e)| !e.pid.send(BallMsg::AdvancePosition))
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            tracing::warn!(ball = id, room = %self.room, "Ball actor vanished, dropping it.");
            self.remove_ball(id);
        }

        // 2. Collisions on the cache: walls, paddles, bricks.
        let (flags, triggers) = self.run_collisions();

        // 3. Power-ups rolled during the pipeline.
        self.apply_power_ups(triggers);

        // 4. One frame per tick.
        self.emit_frame(&flags);

        // 5. Expiries on monotonic time.
        self.process_expiries();
    }

    fn run_collisions(&mut self) -> (HashMap<u64, TickFlags>, Vec<PowerUpTrigger>) {
        let mut flags = HashMap::new();
        let mut triggers = Vec::new();
        let mut scored: HashSet<usize> = HashSet::new();

        // The ball set may shrink mid-iteration, so walk a snapshot of the ids.
        let mut ids: Vec<u64> = self.balls.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some((pid, mut ball)) = self.balls.get(&id).map(|e| (e.pid.clone(), e.view))
            else {
                continue;
            };
            let mut flag = TickFlags::default();

            // (a) Walls, in fixed order right, top, left, bottom.
            let mut removed = false;
            if let Some(wall) =
                collision::wall_penetration(ball.x, ball.y, ball.radius, self.cfg.canvas_size)
            {
                let was_phasing = ball.phasing;
                let (x, y) =
                    collision::clamp_inside(wall, ball.x, ball.y, ball.radius, self.cfg.canvas_size);
                ball.x = x;
                ball.y = y;
                match wall.normal_axis() {
                    Axis::X => {
                        ball.vx = collision::reflect_component(
                            ball.vx,
                            self.cfg.min_wall_reflect_velocity,
                        );
                        flag.reflected_x = true;
                    }
                    Axis::Y => {
                        ball.vy = collision::reflect_component(
                            ball.vy,
                            self.cfg.min_wall_reflect_velocity,
                        );
                        flag.reflected_y = true;
                    }
                }
                flag.collided = true;
                pid.send(BallMsg::SetPosition { x, y });
                pid.send(BallMsg::SetVelocity { vx: ball.vx, vy: ball.vy });
                pid.send(BallMsg::SetPhasing { duration: self.cfg.phasing_time() });
                ball.phasing = true;
                if !was_phasing {
                    removed = self.score_concede(wall, &pid, &mut ball, &mut scored);
                }
            }
            if removed {
                self.remove_ball(id);
                flags.insert(id, flag);
                continue;
            }

            // (b) Paddles of connected players. The first strike wins the tick and
            // shields the ball from brick checks.
            let mut struck = false;
            for index in 0..self.players.len() {
                let Some(paddle_view) = self.players[index].as_ref().map(|s| s.paddle_view)
                else {
                    continue;
                };
                let rect = Rect::of_paddle(&paddle_view);
                if !collision::circle_intersects_rect(ball.x, ball.y, ball.radius, &rect) {
                    continue;
                }
                let Some(wall) = Wall::from_index(paddle_view.wall) else { continue };
                // Only a ball moving toward the paddle bounces; anything else is
                // the lingering overlap of last tick's strike.
                let approaching = match wall.normal_axis() {
                    Axis::X => ball.vx.signum() == -wall.inward_sign(),
                    Axis::Y => ball.vy.signum() == -wall.inward_sign(),
                };
                if !approaching {
                    continue;
                }

                let tuning = BounceTuning {
                    angle_factor: self.cfg.ball_hit_paddle_angle_factor,
                    speed_factor: self.cfg.ball_hit_paddle_speed_factor,
                    min_speed: self.cfg.min_ball_velocity,
                    max_speed: self.cfg.max_ball_velocity,
                };
                let (vx, vy) =
                    collision::paddle_bounce(ball.x, ball.y, ball.vx, ball.vy, &paddle_view, &tuning);
                ball.vx = vx;
                ball.vy = vy;
                pid.send(BallMsg::SetVelocity { vx, vy });
                flag.collided = true;
                if ball.owner_index != index as i32 {
                    ball.owner_index = index as i32;
                    pid.send(BallMsg::SetOwner { owner: index as i32 });
                    self.diffs.push(Diff::BallOwnerChanged {
                        ball_id: id,
                        owner_index: index as i32,
                    });
                }
                pid.send(BallMsg::SetPhasing { duration: self.cfg.phasing_time() });
                ball.phasing = true;
                struck = true;
                break;
            }

            // (c) Bricks.
            if !struck {
                self.check_bricks(&pid, &mut ball, &mut flag, &mut scored, &mut triggers);
            }

            if let Some(entry) = self.balls.get_mut(&id) {
                entry.view = ball;
                if flag.collided {
                    entry.stale_push = true;
                }
            }
            flags.insert(id, flag);
        }

        // Score updates land at the end of the tick, one per affected player.
        let mut scored: Vec<usize> = scored.into_iter().collect();
        scored.sort_unstable();
        for index in scored {
            if let Some(slot) = &self.players[index] {
                self.diffs.push(Diff::ScoreUpdate { player_index: index as u8, score: slot.score });
            }
        }

        (flags, triggers)
    }

    /// Scoring for a wall hit by a non-phasing ball. Returns true when the ball is
    /// ephemeral and drains out of the arena on this concede.
    fn score_concede(
        &mut self,
        wall: Wall,
        pid: &Pid<BallMsg>,
        ball: &mut BallView,
        scored: &mut HashSet<usize>,
    ) -> bool {
        let conceder = wall.index() as usize;
        if self.players[conceder].is_some() {
            let owner = ball.owner_index;
            let scorer = (owner >= 0)
                .then_some(owner as usize)
                .filter(|i| self.players[*i].is_some());
            match scorer {
                Some(scorer) if scorer != conceder => {
                    // Transfer: one point moves from the conceder to the scorer.
                    if let Some(slot) = self.players[scorer].as_mut() {
                        slot.score += 1;
                    }
                    if let Some(slot) = self.players[conceder].as_mut() {
                        slot.score -= 1;
                    }
                    scored.insert(scorer);
                    scored.insert(conceder);
                }
                _ => {
                    // Ownerless ball, departed owner, or an own goal.
                    if let Some(slot) = self.players[conceder].as_mut() {
                        slot.score -= 1;
                    }
                    scored.insert(conceder);
                }
            }
            // The conceded ball belongs to no one until the next strike.
            if ball.owner_index != -1 {
                ball.owner_index = -1;
                pid.send(BallMsg::SetOwner { owner: -1 });
                self.diffs.push(Diff::BallOwnerChanged { ball_id: ball.id, owner_index: -1 });
            }
        }
        !ball.permanent
    }

    fn check_bricks(
        &mut self,
        pid: &Pid<BallMsg>,
        ball: &mut BallView,
        flag: &mut TickFlags,
        scored: &mut HashSet<usize>,
        triggers: &mut Vec<PowerUpTrigger>,
    ) {
        let (col_min, col_max, row_min, row_max) =
            self.grid.candidate_cells(ball.x, ball.y, ball.radius);
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                if !self.grid.is_brick(col, row) {
                    continue;
                }
                let rect = self.grid.cell_rect(col, row);
                if !collision::circle_intersects_rect(ball.x, ball.y, ball.radius, &rect) {
                    continue;
                }

                if ball.phasing {
                    // The decrement round-trips through the ball actor, which
                    // dedupes the engagement so an overlap spanning several ticks
                    // damages the brick exactly once. No reflection, no score.
                    pid.send(BallMsg::DamageBrick { col, row });
                    return;
                }

                flag.collided = true;
                match self.grid.damage(col, row) {
                    Some(BrickDamage::Damaged { life }) => {
                        self.diffs.push(Diff::BrickDamaged { col, row, life });
                    }
                    Some(BrickDamage::Destroyed { level }) => {
                        self.diffs.push(Diff::BrickDestroyed { col, row, level });
                        let owner = ball.owner_index;
                        if owner >= 0
                            && let Some(slot) = self.players[owner as usize].as_mut()
                        {
                            slot.score += level as i64;
                            scored.insert(owner as usize);
                        }
                    }
                    None => {}
                }
                // Let the ball's own dedupe marker cover this cell, so the stale
                // overlap next tick (already phasing by then) cannot damage it again.
                pid.send(BallMsg::MarkBrickDamaged { col, row });

                // Reflect on the dominant axis unless a wall already flipped it.
                let dx = ball.x - (rect.x + rect.w / 2);
                let dy = ball.y - (rect.y + rect.h / 2);
                let axis = if dx.abs() > dy.abs() { Axis::X } else { Axis::Y };
                match axis {
                    Axis::X if !flag.reflected_x => {
                        ball.vx = collision::reflect_component(ball.vx, 1);
                        flag.reflected_x = true;
                        pid.send(BallMsg::ReflectVelocity { axis: Axis::X });
                    }
                    Axis::Y if !flag.reflected_y => {
                        ball.vy = collision::reflect_component(ball.vy, 1);
                        flag.reflected_y = true;
                        pid.send(BallMsg::ReflectVelocity { axis: Axis::Y });
                    }
                    _ => {}
                }

                pid.send(BallMsg::SetPhasing { duration: self.cfg.phasing_time() });
                ball.phasing = true;

                if self.cfg.power_up_chance > 0.0
                    && self.rng.random_bool(self.cfg.power_up_chance)
                {
                    triggers.push(PowerUpTrigger { ball: *ball });
                }
                // A non-phasing ball stops at the first brick of the tick.
                return;
            }
        }
    }

    fn apply_power_ups(&mut self, triggers: Vec<PowerUpTrigger>) {
        for trigger in triggers {
            let snapshot = trigger.ball;
            match self.rng.random_range(0..4u8) {
                0 => {
                    tracing::debug!(room = %self.room, ball = snapshot.id, "Power-up: extra ball.");
                    self.spawn_ball(SpawnBall {
                        owner: snapshot.owner_index,
                        x: snapshot.x,
                        y: snapshot.y,
                        velocity: None,
                        phasing: None,
                        expire_in: Some(self.cfg.spawn_ball_expiry()),
                        permanent: false,
                        reply: None,
                    });
                }
                1 => {
                    if let Some(entry) = self.balls.get_mut(&snapshot.id) {
                        entry.pid.send(BallMsg::IncreaseMass {
                            add: self.cfg.power_up_increase_mass_add,
                            radius_scale: self.cfg.power_up_increase_mass_size,
                        });
                        entry.stale_push = true;
                    }
                }
                2 => {
                    if let Some(entry) = self.balls.get_mut(&snapshot.id) {
                        entry.pid.send(BallMsg::IncreaseVelocity {
                            ratio: self.cfg.power_up_increase_vel_ratio,
                        });
                        entry.stale_push = true;
                    }
                }
                _ => {
                    if let Some(entry) = self.balls.get_mut(&snapshot.id) {
                        entry.pid.send(BallMsg::SetPhasing { duration: self.cfg.phasing_time() });
                        entry.view.phasing = true;
                        entry.stale_push = true;
                    }
                }
            }
        }
    }

    fn spawn_ball(&mut self, req: SpawnBall) {
        let id = self.next_ball_id;
        self.next_ball_id += 1;
        let owner = if (-1..self.players.len() as i32).contains(&req.owner) {
            req.owner
        } else {
            tracing::warn!(owner = req.owner, room = %self.room, "Illegal ball owner, spawning ownerless.");
            -1
        };
        let (vx, vy) = match req.velocity {
            Some(v) => v,
            None => self.roll_velocity(),
        };
        let ball = Ball {
            id,
            x: req.x,
            y: req.y,
            vx,
            vy,
            radius: self.cfg.ball_radius,
            mass: self.cfg.ball_mass,
            owner,
            phasing: false,
            permanent: req.permanent,
        };
        let pid = BallActor::spawn(ball, self.self_pid.clone());
        let mut view = ball.view();
        if let Some(duration) = req.phasing {
            pid.send(BallMsg::SetPhasing { duration });
            view.phasing = true;
        }
        let expire_at = req.expire_in.map(|d| Instant::now() + d);
        self.balls.insert(id, BallEntry { pid: pid.clone(), view, expire_at, stale_push: false });
        self.diffs.push(Diff::BallSpawned { ball: view });
        if let Some(reply) = req.reply {
            let _ = reply.send((id, pid));
        }
    }

    /// Velocity with both components drawn from the configured bounds, random signs.
    fn roll_velocity(&mut self) -> (i32, i32) {
        let (min, max) = (self.cfg.min_ball_velocity, self.cfg.max_ball_velocity);
        let vx = self.rng.random_range(min..=max);
        let vy = self.rng.random_range(min..=max);
        let vx = if self.rng.random_bool(0.5) { vx } else { -vx };
        let vy = if self.rng.random_bool(0.5) { vy } else { -vy };
        (vx, vy)
    }

    fn remove_ball(&mut self, id: u64) {
        if let Some(entry) = self.balls.remove(&id) {
            entry.pid.send(BallMsg::Destroy);
            self.diffs.push(Diff::BallRemoved { ball_id: id });
        }
    }

    fn commit_phasing_damage(&mut self, ball_id: u64, col: u32, row: u32) {
        // The ball may have drained since it sent the request.
        if !self.balls.contains_key(&ball_id) {
            return;
        }
        match self.grid.damage(col, row) {
            Some(BrickDamage::Damaged { life }) => {
                self.diffs.push(Diff::BrickDamaged { col, row, life });
            }
            // Phasing kills award no score and roll no power-up.
            Some(BrickDamage::Destroyed { level }) => {
                self.diffs.push(Diff::BrickDestroyed { col, row, level });
            }
            // The cell was cleared by someone else in the meantime.
            None => {}
        }
    }

    fn emit_frame(&mut self, flags: &HashMap<u64, TickFlags>) {
        for slot in self.players.iter().flatten() {
            self.diffs.push(Diff::PaddleUpdate { paddle: slot.paddle_view });
        }
        let mut ids: Vec<u64> = self.balls.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(entry) = self.balls.get(&id) {
                let mut view = entry.view;
                view.collided = flags.get(&id).is_some_and(|f| f.collided);
                self.diffs.push(Diff::BallUpdate { ball: view });
            }
        }
        if self.diffs.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.diffs);
        match serde_json::to_string(&batch) {
            // No receivers just means nobody is watching this arena right now.
            Ok(json) => {
                let _ = self.frames.send(Arc::from(json.as_str()));
            }
            Err(err) => {
                tracing::error!(?err, room = %self.room, "Failed to serialize diff frame.");
            }
        }
    }

    fn process_expiries(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .balls
            .iter()
            .filter(|(_, e)| !e.view.permanent && e.expire_at.is_some_and(|at| at <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            tracing::debug!(ball = id, room = %self.room, "Ball expired.");
            self.remove_ball(id);
        }
    }

    /// Returns true when the arena should stop (reply channel already gone and no
    /// player is left to simulate for).
    fn on_connect(
        &mut self,
        remote: String,
        reply: oneshot::Sender<Result<JoinInfo, JoinRefused>>,
    ) -> bool {
        let free = (0..self.cfg.max_players as usize).find(|i| self.players[*i].is_none());
        let Some(index) = free else {
            tracing::warn!(remote = %remote, room = %self.room, "Rejecting player, arena is full.");
            let _ = reply.send(Err(JoinRefused::Full));
            return false;
        };
        let wall = Wall::from_index(index as u8).expect("player index is a wall index");

        let player_id = format!("p{}-{:08x}", index, self.rng.random::<u32>());
        let paddle = Paddle::at_wall(index as u8, wall, &self.cfg);
        let paddle_view = paddle.view();
        let paddle_pid = PaddleActor::spawn(paddle, self.cfg.clone(), self.self_pid.clone());
        let (departed_tx, departed_rx) = mpsc::unbounded_channel();

        let ball_id = self.next_ball_id;
        let (x, y) = self.ball_spawn_point(wall);
        self.spawn_ball(SpawnBall {
            owner: index as i32,
            x,
            y,
            velocity: None,
            phasing: None,
            expire_in: None,
            permanent: true,
            reply: None,
        });

        self.players[index] = Some(PlayerSlot {
            id: player_id.clone(),
            color: PLAYER_COLORS[index],
            score: self.cfg.initial_score,
            remote: remote.clone(),
            paddle: paddle_pid,
            paddle_view,
            ball_id,
            departed: departed_tx,
        });
        self.diffs.push(Diff::PlayerJoined { player: self.player_view(index) });

        let info = JoinInfo {
            index: index as u8,
            player_id,
            state: self.full_state(),
            frames: self.frames.subscribe(),
            departed: departed_rx,
        };
        if reply.send(Ok(info)).is_err() {
            // The connection vanished between the upgrade and the join.
            tracing::warn!(index, room = %self.room, "Connection gone before join completed.");
            return self.on_disconnect(index as u8);
        }
        tracing::info!(index, remote = %remote, room = %self.room, "Player joined.");
        false
    }

    /// Permanent balls start in front of their paddle, a quarter canvas off center.
    fn ball_spawn_point(&self, wall: Wall) -> (i32, i32) {
        let c = self.cfg.canvas_size;
        match wall {
            Wall::Right => (3 * c / 4, c / 2),
            Wall::Top => (c / 2, c / 4),
            Wall::Left => (c / 4, c / 2),
            Wall::Bottom => (c / 2, 3 * c / 4),
        }
    }

    /// Returns true when the last player left and the arena should stop.
    fn on_disconnect(&mut self, index: u8) -> bool {
        let Some(slot) = self.players.get_mut(index as usize).and_then(|s| s.take()) else {
            // Disconnects are idempotent.
            return false;
        };
        slot.paddle.send(PaddleMsg::Destroy);
        self.remove_ball(slot.ball_id);
        // Surviving power-up balls of that player become ownerless and drain out
        // on their own expiry or concede.
        let orphaned: Vec<u64> = self
            .balls
            .iter()
            .filter(|(_, e)| e.view.owner_index == index as i32)
            .map(|(id, _)| *id)
            .collect();
        for id in orphaned {
            if let Some(entry) = self.balls.get_mut(&id) {
                entry.view.owner_index = -1;
                entry.pid.send(BallMsg::SetOwner { owner: -1 });
                self.diffs.push(Diff::BallOwnerChanged { ball_id: id, owner_index: -1 });
            }
        }
        self.diffs.push(Diff::PlayerLeft { player_index: index });
        tracing::info!(index, remote = %slot.remote, room = %self.room, "Player left.");
        // Dropping the slot closes its departed channel and with it the write loop.
        drop(slot);

        if self.players.iter().all(Option::is_none) {
            // Flush the goodbye diffs before retiring the arena.
            self.emit_frame(&HashMap::new());
            tracing::info!(room = %self.room, "Last player left, arena shuts down.");
            return true;
        }
        false
    }

    fn on_input(&mut self, index: u8, direction: Direction) {
        match self.players.get(index as usize).and_then(|s| s.as_ref()) {
            Some(slot) => {
                slot.paddle.send(PaddleMsg::SetDirection { step: direction.step() });
            }
            None => {
                tracing::warn!(index, room = %self.room, "Input for an unoccupied player slot.");
            }
        }
    }

    fn player_view(&self, index: usize) -> PlayerView {
        let slot = self.players[index].as_ref().expect("player slot is occupied");
        PlayerView {
            index: index as u8,
            id: slot.id.clone(),
            color: slot.color,
            score: slot.score,
            connected: true,
        }
    }

    fn full_state(&self) -> FullState {
        let players =
            (0..self.players.len()).filter(|i| self.players[*i].is_some()).map(|i| self.player_view(i)).collect();
        let paddles = self.players.iter().flatten().map(|s| s.paddle_view).collect();
        let mut balls: Vec<BallView> = self.balls.values().map(|e| e.view).collect();
        balls.sort_by_key(|b| b.id);
        FullState {
            message_type: FullState::MESSAGE_TYPE.to_string(),
            canvas_size: self.cfg.canvas_size,
            grid_size: self.cfg.grid_size,
            cell_size: self.cfg.cell_size(),
            players,
            paddles,
            balls,
            bricks: self.grid.brick_views(),
        }
    }
}

impl Actor for GameActor {
    type Message = GameMsg;

    async fn handle(&mut self, msg: GameMsg) -> Flow {
        match msg {
            GameMsg::Tick => self.on_tick(),
            GameMsg::BallMoved(view) => {
                if let Some(entry) = self.balls.get_mut(&view.id) {
                    if entry.stale_push {
                        // Produced before last tick's corrections; the corrected
                        // cache is the fresher truth.
                        entry.stale_push = false;
                    } else {
                        entry.view = view;
                    }
                }
            }
            GameMsg::PaddleMoved(view) => {
                if let Some(slot) =
                    self.players.get_mut(view.index as usize).and_then(|s| s.as_mut())
                {
                    slot.paddle_view = view;
                }
            }
            GameMsg::BrickDamageCommitted { ball_id, col, row } => {
                self.commit_phasing_damage(ball_id, col, row);
            }
            GameMsg::PlayerConnect { remote, reply } => {
                if self.on_connect(remote, reply) {
                    return Flow::Stop;
                }
            }
            GameMsg::PlayerDisconnect { index } => {
                if self.on_disconnect(index) {
                    return Flow::Stop;
                }
            }
            GameMsg::PlayerInput { index, direction } => self.on_input(index, direction),
            GameMsg::SpawnBall(req) => self.spawn_ball(req),
            GameMsg::GetState { reply } => {
                let _ = reply.send(self.full_state());
            }
        }
        Flow::Continue
    }

    async fn stopped(&mut self) {
        for entry in self.balls.values() {
            entry.pid.send(BallMsg::Destroy);
        }
        for slot in self.players.iter().flatten() {
            slot.paddle.send(PaddleMsg::Destroy);
        }
    }
}

/// Starts the fixed-period tick source for an arena. Ends by itself once the
/// arena's mailbox closes.
pub fn start_ticker(pid: Pid<GameMsg>, period: Duration) {
    actor::spawn_ticker(pid, period, || GameMsg::Tick);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> GameConfig {
        GameConfig {
            power_up_chance: 0.0,
            brick_density: 0.0,
            rng_seed: Some(11),
            ..GameConfig::default()
        }
    }

    fn spawn_arena(cfg: &GameConfig) -> Pid<GameMsg> {
        let mut rng = Pcg32::seed_from_u64(cfg.rng_seed.unwrap_or(0));
        let grid = Grid::generate(cfg, &mut rng);
        GameActor::spawn(cfg.clone(), grid, "test".to_string())
    }

    async fn join(pid: &Pid<GameMsg>) -> Result<JoinInfo, JoinRefused> {
        pid.ask(
            |reply| GameMsg::PlayerConnect { remote: "test:0".to_string(), reply },
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    async fn state(pid: &Pid<GameMsg>) -> FullState {
        pid.ask(|reply| GameMsg::GetState { reply }, Duration::from_secs(1)).await.unwrap()
    }

    #[tokio::test]
    async fn fifth_player_is_rejected() {
        let game = spawn_arena(&quiet_config());
        let mut joins = Vec::new();
        for expected in 0..4u8 {
            let info = join(&game).await.unwrap();
            assert_eq!(info.index, expected);
            joins.push(info);
        }
        assert!(matches!(join(&game).await, Err(JoinRefused::Full)));
        // Every player got a paddle and a permanent ball.
        let state = state(&game).await;
        assert_eq!(state.players.len(), 4);
        assert_eq!(state.paddles.len(), 4);
        assert_eq!(state.balls.len(), 4);
        assert!(state.balls.iter().all(|b| b.permanent));
    }

    #[tokio::test]
    async fn freed_slot_is_reused_and_ephemerals_orphaned() {
        let game = spawn_arena(&quiet_config());
        let _p0 = join(&game).await.unwrap();
        let _p1 = join(&game).await.unwrap();

        // An ephemeral ball owned by player 0.
        game.send(GameMsg::SpawnBall(SpawnBall {
            owner: 0,
            x: 400,
            y: 400,
            velocity: Some((5, 5)),
            phasing: None,
            expire_in: Some(Duration::from_secs(60)),
            permanent: false,
            reply: None,
        }));

        game.send(GameMsg::PlayerDisconnect { index: 0 });
        let snapshot = state(&game).await;
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].index, 1);
        // The permanent ball of player 0 is gone, the ephemeral one is ownerless.
        assert_eq!(snapshot.balls.len(), 2);
        let ephemeral = snapshot.balls.iter().find(|b| !b.permanent).unwrap();
        assert_eq!(ephemeral.owner_index, -1);

        // The lowest free index goes to the next join.
        let info = join(&game).await.unwrap();
        assert_eq!(info.index, 0);
    }

    #[tokio::test]
    async fn arena_stops_after_the_last_player_leaves() {
        let game = spawn_arena(&quiet_config());
        let info = join(&game).await.unwrap();
        game.send(GameMsg::PlayerDisconnect { index: info.index });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(game.is_closed());
    }

    #[tokio::test]
    async fn input_moves_the_paddle_on_the_next_ticks() {
        let game = spawn_arena(&quiet_config());
        let info = join(&game).await.unwrap();
        let start_y = state(&game).await.paddles[0].y;

        game.send(GameMsg::PlayerInput { index: info.index, direction: Direction::Down });
        for _ in 0..3 {
            game.send(GameMsg::Tick);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let moved_y = state(&game).await.paddles[0].y;
        assert!(moved_y > start_y, "paddle did not move: {} -> {}", start_y, moved_y);
    }

    #[tokio::test]
    async fn ephemeral_balls_expire_on_ticks() {
        let game = spawn_arena(&quiet_config());
        let _p0 = join(&game).await.unwrap();
        game.send(GameMsg::SpawnBall(SpawnBall {
            owner: -1,
            x: 400,
            y: 400,
            velocity: Some((5, 5)),
            phasing: None,
            expire_in: Some(Duration::from_millis(30)),
            permanent: false,
            reply: None,
        }));
        assert_eq!(state(&game).await.balls.len(), 2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        game.send(GameMsg::Tick);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = state(&game).await;
        assert_eq!(snapshot.balls.len(), 1);
        assert!(snapshot.balls[0].permanent);
    }
}
