//! The paddle record: an axis-aligned rectangle pinned to one wall, sliding along
//! that wall under player direction input.

use protocol::PaddleView;

use crate::collision::{Axis, Wall};
use crate::config::GameConfig;

/// Authoritative paddle state, owned by one `PaddleActor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paddle {
    pub index: u8,
    pub wall: Wall,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Current step along the motion axis, `direction * paddle_speed`.
    pub velocity: i32,
    /// Player input: -1, 0 or +1 along the motion axis.
    pub direction: i32,
}

impl Paddle {
    /// A paddle centered on its wall.
    pub fn at_wall(index: u8, wall: Wall, cfg: &GameConfig) -> Paddle {
        let canvas = cfg.canvas_size;
        let length = cfg.paddle_length;
        let thickness = cfg.paddle_thickness;
        let face = canvas - cfg.wall_gap - thickness;
        let centered = (canvas - length) / 2;
        let (x, y, width, height) = match wall {
            Wall::Right => (face, centered, thickness, length),
            Wall::Top => (centered, cfg.wall_gap, length, thickness),
            Wall::Left => (cfg.wall_gap, centered, thickness, length),
            Wall::Bottom => (centered, face, length, thickness),
        };
        Paddle { index, wall, x, y, width, height, velocity: 0, direction: 0 }
    }

    /// One movement step along the wall, clamped so the rectangle stays on the
    /// canvas minus the wall gap.
    pub fn advance(&mut self, cfg: &GameConfig) {
        self.velocity = self.direction * cfg.paddle_speed;
        let min = cfg.wall_gap;
        match self.wall.motion_axis() {
            Axis::Y => {
                let max = cfg.canvas_size - cfg.wall_gap - self.height;
                self.y = (self.y + self.velocity).clamp(min, max);
            }
            Axis::X => {
                let max = cfg.canvas_size - cfg.wall_gap - self.width;
                self.x = (self.x + self.velocity).clamp(min, max);
            }
        }
    }

    pub fn view(&self) -> PaddleView {
        let (vx, vy) = match self.wall.motion_axis() {
            Axis::X => (self.velocity, 0),
            Axis::Y => (0, self.velocity),
        };
        PaddleView {
            index: self.index,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            vx,
            vy,
            wall: self.wall.index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paddles_start_centered_on_their_wall() {
        let cfg = GameConfig::default();
        let right = Paddle::at_wall(0, Wall::Right, &cfg);
        assert_eq!((right.x, right.y), (770, 350));
        assert_eq!((right.width, right.height), (20, 100));
        let top = Paddle::at_wall(1, Wall::Top, &cfg);
        assert_eq!((top.x, top.y), (350, 10));
        assert_eq!((top.width, top.height), (100, 20));
    }

    #[test]
    fn advance_moves_along_the_wall_axis_only() {
        let cfg = GameConfig::default();
        let mut p = Paddle::at_wall(0, Wall::Right, &cfg);
        p.direction = 1;
        p.advance(&cfg);
        assert_eq!(p.x, 770);
        assert_eq!(p.y, 350 + cfg.paddle_speed);
        assert_eq!(p.view().vy, cfg.paddle_speed);
        assert_eq!(p.view().vx, 0);
    }

    #[test]
    fn advance_clamps_at_the_wall_gap() {
        let cfg = GameConfig::default();
        let mut p = Paddle::at_wall(3, Wall::Bottom, &cfg);
        p.direction = -1;
        for _ in 0..200 {
            p.advance(&cfg);
        }
        assert_eq!(p.x, cfg.wall_gap);
        p.direction = 1;
        for _ in 0..200 {
            p.advance(&cfg);
        }
        assert_eq!(p.x, cfg.canvas_size - cfg.wall_gap - p.width);
    }
}
