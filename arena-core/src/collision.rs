//! Collision geometry for the square arena: wall penetration, circle-vs-rectangle
//! via the closest point on the rectangle, and the paddle bounce with its angle
//! deflection and speed transfer.

use std::f64::consts::PI;

use protocol::PaddleView;

use crate::ball::cast_velocity;

/// A canvas axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// The four arena walls. The discriminant is the wall index on the wire and the
/// player slot sitting at that wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    Right = 0,
    Top = 1,
    Left = 2,
    Bottom = 3,
}

impl Wall {
    /// Fixed resolution order for the wall test.
    pub const ALL: [Wall; 4] = [Wall::Right, Wall::Top, Wall::Left, Wall::Bottom];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Wall> {
        match index {
            0 => Some(Wall::Right),
            1 => Some(Wall::Top),
            2 => Some(Wall::Left),
            3 => Some(Wall::Bottom),
            _ => None,
        }
    }

    /// Axis normal to this wall; the component a bounce reflects.
    pub fn normal_axis(self) -> Axis {
        match self {
            Wall::Right | Wall::Left => Axis::X,
            Wall::Top | Wall::Bottom => Axis::Y,
        }
    }

    /// Axis a paddle on this wall moves along.
    pub fn motion_axis(self) -> Axis {
        match self {
            Wall::Right | Wall::Left => Axis::Y,
            Wall::Top | Wall::Bottom => Axis::X,
        }
    }

    /// Sign of the normal component pointing back into the arena.
    pub fn inward_sign(self) -> i32 {
        match self {
            Wall::Right | Wall::Bottom => -1,
            Wall::Top | Wall::Left => 1,
        }
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn of_paddle(p: &PaddleView) -> Rect {
        Rect { x: p.x, y: p.y, w: p.width, h: p.height }
    }

    /// Closest point of the rectangle to `(px, py)`.
    pub fn closest_point(&self, px: i32, py: i32) -> (i32, i32) {
        (px.clamp(self.x, self.x + self.w), py.clamp(self.y, self.y + self.h))
    }
}

/// Circle-vs-rectangle test. Tangent contact (distance exactly equal to the radius)
/// is not a hit.
pub fn circle_intersects_rect(cx: i32, cy: i32, radius: i32, rect: &Rect) -> bool {
    let (px, py) = rect.closest_point(cx, cy);
    let dx = (cx - px) as i64;
    let dy = (cy - py) as i64;
    dx * dx + dy * dy < (radius as i64) * (radius as i64)
}

/// First wall the ball penetrates, in the fixed order right, top, left, bottom.
/// Touching a wall exactly at the radius is not a penetration.
pub fn wall_penetration(x: i32, y: i32, radius: i32, canvas: i32) -> Option<Wall> {
    if x + radius > canvas {
        Some(Wall::Right)
    } else if y < radius {
        Some(Wall::Top)
    } else if x < radius {
        Some(Wall::Left)
    } else if y + radius > canvas {
        Some(Wall::Bottom)
    } else {
        None
    }
}

/// Position clamped one pixel inside the given wall.
pub fn clamp_inside(wall: Wall, x: i32, y: i32, radius: i32, canvas: i32) -> (i32, i32) {
    match wall {
        Wall::Right => (canvas - radius - 1, y),
        Wall::Top => (x, radius + 1),
        Wall::Left => (radius + 1, y),
        Wall::Bottom => (x, canvas - radius - 1),
    }
}

/// Negates a component and enforces a minimum magnitude on the result. A zero
/// component stays zero; the sign after enforcement is the reflected one.
pub fn reflect_component(v: i32, min_magnitude: i32) -> i32 {
    let reflected = -v;
    if reflected == 0 {
        0
    } else if reflected.abs() < min_magnitude {
        min_magnitude * reflected.signum()
    } else {
        reflected
    }
}

/// Tuning for [`paddle_bounce`], lifted from the arena config.
#[derive(Debug, Clone, Copy)]
pub struct BounceTuning {
    /// K in the deflection term `sin(pi / K)`.
    pub angle_factor: f64,
    /// Fraction of the paddle velocity folded into the ball speed.
    pub speed_factor: f64,
    pub min_speed: i32,
    pub max_speed: i32,
}

/// Computes the ball velocity after a paddle strike.
///
/// The component normal to the paddle is reflected, the hit offset along the paddle
/// adds a tangential deflection of at most `sin(pi / K)` of the speed, and a
/// fraction of the paddle's own motion is folded into the speed, which is then
/// clamped and the direction renormalized. Degenerate directions fall back to the
/// paddle normal pointing into the arena.
pub fn paddle_bounce(
    ball_x: i32,
    ball_y: i32,
    vx: i32,
    vy: i32,
    paddle: &PaddleView,
    tuning: &BounceTuning,
) -> (i32, i32) {
    let Some(wall) = Wall::from_index(paddle.wall) else {
        tracing::warn!(wall = paddle.wall, "Paddle with illegal wall index in bounce.");
        return (vx, vy);
    };

    let mut fvx = vx as f64;
    let mut fvy = vy as f64;
    let speed = (fvx * fvx + fvy * fvy).sqrt();

    match wall.normal_axis() {
        Axis::X => fvx = -fvx,
        Axis::Y => fvy = -fvy,
    }

    // Hit offset along the paddle's long axis, normalized to [-1, 1].
    let (hit, center, half_len) = match wall.motion_axis() {
        Axis::Y => (ball_y, paddle.y + paddle.height / 2, paddle.height / 2),
        Axis::X => (ball_x, paddle.x + paddle.width / 2, paddle.width / 2),
    };
    let offset = ((hit - center) as f64 / half_len.max(1) as f64).clamp(-1.0, 1.0);

    let deflection = offset * speed * (PI / tuning.angle_factor).sin();
    match wall.motion_axis() {
        Axis::Y => fvy += deflection,
        Axis::X => fvx += deflection,
    }

    let length = (fvx * fvx + fvy * fvy).sqrt();
    let (dir_x, dir_y) = if length > 0.0 {
        (fvx / length, fvy / length)
    } else {
        // Degenerate geometry: reflect straight away from the paddle.
        match wall.normal_axis() {
            Axis::X => (wall.inward_sign() as f64, 0.0),
            Axis::Y => (0.0, wall.inward_sign() as f64),
        }
    };

    let paddle_push = paddle.vx as f64 * dir_x + paddle.vy as f64 * dir_y;
    let new_speed = (speed + paddle_push * tuning.speed_factor)
        .clamp(tuning.min_speed as f64, tuning.max_speed as f64);

    cast_velocity(dir_x * new_speed, dir_y * new_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TUNING: BounceTuning =
        BounceTuning { angle_factor: 6.0, speed_factor: 0.3, min_speed: 5, max_speed: 11 };

    fn right_paddle() -> PaddleView {
        PaddleView { index: 0, x: 770, y: 350, width: 20, height: 100, vx: 0, vy: 0, wall: 0 }
    }

    #[test]
    fn tangent_contact_is_not_a_hit() {
        let rect = Rect { x: 100, y: 100, w: 50, h: 50 };
        // Ball exactly radius away from the left edge.
        assert!(!circle_intersects_rect(90, 125, 10, &rect));
        assert!(circle_intersects_rect(91, 125, 10, &rect));
        // Corner case: distance to the corner is sqrt(200) > 14.
        assert!(!circle_intersects_rect(90, 90, 14, &rect));
        assert!(circle_intersects_rect(90, 90, 15, &rect));
    }

    #[test]
    fn wall_order_is_right_top_left_bottom() {
        // A ball out of bounds on two axes resolves to the earlier wall in the order.
        assert_eq!(wall_penetration(799, 5, 10, 800), Some(Wall::Right));
        assert_eq!(wall_penetration(5, 5, 10, 800), Some(Wall::Top));
        assert_eq!(wall_penetration(5, 400, 10, 800), Some(Wall::Left));
        assert_eq!(wall_penetration(400, 795, 10, 800), Some(Wall::Bottom));
        assert_eq!(wall_penetration(400, 400, 10, 800), None);
        // Exact tangency is not a penetration.
        assert_eq!(wall_penetration(790, 400, 10, 800), None);
        assert_eq!(wall_penetration(10, 400, 10, 800), None);
    }

    #[test]
    fn wall_clamp_puts_the_ball_one_pixel_inside() {
        assert_eq!(clamp_inside(Wall::Right, 805, 400, 10, 800), (789, 400));
        assert_eq!(clamp_inside(Wall::Top, 400, 3, 10, 800), (400, 11));
    }

    #[test]
    fn reflect_component_enforces_the_wall_minimum() {
        assert_eq!(reflect_component(10, 2), -10);
        assert_eq!(reflect_component(-1, 2), 2);
        assert_eq!(reflect_component(1, 2), -2);
        assert_eq!(reflect_component(0, 2), 0);
    }

    #[test]
    fn centered_hit_reflects_straight_back() {
        let paddle = right_paddle();
        let (vx, vy) = paddle_bounce(760, 400, 10, 0, &paddle, &TUNING);
        assert_eq!((vx, vy), (-10, 0));
    }

    #[test]
    fn edge_hits_deflect_along_the_paddle() {
        let paddle = right_paddle();
        // Hit near the top edge of the paddle: deflection pulls the ball upward.
        let (vx, vy) = paddle_bounce(760, 355, 10, 0, &paddle, &TUNING);
        assert!(vx < 0);
        assert!(vy < 0, "expected upward deflection, got vy {}", vy);
        // And near the bottom edge, downward.
        let (_, vy) = paddle_bounce(760, 445, 10, 0, &paddle, &TUNING);
        assert!(vy > 0);
    }

    #[test]
    fn moving_paddle_feeds_speed_into_the_ball() {
        let still = right_paddle();
        let mut moving = right_paddle();
        moving.vy = 12;
        // Hit below center so the outgoing direction has a downward component
        // for the paddle motion to project onto.
        let (svx, svy) = paddle_bounce(760, 430, 9, 0, &still, &TUNING);
        let (mvx, mvy) = paddle_bounce(760, 430, 9, 0, &moving, &TUNING);
        let still_speed = (svx * svx + svy * svy) as f64;
        let moving_speed = (mvx * mvx + mvy * mvy) as f64;
        assert!(moving_speed >= still_speed);
    }

    #[test]
    fn bounce_speed_respects_the_bounds() {
        let paddle = right_paddle();
        // A crawling ball gets pushed back out at least at the minimum speed.
        let (vx, vy) = paddle_bounce(760, 400, 2, 0, &paddle, &TUNING);
        let speed_sq = vx * vx + vy * vy;
        assert!(speed_sq >= TUNING.min_speed * TUNING.min_speed);
        // A fast ball is capped at the maximum.
        let (vx, vy) = paddle_bounce(760, 400, 40, 0, &paddle, &TUNING);
        let speed_sq = vx * vx + vy * vy;
        assert!(speed_sq <= (TUNING.max_speed + 1) * (TUNING.max_speed + 1));
    }
}
