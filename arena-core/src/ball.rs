//! The ball record and its velocity rules. Every velocity mutation funnels through
//! the minimum-magnitude enforcement: an axis that was moving never truncates to
//! zero, so a slow ball cannot lose a component and stick to a wall.

use protocol::BallView;

use crate::collision::Axis;

/// Authoritative ball state, owned by one `BallActor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ball {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub vx: i32,
    pub vy: i32,
    pub radius: i32,
    pub mass: i32,
    /// Player index of the last paddle to strike the ball, -1 for ownerless.
    pub owner: i32,
    pub phasing: bool,
    pub permanent: bool,
}

impl Ball {
    /// One integration step.
    pub fn advance(&mut self) {
        self.x += self.vx;
        self.y += self.vy;
    }

    /// Overwrites the velocity. A zero component on an axis that was moving is
    /// bumped to magnitude 1 with the previous sign; if the whole vector would
    /// come out zero while the ball was moving, it falls back to vx = +1.
    pub fn set_velocity(&mut self, vx: i32, vy: i32) {
        let was_moving = self.vx != 0 || self.vy != 0;
        let new_vx = keep_axis_alive(vx, self.vx);
        let new_vy = keep_axis_alive(vy, self.vy);
        if new_vx == 0 && new_vy == 0 && was_moving {
            self.vx = 1;
            self.vy = 0;
        } else {
            self.vx = new_vx;
            self.vy = new_vy;
        }
    }

    /// Negates one component. A zero component stays zero.
    pub fn reflect(&mut self, axis: Axis) {
        match axis {
            Axis::X => self.vx = -self.vx,
            Axis::Y => self.vy = -self.vy,
        }
    }

    /// Scales both components by `ratio`, flooring to integers. Non-zero components
    /// keep their sign and at least magnitude 1.
    pub fn increase_velocity(&mut self, ratio: f64) {
        self.vx = scale_component(self.vx, ratio);
        self.vy = scale_component(self.vy, ratio);
    }

    /// Mass gain from the mass power-up; the radius grows along and is floored at 1.
    pub fn increase_mass(&mut self, add: i32, radius_scale: i32) {
        self.mass += add;
        self.radius = (self.radius + add * radius_scale).max(1);
    }

    /// Wire snapshot. The collided flag is presentation state owned by the arena
    /// coordinator, so it is always false here.
    pub fn view(&self) -> BallView {
        BallView {
            id: self.id,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            radius: self.radius,
            mass: self.mass,
            owner_index: self.owner,
            phasing: self.phasing,
            permanent: self.permanent,
            collided: false,
        }
    }
}

/// New value for one component, keeping a previously moving axis alive.
fn keep_axis_alive(new: i32, previous: i32) -> i32 {
    if new == 0 && previous != 0 { previous.signum() } else { new }
}

fn scale_component(v: i32, ratio: f64) -> i32 {
    if v == 0 {
        return 0;
    }
    let scaled = (v as f64 * ratio).floor() as i32;
    if scaled == 0 { v.signum() } else { scaled }
}

/// Casts a float velocity to integers. A non-zero float component never truncates to
/// zero; if both integers still come out zero the component with the larger float
/// magnitude gets sign-matched magnitude 1, and as the last resort vx becomes +1.
pub fn cast_velocity(fvx: f64, fvy: f64) -> (i32, i32) {
    let vx = cast_component(fvx);
    let vy = cast_component(fvy);
    if vx != 0 || vy != 0 {
        return (vx, vy);
    }
    if fvx == 0.0 && fvy == 0.0 {
        // Pathological geometry; the caller decides direction before casting, so
        // reaching this means there is none left. Push right.
        return (1, 0);
    }
    if fvx.abs() >= fvy.abs() {
        (if fvx >= 0.0 { 1 } else { -1 }, 0)
    } else {
        (0, if fvy >= 0.0 { 1 } else { -1 })
    }
}

fn cast_component(v: f64) -> i32 {
    let cast = v as i32;
    if cast == 0 && v != 0.0 {
        if v > 0.0 { 1 } else { -1 }
    } else {
        cast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ball(vx: i32, vy: i32) -> Ball {
        Ball {
            id: 1,
            x: 400,
            y: 400,
            vx,
            vy,
            radius: 10,
            mass: 1,
            owner: -1,
            phasing: false,
            permanent: true,
        }
    }

    #[test]
    fn set_velocity_keeps_moving_axes_alive() {
        let mut b = ball(5, -3);
        b.set_velocity(0, 4);
        assert_eq!((b.vx, b.vy), (1, 4));
        let mut b = ball(-5, 3);
        b.set_velocity(0, 0);
        assert_eq!((b.vx, b.vy), (-1, 1));
    }

    #[test]
    fn set_velocity_on_resting_ball_may_stay_zero() {
        let mut b = ball(0, 0);
        b.set_velocity(0, 0);
        assert_eq!((b.vx, b.vy), (0, 0));
    }

    #[test]
    fn double_reflection_restores_velocity() {
        let mut b = ball(7, -4);
        b.reflect(Axis::X);
        assert_eq!((b.vx, b.vy), (-7, -4));
        b.reflect(Axis::X);
        assert_eq!((b.vx, b.vy), (7, -4));
    }

    #[test]
    fn increase_velocity_floors_and_keeps_signs() {
        let mut b = ball(5, -5);
        b.increase_velocity(1.1);
        assert_eq!((b.vx, b.vy), (5, -6));
        let mut b = ball(1, 0);
        b.increase_velocity(1.1);
        assert_eq!((b.vx, b.vy), (1, 0));
    }

    #[test]
    fn mass_gain_never_shrinks_the_radius() {
        let mut b = ball(5, 5);
        b.increase_mass(1, 1);
        assert_eq!(b.mass, 2);
        assert_eq!(b.radius, 11);
        b.increase_mass(1, 0);
        assert_eq!(b.radius, 11);
    }

    #[test]
    fn cast_preserves_nonzero_float_components() {
        assert_eq!(cast_velocity(0.4, -9.7), (1, -9));
        assert_eq!(cast_velocity(-0.2, 0.3), (-1, 1));
        assert_eq!(cast_velocity(0.0, 0.0), (1, 0));
    }

    proptest! {
        #[test]
        fn reflection_is_an_involution(vx in -50i32..50, vy in -50i32..50) {
            let mut b = ball(vx, vy);
            b.reflect(Axis::Y);
            b.reflect(Axis::Y);
            prop_assert_eq!((b.vx, b.vy), (vx, vy));
        }

        #[test]
        fn moving_balls_never_stop_dead(
            vx in -20i32..20, vy in -20i32..20,
            nvx in -20i32..20, nvy in -20i32..20,
        ) {
            prop_assume!(vx != 0 || vy != 0);
            let mut b = ball(vx, vy);
            b.set_velocity(nvx, nvy);
            prop_assert!(b.vx != 0 || b.vy != 0);
        }

        #[test]
        fn cast_never_zeroes_a_nonzero_float(fx in -20.0f64..20.0, fy in -20.0f64..20.0) {
            let (vx, vy) = cast_velocity(fx, fy);
            if fx != 0.0 {
                prop_assert!(vx != 0);
            }
            if fy != 0.0 {
                prop_assert!(vy != 0);
            }
        }
    }
}
