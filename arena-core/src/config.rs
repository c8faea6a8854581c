//! The tunable parameters of one arena. Loaded from `ArenaConfig.json` if present,
//! otherwise the defaults below apply. Validation is fail-fast: a config that cannot
//! describe a playable arena is rejected at construction time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// All tuning knobs for one arena. JSON keys are camelCase; missing keys fall back
/// to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Side length of the square canvas in pixels.
    pub canvas_size: i32,
    /// Cells per grid side. Must be at least 6 and divide the canvas size.
    pub grid_size: u32,
    pub ball_radius: i32,
    pub ball_mass: i32,
    /// Lower bound for the magnitude of a freshly rolled velocity component.
    pub min_ball_velocity: i32,
    /// Upper bound for the ball speed after a paddle hit.
    pub max_ball_velocity: i32,
    /// Minimum magnitude of the reflected component after a wall hit, so a slow
    /// ball cannot loiter inside the wall region.
    pub min_wall_reflect_velocity: i32,
    pub ball_phasing_time_ms: u64,
    /// K in the paddle deflection term `sin(pi / K)`; 6 caps the deflection at 30 degrees.
    pub ball_hit_paddle_angle_factor: f64,
    /// Fraction of the paddle velocity transferred into the ball speed.
    pub ball_hit_paddle_speed_factor: f64,
    pub power_up_chance: f64,
    pub power_up_spawn_ball_expiry_ms: u64,
    pub power_up_increase_mass_add: i32,
    /// Radius gained per point of mass from the mass power-up.
    pub power_up_increase_mass_size: i32,
    pub power_up_increase_vel_ratio: f64,
    pub initial_score: i64,
    pub game_tick_period_ms: u64,
    pub max_players: u8,
    /// Probability that a quadrant cell holds a brick in the initial fill.
    pub brick_density: f64,
    /// Bricks start with a life (= level) drawn from `1..=brick_max_life`.
    pub brick_max_life: u32,
    pub paddle_length: i32,
    pub paddle_thickness: i32,
    pub paddle_speed: i32,
    /// Gap between the canvas edge and the paddle face.
    pub wall_gap: i32,
    /// Fixed seed for the arena RNG. Absent means seeded from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            canvas_size: 800,
            grid_size: 16,
            ball_radius: 10,
            ball_mass: 1,
            min_ball_velocity: 5,
            max_ball_velocity: 11,
            min_wall_reflect_velocity: 2,
            ball_phasing_time_ms: 400,
            ball_hit_paddle_angle_factor: 6.0,
            ball_hit_paddle_speed_factor: 0.3,
            power_up_chance: 0.25,
            power_up_spawn_ball_expiry_ms: 10_000,
            power_up_increase_mass_add: 1,
            power_up_increase_mass_size: 1,
            power_up_increase_vel_ratio: 1.1,
            initial_score: 0,
            game_tick_period_ms: 16,
            max_players: 4,
            brick_density: 0.4,
            brick_max_life: 3,
            paddle_length: 100,
            paddle_thickness: 20,
            paddle_speed: 12,
            wall_gap: 10,
            rng_seed: None,
        }
    }
}

impl GameConfig {
    /// Parses a JSON config and validates it.
    pub fn from_json(json: &str) -> Result<GameConfig, String> {
        let cfg: GameConfig =
            serde_json::from_str(json).map_err(|e| format!("Failed to parse config JSON: {}", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that the parameters describe a playable arena. This is the only place
    /// the simulation is allowed to fail hard.
    pub fn validate(&self) -> Result<(), String> {
        if self.canvas_size <= 0 {
            return Err(format!("canvasSize must be positive, got {}", self.canvas_size));
        }
        if self.grid_size < 6 {
            return Err(format!("gridSize must be at least 6, got {}", self.grid_size));
        }
        if self.canvas_size % self.grid_size as i32 != 0 {
            return Err(format!(
                "gridSize {} does not divide canvasSize {}",
                self.grid_size, self.canvas_size
            ));
        }
        if self.ball_radius < 1 {
            return Err(format!("ballRadius must be at least 1, got {}", self.ball_radius));
        }
        if self.min_ball_velocity < 1 || self.min_ball_velocity > self.max_ball_velocity {
            return Err(format!(
                "ball velocity bounds are inconsistent: min {} max {}",
                self.min_ball_velocity, self.max_ball_velocity
            ));
        }
        if self.min_wall_reflect_velocity < 1 {
            return Err(format!(
                "minWallReflectVelocity must be at least 1, got {}",
                self.min_wall_reflect_velocity
            ));
        }
        if self.max_players == 0 || self.max_players > 4 {
            return Err(format!("maxPlayers must be in 1..=4, got {}", self.max_players));
        }
        if !(0.0..=1.0).contains(&self.power_up_chance) {
            return Err(format!("powerUpChance must be in [0, 1], got {}", self.power_up_chance));
        }
        if !(0.0..=1.0).contains(&self.brick_density) {
            return Err(format!("brickDensity must be in [0, 1], got {}", self.brick_density));
        }
        if self.brick_max_life < 1 {
            return Err(format!("brickMaxLife must be at least 1, got {}", self.brick_max_life));
        }
        if self.ball_hit_paddle_angle_factor < 2.0 {
            return Err(format!(
                "ballHitPaddleAngleFactor must be at least 2, got {}",
                self.ball_hit_paddle_angle_factor
            ));
        }
        if self.game_tick_period_ms == 0 {
            return Err("gameTickPeriodMs must be positive".to_string());
        }
        if self.paddle_length <= 0
            || self.paddle_thickness <= 0
            || self.paddle_length + 2 * self.wall_gap > self.canvas_size
        {
            return Err(format!(
                "paddle geometry (length {}, thickness {}, gap {}) does not fit the canvas",
                self.paddle_length, self.paddle_thickness, self.wall_gap
            ));
        }
        Ok(())
    }

    /// Pixel side length of one grid cell.
    pub fn cell_size(&self) -> i32 {
        self.canvas_size / self.grid_size as i32
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.game_tick_period_ms)
    }

    pub fn phasing_time(&self) -> Duration {
        Duration::from_millis(self.ball_phasing_time_ms)
    }

    pub fn spawn_ball_expiry(&self) -> Duration {
        Duration::from_millis(self.power_up_spawn_ball_expiry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GameConfig::default().validate().unwrap();
    }

    #[test]
    fn grid_size_bounds() {
        let mut cfg = GameConfig { canvas_size: 600, grid_size: 6, ..GameConfig::default() };
        cfg.validate().unwrap();
        cfg.grid_size = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn grid_must_divide_canvas() {
        let cfg = GameConfig { canvas_size: 800, grid_size: 7, ..GameConfig::default() };
        assert!(cfg.validate().is_err());
        let cfg = GameConfig { canvas_size: 800, grid_size: 8, ..GameConfig::default() };
        cfg.validate().unwrap();
        assert_eq!(cfg.cell_size(), 100);
    }

    #[test]
    fn json_overrides_use_camel_case() {
        let cfg = GameConfig::from_json(r#"{"canvasSize": 640, "gridSize": 8, "rngSeed": 42}"#)
            .unwrap();
        assert_eq!(cfg.canvas_size, 640);
        assert_eq!(cfg.grid_size, 8);
        assert_eq!(cfg.rng_seed, Some(42));
        // Untouched keys keep their defaults.
        assert_eq!(cfg.ball_radius, 10);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(GameConfig::from_json("{nope").is_err());
        assert!(GameConfig::from_json(r#"{"gridSize": 5}"#).is_err());
    }
}
