//! The destructible brick field. One quadrant is randomized, made symmetric across
//! its own diagonal, then mirrored across both canvas axes, so the field looks the
//! same from every player's wall.

use protocol::CellView;
use rand::Rng;

use crate::collision::Rect;
use crate::config::GameConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Empty,
    Brick,
}

/// One grid cell. The struct persists for the arena lifetime; destruction only
/// flips the kind to empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub col: u32,
    pub row: u32,
    pub kind: CellKind,
    pub life: u32,
    /// Initial life; the score awarded when the brick falls.
    pub level: u32,
}

/// Outcome of one point of brick damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrickDamage {
    Damaged { life: u32 },
    Destroyed { level: u32 },
}

/// Square cell matrix covering the canvas.
#[derive(Debug, Clone)]
pub struct Grid {
    size: u32,
    cell_size: i32,
    cells: Vec<Cell>,
}

impl Grid {
    /// The initial symmetric fill. Cell levels are drawn from
    /// `1..=brick_max_life` with probability `brick_density` for one quadrant,
    /// the quadrant is mirrored across its diagonal and then across both axes.
    pub fn generate(cfg: &GameConfig, rng: &mut impl Rng) -> Grid {
        let n = cfg.grid_size as usize;
        let half = n.div_ceil(2);

        // Level per quadrant cell, 0 for empty, symmetric across the diagonal.
        let mut quadrant = vec![0u32; half * half];
        for row in 0..half {
            for col in row..half {
                let level = if rng.random_bool(cfg.brick_density) {
                    rng.random_range(1..=cfg.brick_max_life)
                } else {
                    0
                };
                quadrant[row * half + col] = level;
                quadrant[col * half + row] = level;
            }
        }

        let mut cells = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                let qc = col.min(n - 1 - col);
                let qr = row.min(n - 1 - row);
                let level = quadrant[qr * half + qc];
                cells.push(Cell {
                    col: col as u32,
                    row: row as u32,
                    kind: if level > 0 { CellKind::Brick } else { CellKind::Empty },
                    life: level,
                    level,
                });
            }
        }
        Grid { size: cfg.grid_size, cell_size: cfg.cell_size(), cells }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&Cell> {
        if col >= self.size || row >= self.size {
            tracing::warn!(col, row, size = self.size, "Cell lookup out of grid bounds.");
            return None;
        }
        Some(&self.cells[(row * self.size + col) as usize])
    }

    /// True if the cell exists and currently holds a brick.
    pub fn is_brick(&self, col: u32, row: u32) -> bool {
        self.cell(col, row).is_some_and(|c| c.kind == CellKind::Brick)
    }

    /// Pixel rectangle covered by a cell.
    pub fn cell_rect(&self, col: u32, row: u32) -> Rect {
        Rect {
            x: col as i32 * self.cell_size,
            y: row as i32 * self.cell_size,
            w: self.cell_size,
            h: self.cell_size,
        }
    }

    /// Inclusive cell index range covered by a circle, clamped to the grid.
    /// A degenerate circle yields a single-cell range at its center.
    pub fn candidate_cells(&self, x: i32, y: i32, radius: i32) -> (u32, u32, u32, u32) {
        let max = self.size as i32 - 1;
        let clamp = |v: i32| v.clamp(0, max) as u32;
        let col_min = clamp((x - radius).div_euclid(self.cell_size));
        let col_max = clamp((x + radius).div_euclid(self.cell_size));
        let row_min = clamp((y - radius).div_euclid(self.cell_size));
        let row_max = clamp((y + radius).div_euclid(self.cell_size));
        (col_min, col_max, row_min, row_max)
    }

    /// Takes one life from a brick. Returns None when the cell is out of bounds or
    /// no longer a brick, which is a normal race with a phasing damage round-trip.
    pub fn damage(&mut self, col: u32, row: u32) -> Option<BrickDamage> {
        if col >= self.size || row >= self.size {
            tracing::warn!(col, row, size = self.size, "Brick damage out of grid bounds.");
            return None;
        }
        let cell = &mut self.cells[(row * self.size + col) as usize];
        if cell.kind != CellKind::Brick || cell.life == 0 {
            return None;
        }
        cell.life -= 1;
        if cell.life == 0 {
            cell.kind = CellKind::Empty;
            Some(BrickDamage::Destroyed { level: cell.level })
        } else {
            Some(BrickDamage::Damaged { life: cell.life })
        }
    }

    /// Forces one cell to hold a brick. Arena setup only.
    pub fn place_brick(&mut self, col: u32, row: u32, life: u32) {
        if col >= self.size || row >= self.size || life == 0 {
            tracing::warn!(col, row, life, "Ignoring illegal brick placement.");
            return;
        }
        let cell = &mut self.cells[(row * self.size + col) as usize];
        cell.kind = CellKind::Brick;
        cell.life = life;
        cell.level = life;
    }

    /// Wire views of every standing brick.
    pub fn brick_views(&self) -> Vec<CellView> {
        self.cells
            .iter()
            .filter(|c| c.kind == CellKind::Brick)
            .map(|c| CellView { col: c.col, row: c.row, life: c.life, level: c.level })
            .collect()
    }
}
