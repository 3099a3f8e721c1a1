use glam::Vec2;
use ndarray::Array2;
use thin_vec::ThinVec;

use crate::util::Index;

/// Upper bound of cells per agent before the cell size is widened.
const MAX_CELLS_PER_AGENT: usize = 16;
const MIN_CELLS: usize = 4096;

/// Uniform bucket grid over agent positions.
///
/// The grid covers the bounding box of the positions given to the last
/// [`NeighborGrid::update`] call.
pub struct NeighborGrid {
    pub data: Array2<ThinVec<u32>>,
    pub unit: f32,
    pub origin: Vec2,
    pub shape: (usize, usize),
    base_unit: f32,
}

impl NeighborGrid {
    pub fn new(unit: f32) -> Self {
        NeighborGrid {
            data: Array2::from_elem((0, 0), ThinVec::new()),
            unit,
            origin: Vec2::ZERO,
            shape: (0, 0),
            base_unit: unit,
        }
    }

    pub fn update(&mut self, positions: &[Vec2]) {
        let (min, max) = positions
            .iter()
            .fold((Vec2::INFINITY, Vec2::NEG_INFINITY), |(min, max), &p| {
                (min.min(p), max.max(p))
            });

        if positions.is_empty() || !min.is_finite() || !max.is_finite() {
            self.origin = Vec2::ZERO;
            self.shape = (0, 0);
            self.data = Array2::from_elem((0, 0), ThinVec::new());
            return;
        }

        let extent = max - min;
        let max_cells = (positions.len() * MAX_CELLS_PER_AGENT).max(MIN_CELLS);
        let mut unit = self.base_unit;
        let area = (extent.x / unit + 1.0) * (extent.y / unit + 1.0);
        if area > max_cells as f32 {
            unit *= (area / max_cells as f32).sqrt();
        }

        let cells = (extent / unit).floor();
        let shape = (cells.y as usize + 1, cells.x as usize + 1);

        if shape == self.shape {
            self.data.iter_mut().for_each(|cell| cell.clear());
        } else {
            self.data = Array2::from_elem(shape, ThinVec::new());
        }
        self.unit = unit;
        self.origin = min;
        self.shape = shape;

        for (i, &pos) in positions.iter().enumerate() {
            if let Some(neighbors) = self.data.get_mut(self.cell_of(pos)) {
                if !neighbors.has_capacity() {
                    neighbors.reserve(16);
                }
                neighbors.push(i as u32);
            }
        }
    }

    pub fn cell_of(&self, pos: Vec2) -> Index {
        let ix = ((pos - self.origin) / self.unit).floor().as_ivec2();
        Index::new(ix.x, ix.y)
    }

    /// Visit every agent index stored in cells overlapping the square
    /// `[point - radius, point + radius]`.
    pub fn for_each_candidate(&self, point: Vec2, radius: f32, mut f: impl FnMut(u32)) {
        if self.shape.0 == 0 || self.shape.1 == 0 {
            return;
        }

        let lo = self.cell_of(point - Vec2::splat(radius));
        let hi = self.cell_of(point + Vec2::splat(radius));
        let x_max = self.shape.1 as i32 - 1;
        let y_max = self.shape.0 as i32 - 1;

        if hi.x < 0 || hi.y < 0 || lo.x > x_max || lo.y > y_max {
            return;
        }

        for y in lo.y.max(0)..=hi.y.min(y_max) {
            for x in lo.x.max(0)..=hi.x.min(x_max) {
                if let Some(cell) = self.data.get(Index::new(x, y)) {
                    cell.iter().for_each(|&i| f(i));
                }
            }
        }
    }
}
