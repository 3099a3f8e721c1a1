use std::f32::consts::TAU;

use fastrand_contrib::RngExt;
use glam::Vec2;
use serde::Deserialize;

use crate::util::rotate;

/// Slack allowed when counting how many lattice points fit in a row.
const FIT_TOLERANCE: f32 = 1e-4;

/// Deterministic source of initial agent positions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generator {
    Explicit {
        positions: Vec<Vec2>,
    },
    /// `count_x` by `count_y` grid, spaced by `offset`, rotated about `anchor`.
    RectGrid {
        anchor: Vec2,
        offset: Vec2,
        count_x: usize,
        count_y: usize,
        /// Counter-clockwise rotation. (degrees)
        #[serde(default)]
        rotation: f32,
    },
    /// Hexagonal lattice filling a box of `width` from its front edge.
    HexLattice {
        anchor: Vec2,
        #[serde(default)]
        alignment: Alignment,
        #[serde(default)]
        row_direction: RowDirection,
        /// Agents per square meter.
        density: f32,
        width: f32,
        /// Minimum number of agents; the last row is always completed.
        population: usize,
        /// Counter-clockwise rotation. (degrees)
        #[serde(default)]
        rotation: f32,
    },
}

/// Placement of the lattice front edge relative to the anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Center,
    Left,
    Right,
}

/// Axis along which lattice rows are formed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowDirection {
    #[default]
    X,
    Y,
}

impl Generator {
    pub fn positions(&self) -> Vec<Vec2> {
        match *self {
            Generator::Explicit { ref positions } => positions.clone(),
            Generator::RectGrid {
                anchor,
                offset,
                count_x,
                count_y,
                rotation,
            } => {
                let (sin, cos) = rotation.to_radians().sin_cos();
                (0..count_x * count_y)
                    .map(|i| {
                        let local = Vec2::new((i % count_x) as f32, (i / count_x) as f32) * offset;
                        anchor + rotate(local, cos, sin)
                    })
                    .collect()
            }
            Generator::HexLattice {
                anchor,
                alignment,
                row_direction,
                density,
                width,
                population,
                rotation,
            } => {
                let (sin, cos) = rotation.to_radians().sin_cos();
                hex_lattice(alignment, row_direction, density, width, population)
                    .into_iter()
                    .map(|local| anchor + rotate(local, cos, sin))
                    .collect()
            }
        }
    }

    /// Check the parameters, returning a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Generator::HexLattice { density, width, .. } => {
                if density.is_nan() || density <= 0.0 {
                    Err(format!("hex lattice density must be positive, got {density}"))
                } else if width.is_nan() || width <= 0.0 {
                    Err(format!("hex lattice width must be positive, got {width}"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// Lattice points in the frame of the box: the front edge lies on the x axis
/// and the box extends toward +y.
fn hex_lattice(
    alignment: Alignment,
    row_direction: RowDirection,
    density: f32,
    width: f32,
    population: usize,
) -> Vec<Vec2> {
    // Nearest neighbor spacing of a hexagonal lattice with the given density.
    let d = (2.0 / (3f32.sqrt() * density)).sqrt();
    let row_gap = d * 3f32.sqrt() * 0.5;
    let fit = |length: f32, spacing: f32| (length / spacing + FIT_TOLERANCE).floor() as usize;

    let mut points = Vec::with_capacity(population);
    match row_direction {
        RowDirection::X => {
            let mut row = 0;
            while points.len() < population {
                let start = if row % 2 == 0 { d * 0.5 } else { d };
                let count = fit(width - start + d * 0.5, d).max(1);
                let y = row as f32 * row_gap;
                points.extend((0..count).map(|i| Vec2::new(start + i as f32 * d, y)));
                row += 1;
            }
        }
        RowDirection::Y => {
            let columns = fit(width, row_gap).max(1);
            let mut layer = 0;
            while points.len() < population {
                points.extend((0..columns).map(|c| {
                    let shift = if c % 2 == 0 { 0.0 } else { d * 0.5 };
                    Vec2::new((c as f32 + 0.5) * row_gap, layer as f32 * d + shift)
                }));
                layer += 1;
            }
        }
    }

    let shift = match alignment {
        Alignment::Center => -width * 0.5,
        Alignment::Left => 0.0,
        Alignment::Right => -width,
    };
    points.iter_mut().for_each(|p| p.x += shift);
    points
}

/// Scalar distribution sampled from a seeded generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Constant { value: f32 },
    Uniform { min: f32, max: f32 },
    Normal { mean: f32, std_dev: f32 },
}

impl Distribution {
    pub fn sample(&self, rng: &mut fastrand::Rng) -> f32 {
        match *self {
            Distribution::Constant { value } => value,
            Distribution::Uniform { min, max } => min + (max - min) * rng.f32(),
            Distribution::Normal { mean, std_dev } => rng.f32_normal_approx(mean, std_dev),
        }
    }
}

/// Displace `pos` by a distance drawn from `distance` in a uniformly random
/// direction.
pub fn perturb(pos: Vec2, distance: &Distribution, rng: &mut fastrand::Rng) -> Vec2 {
    let angle = rng.f32() * TAU;
    pos + Vec2::from_angle(angle) * distance.sample(rng)
}
