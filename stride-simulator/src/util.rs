use glam::Vec2;
use num_traits::PrimInt;

/// Threshold below which squared lengths and determinants are treated as zero.
pub const EPSILON: f32 = 1e-5;

/// Cell of the neighbor grid, usable as an [`ndarray::Array2`] index.
///
/// Negative coordinates never index a cell.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Index {
    pub y: i32,
    pub x: i32,
}

impl Index {
    pub fn new<T: PrimInt>(x: T, y: T) -> Self {
        Index {
            x: x.to_i32().unwrap_or(i32::MAX),
            y: y.to_i32().unwrap_or(i32::MAX),
        }
    }
}

unsafe impl ndarray::NdIndex<ndarray::Ix2> for Index {
    fn index_checked(&self, dim: &ndarray::Ix2, strides: &ndarray::Ix2) -> Option<isize> {
        if self.x.is_negative() || self.y.is_negative() {
            None
        } else {
            (self.y as usize, self.x as usize).index_checked(dim, strides)
        }
    }

    fn index_unchecked(&self, strides: &ndarray::Ix2) -> isize {
        (self.y as usize, self.x as usize).index_unchecked(strides)
    }
}

/// 2D cross product (determinant of the matrix `[a b]`).
#[inline]
pub fn det(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Calculate the offset from the nearest point of a line segment to `point`.
pub fn distance_from_line(point: Vec2, line: [Vec2; 2]) -> Vec2 {
    let a = point - line[0];
    let b = line[1] - line[0];
    let b_len2 = b.length_squared();

    if b_len2 == 0.0 {
        a
    } else {
        let t = (a.dot(b) / b_len2).clamp(0.0, 1.0);
        a - t * b
    }
}

/// Rotate `v` by the rotation whose cosine and sine are given.
#[inline]
pub fn rotate(v: Vec2, cos: f32, sin: f32) -> Vec2 {
    Vec2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
}

/// Integrate an acceleration over one time step.
///
/// The acceleration is clamped to `max_accel` and the resulting velocity to
/// `max_speed`.
pub fn integrate_velocity(
    velocity: Vec2,
    acceleration: Vec2,
    max_accel: f32,
    max_speed: f32,
    time_step: f32,
) -> Vec2 {
    let acceleration = acceleration.clamp_length_max(max_accel);
    (velocity + acceleration * time_step).clamp_length_max(max_speed)
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::vec2;
    use ndarray::Array2;

    use super::*;

    #[test]
    fn test_distance_from_line() {
        let line = [vec2(1.0, 1.0), vec2(4.0, 1.0)];

        assert_float_absolute_eq!(distance_from_line(vec2(2.0, 3.0), line).length(), 2.0);
        assert_float_absolute_eq!(distance_from_line(vec2(0.0, 0.25), line).length(), 1.25);
        assert_float_absolute_eq!(distance_from_line(vec2(5.0, 1.0), line).x, 1.0);
    }

    #[test]
    fn test_distance_from_degenerate_line() {
        let line = [vec2(1.0, 1.0), vec2(1.0, 1.0)];
        let offset = distance_from_line(vec2(4.0, 5.0), line);

        assert_float_absolute_eq!(offset.length(), 5.0);
    }

    #[test]
    fn test_det() {
        assert_float_absolute_eq!(det(Vec2::X, Vec2::Y), 1.0);
        assert_float_absolute_eq!(det(Vec2::Y, Vec2::X), -1.0);
        assert_float_absolute_eq!(det(vec2(2.0, 1.0), vec2(4.0, 2.0)), 0.0);
    }

    #[test]
    fn test_index() {
        let grid = Array2::from_shape_fn((2, 3), |(y, x)| y * 10 + x);

        assert_eq!(grid.get(Index::new(2, 1)), Some(&12));
        assert_eq!(grid.get(Index::new(3, 1)), None);
        assert_eq!(grid.get(Index::new(-1, 0)), None);
    }

    #[test]
    fn test_integrate_velocity_clamps_acceleration() {
        let v = integrate_velocity(Vec2::ZERO, vec2(100.0, 0.0), 5.0, 10.0, 0.1);
        assert_float_absolute_eq!(v.x, 0.5);
        assert_float_absolute_eq!(v.y, 0.0);

        let v = integrate_velocity(vec2(2.0, 0.0), vec2(5.0, 0.0), 5.0, 2.0, 0.1);
        assert_float_absolute_eq!(v.length(), 2.0);
    }
}
