use glam::Vec2;
use serde::Deserialize;

/// Part of a segment which is nearest to a query point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearestFeature {
    First,
    Middle,
    Last,
}

/// Oriented line segment `p0 -> p1` with its outward normal.
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: usize,
    pub p0: Vec2,
    pub p1: Vec2,
    pub unit_dir: Vec2,
    pub normal: Vec2,
    pub length: f32,
    /// Following segment in the chain, sharing `p1` as its `p0`.
    pub next: Option<usize>,
}

impl Obstacle {
    pub fn new(id: usize, p0: Vec2, p1: Vec2) -> Self {
        let d = p1 - p0;
        let length = d.length();
        let unit_dir = d.normalize_or_zero();

        Obstacle {
            id,
            p0,
            p1,
            unit_dir,
            normal: Vec2::new(unit_dir.y, -unit_dir.x),
            length,
            next: None,
        }
    }

    /// Nearest point of the segment to `point`, the squared distance to it and
    /// the feature it lies on.
    pub fn nearest_point(&self, point: Vec2) -> (Vec2, f32, NearestFeature) {
        let t = if self.length > 0.0 {
            (point - self.p0).dot(self.unit_dir) / self.length
        } else {
            0.0
        };

        let (nearest, feature) = if t <= 0.0 {
            (self.p0, NearestFeature::First)
        } else if t >= 1.0 {
            (self.p1, NearestFeature::Last)
        } else {
            (self.p0 + (self.p1 - self.p0) * t, NearestFeature::Middle)
        };
        (nearest, nearest.distance_squared(point), feature)
    }

    /// Whether this segment is responsible for interactions through `feature`.
    ///
    /// The end vertex of a chained segment belongs to its successor.
    pub fn owns(&self, feature: NearestFeature) -> bool {
        !(feature == NearestFeature::Last && self.next.is_some())
    }
}

/// Polyline description of obstacle geometry.
///
/// Closed polylines should be wound counter-clockwise so that the normals
/// point outward.
#[derive(Debug, Clone, Deserialize)]
pub struct ObstacleConfig {
    pub vertices: Vec<Vec2>,
    #[serde(default)]
    pub closed: bool,
}

/// Split polylines into chained segments with stable ids.
pub fn build_obstacles(configs: &[ObstacleConfig]) -> Vec<Obstacle> {
    let mut obstacles = Vec::new();

    for config in configs {
        let n = config.vertices.len();
        if n < 2 {
            continue;
        }

        let segment_count = if config.closed && n > 2 { n } else { n - 1 };
        let first = obstacles.len();

        for i in 0..segment_count {
            let p0 = config.vertices[i];
            let p1 = config.vertices[(i + 1) % n];
            let id = obstacles.len();
            let mut obstacle = Obstacle::new(id, p0, p1);

            if i + 1 < segment_count {
                obstacle.next = Some(id + 1);
            } else if segment_count == n {
                obstacle.next = Some(first);
            }
            obstacles.push(obstacle);
        }
    }

    obstacles
}
