use glam::Vec2;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::{obstacle::Obstacle, util::distance_from_line};

/// Entry stored in the R-tree: a segment with the id of its obstacle.
#[derive(Debug, Clone)]
struct SegmentEntry {
    id: usize,
    p0: [f32; 2],
    p1: [f32; 2],
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.p0, self.p1)
    }
}

impl PointDistance for SegmentEntry {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        distance_from_line(Vec2::from(*point), [self.p0.into(), self.p1.into()]).length_squared()
    }
}

/// R-tree over static obstacle segments.
pub struct ObstacleTree {
    tree: RTree<SegmentEntry>,
}

impl ObstacleTree {
    pub fn new(obstacles: &[Obstacle]) -> Self {
        let entries = obstacles
            .iter()
            .map(|o| SegmentEntry {
                id: o.id,
                p0: o.p0.into(),
                p1: o.p1.into(),
            })
            .collect();

        ObstacleTree {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Ids and squared distances of every segment within `radius` of `point`,
    /// in no particular order.
    pub fn within(&self, point: [f32; 2], radius: f32) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.tree
            .locate_within_distance(point, radius * radius)
            .map(move |entry| (entry.id, entry.distance_2(&point)))
    }
}
