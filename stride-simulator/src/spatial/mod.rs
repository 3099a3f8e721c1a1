mod grid;
mod obstacles;

use glam::Vec2;
use ordered_float::OrderedFloat;

pub use grid::NeighborGrid;
pub use obstacles::ObstacleTree;

use crate::{agent::Agent, obstacle::Obstacle, SimulatorOptions};

/// Agent found by a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearAgent {
    pub index: usize,
    pub distance_sq: f32,
}

/// Obstacle found by a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearObstacle {
    pub index: usize,
    pub distance_sq: f32,
}

/// Spatial query index over agents and obstacles.
///
/// Holds indices only. Agent queries reflect the positions given to the most
/// recent [`SpatialIndex::rebuild`].
pub struct SpatialIndex {
    grid: Option<NeighborGrid>,
    obstacles: ObstacleTree,
    revision: Option<u64>,
    agent_count: usize,
}

impl SpatialIndex {
    pub fn new(options: &SimulatorOptions, obstacles: &[Obstacle]) -> Self {
        SpatialIndex {
            grid: options
                .use_neighbor_grid
                .then(|| NeighborGrid::new(options.neighbor_grid_unit)),
            obstacles: ObstacleTree::new(obstacles),
            revision: None,
            agent_count: 0,
        }
    }

    /// Rebuild the agent structure from the current positions.
    ///
    /// `revision` identifies the committed agent state the index now reflects.
    pub fn rebuild(&mut self, agents: &[Agent], revision: u64) {
        if let Some(grid) = self.grid.as_mut() {
            let positions: Vec<Vec2> = agents.iter().map(|a| a.pos).collect();
            grid.update(&positions);
        }
        self.agent_count = agents.len();
        self.revision = Some(revision);
    }

    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Up to `max_count` agents within `radius` of `point`, ordered by
    /// squared distance then id.
    pub fn find_neighboring_agents(
        &self,
        agents: &[Agent],
        point: Vec2,
        radius: f32,
        max_count: usize,
        exclude: Option<usize>,
    ) -> Vec<NearAgent> {
        debug_assert_eq!(self.agent_count, agents.len(), "agent index queried before rebuild");

        let radius_sq = radius * radius;
        let mut found = Vec::new();
        let mut visit = |i: usize| {
            if Some(i) == exclude {
                return;
            }
            let distance_sq = agents[i].pos.distance_squared(point);
            if distance_sq <= radius_sq {
                found.push(NearAgent { index: i, distance_sq });
            }
        };

        match self.grid.as_ref() {
            Some(grid) => grid.for_each_candidate(point, radius, |i| visit(i as usize)),
            None => (0..agents.len()).for_each(visit),
        }

        found.sort_unstable_by_key(|n| (OrderedFloat(n.distance_sq), n.index));
        found.truncate(max_count);
        found
    }

    /// Obstacles within `radius` of `point`, ordered by squared distance then id.
    pub fn find_neighboring_obstacles(&self, point: Vec2, radius: f32) -> Vec<NearObstacle> {
        let mut found: Vec<NearObstacle> = self
            .obstacles
            .within(point.into(), radius)
            .map(|(index, distance_sq)| NearObstacle { index, distance_sq })
            .collect();

        found.sort_unstable_by_key(|n| (OrderedFloat(n.distance_sq), n.index));
        found
    }
}
