use std::collections::BTreeMap;

use glam::Vec2;
use serde::Deserialize;

use crate::{agent::AgentSnapshot, util::EPSILON};

/// Goal region.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Goal {
    Point {
        position: Vec2,
    },
    Circle {
        center: Vec2,
        radius: f32,
    },
    /// Oriented line segment `p0 -> p1`.
    Line {
        p0: Vec2,
        p1: Vec2,
    },
    /// Axis-aligned box.
    Aabb {
        min: Vec2,
        max: Vec2,
    },
}

impl Goal {
    /// Point of the goal region nearest to `pos`.
    pub fn nearest_point(&self, pos: Vec2) -> Vec2 {
        match *self {
            Goal::Point { position } => position,
            Goal::Circle { center, radius } => nearest_on_disc(pos, center, radius),
            Goal::Line { p0, p1 } => {
                let d = p1 - p0;
                let len_sq = d.length_squared();
                if len_sq <= EPSILON {
                    p0
                } else {
                    p0 + d * ((pos - p0).dot(d) / len_sq).clamp(0.0, 1.0)
                }
            }
            Goal::Aabb { min, max } => pos.clamp(min, max),
        }
    }

    pub fn distance_squared(&self, pos: Vec2) -> f32 {
        self.nearest_point(pos).distance_squared(pos)
    }

    /// Check the geometry, returning a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Goal::Circle { radius, .. } if radius.is_nan() || radius < 0.0 => {
                Err(format!("circle goal has invalid radius {radius}"))
            }
            Goal::Aabb { min, max } if min.x > max.x || min.y > max.y => {
                Err(format!("box goal has min {min} above max {max}"))
            }
            _ => Ok(()),
        }
    }
}

pub(crate) fn nearest_on_disc(pos: Vec2, center: Vec2, radius: f32) -> Vec2 {
    let offset = pos - center;
    let dist = offset.length();
    if dist <= radius {
        pos
    } else {
        center + offset / dist * radius
    }
}

/// Goal with the weight used by random selection.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightedGoal {
    pub id: usize,
    #[serde(default = "f_one")]
    pub weight: f32,
    pub goal: Goal,
}

const fn f_one() -> f32 {
    1.0
}

/// Collection of goals addressed by id.
#[derive(Debug, Clone, Default)]
pub struct GoalSet {
    pub goals: BTreeMap<usize, WeightedGoal>,
}

impl GoalSet {
    pub fn get(&self, id: usize) -> Option<&Goal> {
        self.goals.get(&id).map(|g| &g.goal)
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Goal nearest to `pos`, ties broken by the lower id.
    pub fn nearest(&self, pos: Vec2) -> Option<usize> {
        self.goals
            .values()
            .map(|g| (g.goal.distance_squared(pos), g.id))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Goal drawn with probability proportional to its weight.
    pub fn random(&self, rng: &mut fastrand::Rng) -> Option<usize> {
        let total: f32 = self.goals.values().map(|g| g.weight.max(0.0)).sum();
        if total <= 0.0 {
            return self.goals.keys().next().copied();
        }

        let mut x = rng.f32() * total;
        for g in self.goals.values() {
            let w = g.weight.max(0.0);
            if x < w {
                return Some(g.id);
            }
            x -= w;
        }
        self.goals.keys().next_back().copied()
    }
}

/// Goal currently pursued by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveGoal {
    /// The agent's own position.
    Identity,
    Shared { set: usize, goal: usize },
    /// Another agent, looked up by id every step.
    Agent { target: usize },
}

impl ActiveGoal {
    /// Point to steer toward and the velocity of the goal.
    ///
    /// A missing goal or target agent resolves to `pos` itself.
    pub fn resolve(
        &self,
        pos: Vec2,
        goal_sets: &BTreeMap<usize, GoalSet>,
        world: &[AgentSnapshot],
    ) -> (Vec2, Vec2) {
        match *self {
            ActiveGoal::Identity => (pos, Vec2::ZERO),
            ActiveGoal::Shared { set, goal } => {
                let point = goal_sets
                    .get(&set)
                    .and_then(|s| s.get(goal))
                    .map_or(pos, |g| g.nearest_point(pos));
                (point, Vec2::ZERO)
            }
            ActiveGoal::Agent { target } => match world.get(target) {
                Some(other) => (nearest_on_disc(pos, other.pos, other.radius), other.vel),
                None => (pos, Vec2::ZERO),
            },
        }
    }
}
