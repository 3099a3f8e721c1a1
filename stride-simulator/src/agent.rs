use glam::Vec2;
use serde::Serialize;

use crate::{
    scenario::AgentProfile,
    spatial::{NearAgent, NearObstacle},
    util::{det, EPSILON},
};

/// Pedestrian agent.
///
/// The id of an agent equals its index in the simulator's agent store.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: usize,
    pub pos: Vec2,
    pub vel: Vec2,
    pub vel_pref: Vec2,
    /// Unit facing direction.
    pub orientation: Vec2,
    /// Velocity computed by the model, consumed by [`Agent::commit`].
    vel_new: Option<Vec2>,

    pub radius: f32,
    pub mass: f32,
    pub pref_speed: f32,
    pub max_speed: f32,
    pub max_accel: f32,
    /// Maximum turning rate. (radians per second)
    pub max_angular_velocity: f32,
    pub neighbor_dist: f32,
    pub max_neighbors: usize,
    pub priority: f32,
    /// Index into the simulator's model table.
    pub model: usize,

    pub near_agents: Vec<NearAgent>,
    pub near_obstacles: Vec<NearObstacle>,
}

impl Agent {
    pub fn new(id: usize, pos: Vec2, profile: &AgentProfile, model: usize) -> Self {
        Agent {
            id,
            pos,
            vel: Vec2::ZERO,
            vel_pref: Vec2::ZERO,
            orientation: Vec2::X,
            vel_new: None,
            radius: profile.radius,
            mass: profile.mass,
            pref_speed: profile.pref_speed,
            max_speed: profile.max_speed,
            max_accel: profile.max_accel,
            max_angular_velocity: profile.max_angular_velocity.to_radians(),
            neighbor_dist: profile.neighbor_dist,
            max_neighbors: profile.max_neighbors,
            priority: profile.priority,
            model,
            near_agents: Vec::new(),
            near_obstacles: Vec::new(),
        }
    }

    pub fn vel_new(&self) -> Option<Vec2> {
        self.vel_new
    }

    pub fn set_vel_new(&mut self, vel: Vec2) {
        self.vel_new = Some(vel);
    }

    /// Apply the buffered velocity and move the agent by one time step.
    ///
    /// Returns `false` and leaves the agent untouched when no new velocity
    /// has been written since the previous commit.
    pub fn commit(&mut self, time_step: f32) -> bool {
        let Some(vel) = self.vel_new.take() else {
            return false;
        };

        self.vel = vel;
        self.pos += vel * time_step;
        self.update_orientation(time_step);
        true
    }

    /// Turn toward the direction of motion, limited by the angular velocity.
    fn update_orientation(&mut self, time_step: f32) {
        let speed = self.vel.length();
        if speed <= EPSILON {
            return;
        }

        let target = self.vel / speed;
        let max_angle = self.max_angular_velocity * time_step;
        let angle = self.orientation.dot(target).clamp(-1.0, 1.0).acos();

        if angle <= max_angle {
            self.orientation = target;
        } else {
            let sign = if det(self.orientation, target) < 0.0 { -1.0 } else { 1.0 };
            self.orientation = Vec2::from_angle(sign * max_angle)
                .rotate(self.orientation)
                .normalize_or(target);
        }
    }

    pub fn snapshot(&self, state: usize) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            pos: self.pos,
            vel: self.vel,
            orientation: self.orientation,
            radius: self.radius,
            state,
        }
    }
}

/// Committed state of an agent, as exposed after each step.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentSnapshot {
    pub id: usize,
    pub pos: Vec2,
    pub vel: Vec2,
    pub orientation: Vec2,
    pub radius: f32,
    pub state: usize,
}
