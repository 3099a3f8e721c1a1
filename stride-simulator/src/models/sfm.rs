use glam::Vec2;
use serde::Deserialize;

use crate::{
    agent::Agent,
    obstacle::Obstacle,
    util::{integrate_velocity, EPSILON},
};

use super::{ModelContext, PedestrianModel};

/// Parameters of the social force model (Johansson et al. elliptical variant).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocialForceParams {
    /// Relaxation time of the driving term. (seconds)
    pub reaction_time: f32,
    /// Look-ahead used to stretch the repulsive ellipse. (seconds)
    pub stride_time: f32,
    /// Range of the exponential repulsion. (meters)
    pub force_distance: f32,
    /// Strength of agent repulsion.
    pub agent_scale: f32,
    /// Strength of obstacle repulsion.
    pub obstacle_scale: f32,
    /// Weight of interactions from behind, in `[0, 1]`.
    pub anisotropy: f32,
}

impl Default for SocialForceParams {
    fn default() -> Self {
        SocialForceParams {
            reaction_time: 0.5,
            stride_time: 0.5,
            force_distance: 0.15,
            agent_scale: 25.0,
            obstacle_scale: 35.0,
            anisotropy: 0.16,
        }
    }
}

pub struct SocialForceModel {
    params: SocialForceParams,
}

impl SocialForceModel {
    pub fn new(params: SocialForceParams) -> Self {
        SocialForceModel { params }
    }

    /// Weight of an interaction coming from `direction` (pointing from the
    /// source toward the agent).
    fn directional_weight(&self, agent: &Agent, direction: Vec2) -> f32 {
        let lambda = self.params.anisotropy;
        let cos_phi = -direction.dot(agent.orientation);
        lambda + (1.0 - lambda) * (1.0 + cos_phi) * 0.5
    }

    fn agent_force(&self, agent: &Agent, other: &Agent) -> Vec2 {
        let SocialForceParams {
            stride_time,
            force_distance,
            agent_scale,
            ..
        } = self.params;

        let difference = agent.pos - other.pos;
        let distance = difference.length();
        if distance < EPSILON {
            return Vec2::ZERO;
        }
        let direction = difference / distance;

        let step = other.vel * stride_time;
        let offset = difference - step;
        let offset_length = offset.length();
        if offset_length < EPSILON {
            return Vec2::ZERO;
        }

        // Semi-minor axis of the ellipse around the other agent's next step.
        let t = distance + offset_length;
        let two_b_sq = t * t - step.length_squared();
        if two_b_sq <= EPSILON {
            return Vec2::ZERO;
        }
        let two_b = two_b_sq.sqrt();

        let weight = self.directional_weight(agent, direction);
        let magnitude = agent_scale * weight * (t / two_b) * (-0.5 * two_b / force_distance).exp();
        magnitude * 0.5 * (direction + offset / offset_length)
    }

    fn obstacle_force(&self, agent: &Agent, obstacle: &Obstacle) -> Vec2 {
        let (nearest, distance_sq, feature) = obstacle.nearest_point(agent.pos);
        if !obstacle.owns(feature) {
            return Vec2::ZERO;
        }

        let distance = distance_sq.sqrt();
        if distance < EPSILON {
            return Vec2::ZERO;
        }
        let direction = (agent.pos - nearest) / distance;

        let weight = self.directional_weight(agent, direction);
        self.params.obstacle_scale * weight * (-distance / self.params.force_distance).exp() * direction
    }
}

impl PedestrianModel for SocialForceModel {
    fn name(&self) -> &'static str {
        "social_force"
    }

    fn compute_new_velocity(&self, agent: &Agent, ctx: &ModelContext<'_>) -> Vec2 {
        let mut force = Vec2::ZERO;

        for near in &agent.near_agents {
            force += self.agent_force(agent, &ctx.agents[near.index]);
        }
        for near in &agent.near_obstacles {
            force += self.obstacle_force(agent, &ctx.obstacles[near.index]);
        }

        let acc = (agent.vel_pref - agent.vel) / self.params.reaction_time + force / agent.mass;
        integrate_velocity(agent.vel, acc, agent.max_accel, agent.max_speed, ctx.time_step)
    }
}
