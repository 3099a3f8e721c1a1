use glam::Vec2;
use serde::Deserialize;

use crate::{
    agent::Agent,
    obstacle::Obstacle,
    util::{det, integrate_velocity},
};

use super::{ModelContext, PedestrianModel};

/// Threshold on the squared relative speed below which a pair never collides.
const EPS: f32 = 1e-7;

/// Parameters of the universal power law model (Karamouzas et al.).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerLawParams {
    /// Scale of the interaction energy.
    pub k: f32,
    /// Exponential cutoff of the interaction. (seconds)
    pub t0: f32,
    /// Power law exponent.
    pub m: f32,
    /// Relaxation time of the driving term. (seconds)
    pub ksi: f32,
}

impl Default for PowerLawParams {
    fn default() -> Self {
        PowerLawParams {
            k: 1.5,
            t0: 3.0,
            m: 2.0,
            ksi: 0.54,
        }
    }
}

pub struct PowerLawModel {
    params: PowerLawParams,
}

impl PowerLawModel {
    pub fn new(params: PowerLawParams) -> Self {
        PowerLawModel { params }
    }

    /// `-dE/dt` evaluated at time to collision `t`.
    fn energy_slope(&self, t: f32) -> f32 {
        let PowerLawParams { k, t0, m, .. } = self.params;
        k * (-t / t0).exp() / t.powf(m) * (m / t + 1.0 / t0)
    }

    /// Force from a disc of `radius` centered at `center` moving with
    /// `center_vel`.
    fn disc_force(&self, agent: &Agent, center: Vec2, center_vel: Vec2, radius: f32) -> Vec2 {
        let disp = center - agent.pos;
        let dist_sq = disp.length_squared();

        let mut radius_sq = radius * radius;
        if dist_sq < radius_sq {
            // Already overlapping: use the penetration depth as the effective radius.
            let r = radius - dist_sq.sqrt();
            radius_sq = r * r;
        }

        let v = agent.vel - center_vel;
        let a = v.length_squared();
        let b = disp.dot(v);
        let c = dist_sq - radius_sq;
        let discr = b * b - a * c;
        if discr <= 0.0 || a.abs() <= EPS {
            return Vec2::ZERO;
        }

        let discr = discr.sqrt();
        let t = (b - discr) / a;
        if t <= 0.0 {
            return Vec2::ZERO;
        }

        -self.energy_slope(t) * (v - (b * v - a * disp) / discr) / a
    }

    fn agent_force(&self, agent: &Agent, other: &Agent) -> Vec2 {
        self.disc_force(agent, other.pos, other.vel, agent.radius + other.radius)
    }

    /// Force from the capsule of radius `agent.radius` around `obstacle`.
    ///
    /// Time to collision is the minimum over both end discs and both offset
    /// sides of the segment.
    fn obstacle_force(&self, agent: &Agent, obstacle: &Obstacle, neighbor_dist_sq: f32) -> Vec2 {
        let (nearest, dist_sq, feature) = obstacle.nearest_point(agent.pos);
        if !obstacle.owns(feature) || dist_sq > neighbor_dist_sq {
            return Vec2::ZERO;
        }

        let v = agent.vel;
        let a = v.length_squared();
        if a <= EPS || v.dot(nearest - agent.pos) <= 0.0 {
            return Vec2::ZERO;
        }

        let mut radius = agent.radius;
        if dist_sq < radius * radius {
            radius = dist_sq.sqrt();
        }

        self.capsule_collision(agent.pos, v, obstacle, radius)
            .map_or(Vec2::ZERO, |(_, force)| force)
    }

    /// Earliest collision with the capsule of `radius` around `obstacle` and
    /// the resulting force.
    ///
    /// Candidates are both end discs and both offset sides of the segment.
    fn capsule_collision(&self, pos: Vec2, v: Vec2, obstacle: &Obstacle, radius: f32) -> Option<(f32, Vec2)> {
        let mut nearest: Option<(f32, Vec2)> = None;
        let mut keep = |t: f32, force: Vec2| {
            if nearest.map_or(true, |(t_min, _)| t < t_min) {
                nearest = Some((t, force));
            }
        };

        for end in [obstacle.p0, obstacle.p1] {
            if let Some((t, force)) = self.disc_time_and_force(pos, v, end, radius) {
                keep(t, force);
            }
        }

        let o = obstacle.p1 - obstacle.p0;
        let denom = det(v, o);
        if denom.abs() > EPS {
            for side in [1.0, -1.0] {
                let rel = pos - (obstacle.p0 + side * radius * obstacle.normal);
                let t = det(o, rel) / denom;
                let s = det(v, rel) / denom;

                if t > 0.0 && (0.0..=1.0).contains(&s) {
                    keep(t, self.energy_slope(t) / denom * Vec2::new(-o.y, o.x));
                }
            }
        }

        nearest
    }

    /// Time to collision with a static disc and the resulting force.
    fn disc_time_and_force(&self, pos: Vec2, v: Vec2, center: Vec2, radius: f32) -> Option<(f32, Vec2)> {
        let w = center - pos;
        let a = v.length_squared();
        let b = w.dot(v);
        let c = w.length_squared() - radius * radius;
        let discr = b * b - a * c;
        if discr <= 0.0 || a <= EPS {
            return None;
        }

        let discr = discr.sqrt();
        let t = (b - discr) / a;
        if t <= 0.0 {
            return None;
        }

        let force = -self.energy_slope(t) * (v - (b * v - a * w) / discr) / a;
        Some((t, force))
    }
}

impl PedestrianModel for PowerLawModel {
    fn name(&self) -> &'static str {
        "power_law"
    }

    fn compute_new_velocity(&self, agent: &Agent, ctx: &ModelContext<'_>) -> Vec2 {
        let mut force = (agent.vel_pref - agent.vel) / self.params.ksi;

        for near in &agent.near_agents {
            force += self.agent_force(agent, &ctx.agents[near.index]);
        }

        let neighbor_dist_sq = agent.neighbor_dist * agent.neighbor_dist;
        for near in &agent.near_obstacles {
            force += self.obstacle_force(agent, &ctx.obstacles[near.index], neighbor_dist_sq);
        }

        integrate_velocity(agent.vel, force / agent.mass, agent.max_accel, agent.max_speed, ctx.time_step)
    }
}
