//! Optimal reciprocal collision avoidance.
//!
//! Each neighbor contributes a half-plane of permitted velocities; the new
//! velocity is the one closest to the preferred velocity inside all of them
//! and inside the max speed circle. When the half-planes are infeasible the
//! velocity minimizing the largest violation is chosen instead.

use glam::Vec2;
use serde::Deserialize;

use crate::{
    agent::Agent,
    obstacle::Obstacle,
    util::{det, integrate_velocity, EPSILON},
};

use super::{ModelContext, PedestrianModel};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrcaParams {
    /// Look-ahead window for avoiding other agents. (seconds)
    pub time_horizon: f32,
    /// Look-ahead window for avoiding obstacles. (seconds)
    pub obstacle_time_horizon: f32,
}

impl Default for OrcaParams {
    fn default() -> Self {
        OrcaParams {
            time_horizon: 2.5,
            obstacle_time_horizon: 0.5,
        }
    }
}

/// Directed half-plane in velocity space.
///
/// Permitted velocities lie on the left of the ray from `point` along `dir`.
#[derive(Debug, Clone, Copy)]
struct OrcaLine {
    point: Vec2,
    dir: Vec2,
}

pub struct OrcaModel {
    params: OrcaParams,
}

impl OrcaModel {
    pub fn new(params: OrcaParams) -> Self {
        OrcaModel { params }
    }

    /// Half-plane avoiding the nearest point of `obstacle`, which is treated as
    /// a static point taking no share of the avoidance.
    fn obstacle_line(&self, agent: &Agent, obstacle: &Obstacle, inv_dt: f32) -> Option<OrcaLine> {
        let (nearest, _, feature) = obstacle.nearest_point(agent.pos);
        if !obstacle.owns(feature) {
            return None;
        }

        Some(orca_line(
            agent.pos,
            agent.vel,
            nearest,
            Vec2::ZERO,
            agent.radius,
            self.params.obstacle_time_horizon,
            inv_dt,
            1.0,
        ))
    }

    fn agent_line(&self, agent: &Agent, other: &Agent, inv_dt: f32) -> OrcaLine {
        let total_priority = agent.priority + other.priority;
        let responsibility = if total_priority > EPSILON {
            other.priority / total_priority
        } else {
            0.5
        };

        orca_line(
            agent.pos,
            agent.vel,
            other.pos,
            other.vel,
            agent.radius + other.radius,
            self.params.time_horizon,
            inv_dt,
            responsibility,
        )
    }
}

impl PedestrianModel for OrcaModel {
    fn name(&self) -> &'static str {
        "orca"
    }

    fn compute_new_velocity(&self, agent: &Agent, ctx: &ModelContext<'_>) -> Vec2 {
        let inv_dt = 1.0 / ctx.time_step;

        // Obstacle lines come first; the fallback program never relaxes them.
        let mut lines: Vec<OrcaLine> = agent
            .near_obstacles
            .iter()
            .filter_map(|near| self.obstacle_line(agent, &ctx.obstacles[near.index], inv_dt))
            .collect();
        let obstacle_line_count = lines.len();

        lines.extend(
            agent
                .near_agents
                .iter()
                .map(|near| self.agent_line(agent, &ctx.agents[near.index], inv_dt)),
        );

        let mut result = agent.vel_pref;
        let fail = linear_program2(&lines, agent.max_speed, agent.vel_pref, false, &mut result);
        if fail < lines.len() {
            linear_program3(&lines, obstacle_line_count, fail, agent.max_speed, &mut result);
        }

        let acc = (result - agent.vel) * inv_dt;
        integrate_velocity(agent.vel, acc, agent.max_accel, agent.max_speed, ctx.time_step)
    }
}

/// Half-plane for a body at `pos` avoiding a disc at `other_pos`.
///
/// `combined_radius` is the sum of both radii and `responsibility` the share
/// of the required velocity change taken by this body.
#[allow(clippy::too_many_arguments)]
fn orca_line(
    pos: Vec2,
    vel: Vec2,
    other_pos: Vec2,
    other_vel: Vec2,
    combined_radius: f32,
    time_horizon: f32,
    inv_dt: f32,
    responsibility: f32,
) -> OrcaLine {
    let rel_pos = other_pos - pos;
    let rel_vel = vel - other_vel;
    let dist_sq = rel_pos.length_squared();
    let combined_radius_sq = combined_radius * combined_radius;
    let inv_time_horizon = 1.0 / time_horizon;

    let (dir, u) = if dist_sq > combined_radius_sq {
        // Vector from the cutoff center to the relative velocity.
        let w = rel_vel - inv_time_horizon * rel_pos;
        let w_length_sq = w.length_squared();
        let dot = w.dot(rel_pos);

        if dot < 0.0 && dot * dot > combined_radius_sq * w_length_sq {
            // Project on the cutoff circle.
            let w_length = w_length_sq.sqrt();
            let unit_w = if w_length > EPSILON { w / w_length } else { Vec2::X };
            let dir = Vec2::new(unit_w.y, -unit_w.x);
            (dir, (combined_radius * inv_time_horizon - w_length) * unit_w)
        } else {
            // Project on the nearer leg of the cone.
            let leg = (dist_sq - combined_radius_sq).max(0.0).sqrt();
            let dir = if det(rel_pos, w) > 0.0 {
                Vec2::new(
                    rel_pos.x * leg - rel_pos.y * combined_radius,
                    rel_pos.x * combined_radius + rel_pos.y * leg,
                ) / dist_sq
            } else {
                -Vec2::new(
                    rel_pos.x * leg + rel_pos.y * combined_radius,
                    -rel_pos.x * combined_radius + rel_pos.y * leg,
                ) / dist_sq
            };
            (dir, rel_vel.dot(dir) * dir - rel_vel)
        }
    } else {
        // Already colliding: resolve within one time step.
        let w = rel_vel - inv_dt * rel_pos;
        let w_length = w.length();
        let unit_w = if w_length > EPSILON {
            w / w_length
        } else if dist_sq > EPSILON * EPSILON {
            -rel_pos.normalize()
        } else {
            Vec2::X
        };
        let dir = Vec2::new(unit_w.y, -unit_w.x);
        (dir, (combined_radius * inv_dt - w_length) * unit_w)
    };

    OrcaLine {
        point: vel + responsibility * u,
        dir,
    }
}

/// Optimize along the boundary of `lines[line_no]` subject to the previous
/// lines and the speed circle. Returns `false` when infeasible.
fn linear_program1(
    lines: &[OrcaLine],
    line_no: usize,
    radius: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
    result: &mut Vec2,
) -> bool {
    let line = &lines[line_no];
    let dot = line.point.dot(line.dir);
    let discriminant = dot * dot + radius * radius - line.point.length_squared();
    if discriminant < 0.0 {
        return false;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot - sqrt_discriminant;
    let mut t_right = -dot + sqrt_discriminant;

    for other in &lines[..line_no] {
        let denominator = det(line.dir, other.dir);
        let numerator = det(other.dir, line.point - other.point);

        if denominator.abs() <= EPSILON {
            // Parallel lines.
            if numerator < 0.0 {
                return false;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }

        if t_left > t_right {
            return false;
        }
    }

    let t = if direction_opt {
        if opt_velocity.dot(line.dir) > 0.0 {
            t_right
        } else {
            t_left
        }
    } else {
        line.dir.dot(opt_velocity - line.point).clamp(t_left, t_right)
    };
    *result = line.point + t * line.dir;
    true
}

/// Closest velocity to `opt_velocity` satisfying every line, or the index of
/// the first line that could not be satisfied.
fn linear_program2(
    lines: &[OrcaLine],
    radius: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
    result: &mut Vec2,
) -> usize {
    *result = if direction_opt {
        opt_velocity.normalize_or_zero() * radius
    } else {
        opt_velocity.clamp_length_max(radius)
    };

    for i in 0..lines.len() {
        if det(lines[i].dir, lines[i].point - *result) > 0.0 {
            let previous = *result;
            if !linear_program1(lines, i, radius, opt_velocity, direction_opt, result) {
                *result = previous;
                return i;
            }
        }
    }

    lines.len()
}

/// Minimize the largest violation of the agent lines starting at `begin`,
/// keeping the first `obstacle_line_count` lines hard.
fn linear_program3(
    lines: &[OrcaLine],
    obstacle_line_count: usize,
    begin: usize,
    radius: f32,
    result: &mut Vec2,
) {
    let mut distance = 0.0;

    for i in begin..lines.len() {
        let line = lines[i];
        if det(line.dir, line.point - *result) <= distance {
            continue;
        }

        let mut projected: Vec<OrcaLine> = lines[..obstacle_line_count].to_vec();
        for other in &lines[obstacle_line_count..i] {
            let determinant = det(line.dir, other.dir);
            let point = if determinant.abs() <= EPSILON {
                if line.dir.dot(other.dir) > 0.0 {
                    continue;
                }
                0.5 * (line.point + other.point)
            } else {
                line.point + (det(other.dir, line.point - other.point) / determinant) * line.dir
            };

            projected.push(OrcaLine {
                point,
                dir: (other.dir - line.dir).normalize_or_zero(),
            });
        }

        let previous = *result;
        let opt_direction = Vec2::new(-line.dir.y, line.dir.x);
        if linear_program2(&projected, radius, opt_direction, true, result) < projected.len() {
            *result = previous;
        }

        distance = det(line.dir, line.point - *result);
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::vec2;

    use super::*;
    use crate::{
        models::test_util::agent,
        spatial::{NearAgent, NearObstacle},
    };

    fn model() -> OrcaModel {
        OrcaModel::new(OrcaParams::default())
    }

    #[test]
    fn test_unconstrained_keeps_preferred_velocity() {
        let mut a = agent(0, Vec2::ZERO, vec2(1.0, 0.0));
        a.vel_pref = vec2(1.2, 0.0);
        let agents = vec![a];
        let ctx = ModelContext {
            agents: &agents,
            obstacles: &[],
            time_step: 0.1,
        };

        let v = model().compute_new_velocity(&agents[0], &ctx);

        assert_float_absolute_eq!(v.x, 1.2, 1e-6);
        assert_float_absolute_eq!(v.y, 0.0, 1e-6);
    }

    #[test]
    fn test_head_on_pair_deviates_within_max_speed() {
        let mut a = agent(0, Vec2::ZERO, vec2(1.0, 0.0));
        a.vel_pref = vec2(1.34, 0.0);
        a.near_agents = vec![NearAgent {
            index: 1,
            distance_sq: 4.0,
        }];
        let mut b = agent(1, vec2(2.0, 0.01), vec2(-1.0, 0.0));
        b.vel_pref = vec2(-1.34, 0.0);
        let agents = vec![a, b];
        let ctx = ModelContext {
            agents: &agents,
            obstacles: &[],
            time_step: 0.1,
        };

        let v = model().compute_new_velocity(&agents[0], &ctx);

        assert!(v.length() <= agents[0].max_speed + 1e-5);
        assert!(v.y.abs() > 1e-3);
        assert!(v.is_finite());
    }

    #[test]
    fn test_max_speed_respected_in_crowd() {
        let mut center = agent(0, Vec2::ZERO, vec2(2.0, 0.0));
        center.vel_pref = vec2(10.0, 0.0);
        let mut agents = vec![center];
        for i in 0..8 {
            let angle = i as f32 * std::f32::consts::FRAC_PI_4;
            let pos = 0.5 * Vec2::from_angle(angle);
            agents.push(agent(i + 1, pos, -pos));
        }
        agents[0].near_agents = (1..agents.len())
            .map(|index| NearAgent {
                index,
                distance_sq: 0.25,
            })
            .collect();
        let ctx = ModelContext {
            agents: &agents,
            obstacles: &[],
            time_step: 0.1,
        };

        let v = model().compute_new_velocity(&agents[0], &ctx);

        assert!(v.is_finite());
        assert!(v.length() <= agents[0].max_speed + 1e-5);
    }

    #[test]
    fn test_obstacle_blocks_approach() {
        let mut a = agent(0, vec2(0.0, -0.4), vec2(0.0, 1.0));
        a.vel_pref = vec2(0.0, 1.34);
        a.near_obstacles = vec![NearObstacle {
            index: 0,
            distance_sq: 0.16,
        }];
        let agents = vec![a];
        let obstacles = vec![Obstacle::new(0, vec2(-5.0, 0.0), vec2(5.0, 0.0))];
        let ctx = ModelContext {
            agents: &agents,
            obstacles: &obstacles,
            time_step: 0.1,
        };

        let v = model().compute_new_velocity(&agents[0], &ctx);

        assert!(v.y < agents[0].vel_pref.y);
    }

    #[test]
    fn test_linear_program_respects_single_line() {
        // Permitted region: y >= 0.5.
        let lines = [OrcaLine {
            point: vec2(0.0, 0.5),
            dir: vec2(1.0, 0.0),
        }];
        let mut result = Vec2::ZERO;

        let fail = linear_program2(&lines, 2.0, vec2(1.0, 0.0), false, &mut result);

        assert_eq!(fail, 1);
        assert_float_absolute_eq!(result.x, 1.0, 1e-6);
        assert_float_absolute_eq!(result.y, 0.5, 1e-6);
    }

    #[test]
    fn test_linear_program_bounds_between_lines() {
        // Permitted region: y >= 0.5 and x <= 0.25.
        let lines = [
            OrcaLine {
                point: vec2(0.0, 0.5),
                dir: vec2(1.0, 0.0),
            },
            OrcaLine {
                point: vec2(0.25, 0.0),
                dir: vec2(0.0, 1.0),
            },
        ];
        let mut result = Vec2::ZERO;

        let fail = linear_program2(&lines, 2.0, vec2(1.0, 0.0), false, &mut result);

        assert_eq!(fail, 2);
        assert_float_absolute_eq!(result.x, 0.25, 1e-6);
        assert_float_absolute_eq!(result.y, 0.5, 1e-6);
    }
}
