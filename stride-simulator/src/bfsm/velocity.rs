use glam::Vec2;
use serde::Deserialize;

use crate::util::EPSILON;

/// Policy turning the selected goal into a preferred velocity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VelComponent {
    /// Stand still.
    Zero,
    /// Head straight for the goal at the preferred speed.
    #[default]
    Goal,
    /// Fixed velocity, ignoring the goal.
    Constant { velocity: Vec2 },
    /// Fixed direction at the preferred speed.
    ConstantDirection { direction: Vec2 },
    /// Head for where a moving goal will be after `lead_time`.
    Pursuit {
        #[serde(default = "default_lead_time")]
        lead_time: f32,
    },
}

const fn default_lead_time() -> f32 {
    1.0
}

impl VelComponent {
    /// Preferred velocity of an agent at `pos` whose goal is at `goal_point`
    /// and moves with `goal_vel`.
    ///
    /// Speed toward a goal is reduced so that the agent does not overshoot it
    /// within one time step.
    pub fn preferred_velocity(
        &self,
        pos: Vec2,
        pref_speed: f32,
        goal_point: Vec2,
        goal_vel: Vec2,
        time_step: f32,
    ) -> Vec2 {
        match *self {
            VelComponent::Zero => Vec2::ZERO,
            VelComponent::Goal => toward(pos, goal_point, pref_speed, time_step),
            VelComponent::Constant { velocity } => velocity,
            VelComponent::ConstantDirection { direction } => {
                direction.normalize_or_zero() * pref_speed
            }
            VelComponent::Pursuit { lead_time } => {
                toward(pos, goal_point + goal_vel * lead_time, pref_speed, time_step)
            }
        }
    }
}

fn toward(pos: Vec2, target: Vec2, pref_speed: f32, time_step: f32) -> Vec2 {
    let disp = target - pos;
    let dist = disp.length();
    if dist <= EPSILON {
        return Vec2::ZERO;
    }

    let speed = pref_speed.min(dist / time_step);
    disp / dist * speed
}
