mod orca;
mod sfm;
mod upl;

use glam::Vec2;
use serde::Deserialize;

use crate::{agent::Agent, obstacle::Obstacle};

pub use self::{
    orca::{OrcaModel, OrcaParams},
    sfm::{SocialForceModel, SocialForceParams},
    upl::{PowerLawModel, PowerLawParams},
};

/// Read-only view of the world shared by all agents during the model phase.
pub struct ModelContext<'a> {
    pub agents: &'a [Agent],
    pub obstacles: &'a [Obstacle],
    pub time_step: f32,
}

/// Local interaction model turning neighbor state into a new velocity.
pub trait PedestrianModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Velocity of `agent` at the end of the current step.
    ///
    /// Only committed state of other agents may be read from `ctx`.
    fn compute_new_velocity(&self, agent: &Agent, ctx: &ModelContext<'_>) -> Vec2;
}

/// Model definition as found in a scene.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    SocialForce(SocialForceParams),
    PowerLaw(PowerLawParams),
    Orca(OrcaParams),
}

impl ModelConfig {
    pub fn build(&self) -> Box<dyn PedestrianModel> {
        match self {
            ModelConfig::SocialForce(params) => Box::new(SocialForceModel::new(params.clone())),
            ModelConfig::PowerLaw(params) => Box::new(PowerLawModel::new(params.clone())),
            ModelConfig::Orca(params) => Box::new(OrcaModel::new(params.clone())),
        }
    }

    /// Check the parameters, returning a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, value: f32| {
            if value.is_nan() || value <= 0.0 {
                Err(format!("{name} must be positive, got {value}"))
            } else {
                Ok(())
            }
        };

        match self {
            ModelConfig::SocialForce(params) => {
                positive("reaction_time", params.reaction_time)?;
                positive("force_distance", params.force_distance)?;
                if !(0.0..=1.0).contains(&params.anisotropy) {
                    return Err(format!("anisotropy must be in [0, 1], got {}", params.anisotropy));
                }
                Ok(())
            }
            ModelConfig::PowerLaw(params) => {
                positive("ksi", params.ksi)?;
                positive("t0", params.t0)
            }
            ModelConfig::Orca(params) => {
                positive("time_horizon", params.time_horizon)?;
                positive("obstacle_time_horizon", params.obstacle_time_horizon)
            }
        }
    }
}
