use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    bfsm::{Action, Condition, GoalSelector, VelComponent, WeightedGoal},
    error::SimResult,
    events::{EffectConfig, TargetConfig, Trigger},
    generator::{Distribution, Generator},
    models::ModelConfig,
    obstacle::ObstacleConfig,
};

const fn f_one() -> f32 {
    1.0
}

const fn f_time_step() -> f32 {
    0.1
}

/// Scene data
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Model definitions by name.
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    /// Agent profiles by name.
    #[serde(default)]
    pub profiles: BTreeMap<String, AgentProfile>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
    #[serde(default)]
    pub goal_sets: Vec<GoalSetConfig>,
    pub states: Vec<StateConfig>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl Scene {
    pub fn from_toml_str(s: &str) -> SimResult<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "f_time_step")]
    pub time_step: f32,
    /// Simulated time after which the run stops. (seconds)
    #[serde(default)]
    pub max_duration: Option<f32>,
    #[serde(default)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            time_step: f_time_step(),
            max_duration: None,
            seed: 0,
        }
    }
}

/// Physical and perceptual properties shared by a group of agents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Name of the model in [`Scene::models`].
    pub model: String,
    pub radius: f32,
    pub mass: f32,
    pub pref_speed: f32,
    pub max_speed: f32,
    pub max_accel: f32,
    /// Maximum turning rate. (degrees per second)
    pub max_angular_velocity: f32,
    pub neighbor_dist: f32,
    pub max_neighbors: usize,
    pub priority: f32,
}

impl Default for AgentProfile {
    fn default() -> Self {
        AgentProfile {
            model: String::new(),
            radius: 0.19,
            mass: 1.0,
            pref_speed: 1.34,
            max_speed: 2.5,
            max_accel: 5.0,
            max_angular_velocity: 360.0,
            neighbor_dist: 5.0,
            max_neighbors: 10,
            priority: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalSetConfig {
    pub id: usize,
    #[serde(default)]
    pub goals: Vec<WeightedGoal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub name: String,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default)]
    pub goal_selector: GoalSelector,
    #[serde(default)]
    pub velocity: VelComponent,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionConfig {
    pub from: String,
    pub to: TransitionTargetConfig,
    pub condition: Condition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransitionTargetConfig {
    Single(String),
    Random(Vec<WeightedState>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightedState {
    pub state: String,
    #[serde(default = "f_one")]
    pub weight: f32,
}

/// Agents sharing a profile and an initial state.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub profile: String,
    pub state: String,
    pub generator: Generator,
    /// Distance of a random displacement applied to every position.
    #[serde(default)]
    pub noise: Option<Distribution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    pub name: String,
    pub trigger: Trigger,
    pub target: TargetConfig,
    pub effect: EffectConfig,
}
