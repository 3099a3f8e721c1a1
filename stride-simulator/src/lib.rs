pub mod agent;
pub mod bfsm;
pub mod builder;
pub mod diagnostic;
pub mod error;
pub mod events;
pub mod generator;
pub mod models;
pub mod obstacle;
pub mod scenario;
pub mod spatial;
pub mod util;

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use glam::Vec2;
use log::info;
use rayon::prelude::*;

pub use agent::{Agent, AgentSnapshot};
use bfsm::Fsm;
pub use builder::SceneBuilder;
use diagnostic::{DiagnosticLog, StepMetrics};
pub use error::{SimError, SimResult};
use events::EventSystem;
use models::{ModelContext, PedestrianModel};
pub use obstacle::Obstacle;
pub use scenario::Scene;
use spatial::SpatialIndex;

/// Slack, relative to the time step, when comparing the clock with the
/// maximum duration.
const DURATION_TOLERANCE: f32 = 1e-3;

/// Simulator instance.
///
/// Created from a [`Scene`] with [`Simulator::from_scene`], then advanced one
/// fixed time step at a time with [`Simulator::step`].
pub struct Simulator {
    agents: Vec<Agent>,
    obstacles: Vec<Obstacle>,
    models: Vec<Box<dyn PedestrianModel>>,
    index: SpatialIndex,
    fsm: Fsm,
    events: EventSystem,
    time_step: f32,
    max_duration: Option<f32>,
    step_count: u64,
    global_time: f32,
    /// Number of commits that moved at least one agent.
    revision: u64,
    running: bool,
    step_metrics: StepMetrics,
    last_metrics: Option<StepMetrics>,
    pub diagnostic_log: DiagnosticLog,
}

impl Simulator {
    pub fn from_scene(scene: &Scene, options: &SimulatorOptions) -> SimResult<Self> {
        let simulator = SceneBuilder::new(scene).build(options)?;

        info!("Simulator initialization finished");
        info!("Simulator options: {options:#?}");

        Ok(simulator)
    }

    /// Advance the simulation by one time step.
    ///
    /// Returns whether the simulation is still running. A stopped simulator
    /// is left untouched.
    pub fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.calc_next_state();
        self.apply_next_state();
        self.collect_diagnostic_metrics();

        self.running
    }

    /// Step until the simulation stops or `cancel` is raised.
    ///
    /// The flag is checked between steps. Returns the number of steps taken
    /// so far.
    pub fn run(&mut self, cancel: &AtomicBool) -> u64 {
        self.run_with(cancel, |_| {})
    }

    /// Like [`Simulator::run`], calling `on_step` after every step taken.
    pub fn run_with(&mut self, cancel: &AtomicBool, mut on_step: impl FnMut(&Self)) -> u64 {
        while self.running && !cancel.load(Ordering::SeqCst) {
            self.step();
            on_step(self);
        }
        self.step_count
    }

    /// Rebuild the index, refresh neighbors, update behaviors and compute
    /// the new velocity of every agent.
    pub fn calc_next_state(&mut self) {
        let instant = Instant::now();
        self.index.rebuild(&self.agents, self.revision);
        self.step_metrics.time_index = instant.elapsed().as_secs_f64();

        let instant = Instant::now();
        self.refresh_neighbors();
        self.step_metrics.time_neighbors = instant.elapsed().as_secs_f64();

        let instant = Instant::now();
        let world = self.snapshots();
        self.fsm.update(
            &mut self.agents,
            &world,
            self.global_time,
            self.time_step,
            self.step_count,
        );
        self.step_metrics.time_behavior = instant.elapsed().as_secs_f64();

        let instant = Instant::now();
        let ctx = ModelContext {
            agents: &self.agents,
            obstacles: &self.obstacles,
            time_step: self.time_step,
        };
        let models = &self.models;
        let velocities: Vec<Vec2> = self
            .agents
            .par_iter()
            .map(|agent| models[agent.model].compute_new_velocity(agent, &ctx))
            .collect();
        self.agents
            .iter_mut()
            .zip(velocities)
            .for_each(|(agent, vel)| agent.set_vel_new(vel));
        self.step_metrics.time_model = instant.elapsed().as_secs_f64();
    }

    fn refresh_neighbors(&mut self) {
        debug_assert_eq!(
            self.index.revision(),
            Some(self.revision),
            "spatial index is stale"
        );

        let index = &self.index;
        let agents = &self.agents;
        let neighbors: Vec<_> = agents
            .par_iter()
            .map(|agent| {
                (
                    index.find_neighboring_agents(
                        agents,
                        agent.pos,
                        agent.neighbor_dist,
                        agent.max_neighbors,
                        Some(agent.id),
                    ),
                    index.find_neighboring_obstacles(agent.pos, agent.neighbor_dist),
                )
            })
            .collect();

        self.agents
            .par_iter_mut()
            .zip(neighbors)
            .for_each(|(agent, (near_agents, near_obstacles))| {
                agent.near_agents = near_agents;
                agent.near_obstacles = near_obstacles;
            });
    }

    /// Commit the new velocities, advance the clock and fire due events.
    ///
    /// Returns the number of agents that moved.
    pub fn apply_next_state(&mut self) -> usize {
        let instant = Instant::now();

        let time_step = self.time_step;
        let committed = self
            .agents
            .par_iter_mut()
            .map(|agent| agent.commit(time_step))
            .filter(|&moved| moved)
            .count();
        if committed > 0 {
            self.revision += 1;
        }

        self.step_count += 1;
        self.global_time = self.step_count as f32 * self.time_step;

        self.events.evaluate(
            self.global_time,
            self.step_count,
            &mut self.agents,
            &mut self.fsm,
        );

        self.running = !self.fsm.all_final() && !self.duration_reached();

        self.step_metrics.time_commit = instant.elapsed().as_secs_f64();
        committed
    }

    fn duration_reached(&self) -> bool {
        self.max_duration.is_some_and(|max_duration| {
            self.global_time >= max_duration - DURATION_TOLERANCE * self.time_step
        })
    }

    pub fn collect_diagnostic_metrics(&mut self) {
        let mut metrics = std::mem::take(&mut self.step_metrics);
        metrics.step = self.step_count;
        metrics.global_time = self.global_time;
        metrics.active_agent_count = self.active_agent_count();
        self.diagnostic_log.push(metrics.clone());
        self.last_metrics = Some(metrics);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulated time. (seconds)
    pub fn global_time(&self) -> f32 {
        self.global_time
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Override the maximum duration of the scene.
    pub fn set_max_duration(&mut self, max_duration: Option<f32>) {
        self.max_duration = max_duration;
        self.running = !self.fsm.all_final() && !self.duration_reached();
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Committed state of every agent.
    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents
            .iter()
            .map(|agent| agent.snapshot(self.fsm.current_state(agent.id)))
            .collect()
    }

    pub fn state_name(&self, agent: usize) -> &str {
        self.fsm.state_name(self.fsm.current_state(agent))
    }

    pub fn is_final(&self, agent: usize) -> bool {
        self.fsm.is_final(agent)
    }

    pub fn active_agent_count(&self) -> usize {
        (0..self.agents.len()).filter(|&i| !self.fsm.is_final(i)).count()
    }

    pub fn last_metrics(&self) -> Option<&StepMetrics> {
        self.last_metrics.as_ref()
    }
}

/// Simulator options.
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    /// Unit length of the neighbor search grid. (meters)
    pub neighbor_grid_unit: f32,
    /// Whether to use neighbor search grid.
    pub use_neighbor_grid: bool,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        SimulatorOptions {
            neighbor_grid_unit: 1.4,
            use_neighbor_grid: true,
        }
    }
}
