//! Resolution and validation of a [`Scene`] into a ready-to-run [`Simulator`].

use std::collections::{btree_map::Entry, BTreeMap};

use log::{info, warn};

use crate::{
    agent::Agent,
    bfsm::{Fsm, FsmGraph, GoalSelector, GoalSet, State, StateId, Transition, TransitionTarget},
    diagnostic::{DiagnosticLog, StepMetrics},
    error::{SimError, SimResult},
    events::{Event, EventSystem},
    generator::perturb,
    models::PedestrianModel,
    obstacle::build_obstacles,
    scenario::{AgentProfile, Scene, TransitionTargetConfig},
    spatial::SpatialIndex,
    Simulator, SimulatorOptions,
};

pub struct SceneBuilder<'a> {
    scene: &'a Scene,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        SceneBuilder { scene }
    }

    pub fn build(&self, options: &SimulatorOptions) -> SimResult<Simulator> {
        let simulation = &self.scene.simulation;
        let time_step = simulation.time_step;
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(SimError::Config(format!("time step must be positive, got {time_step}")));
        }
        if let Some(max_duration) = simulation.max_duration {
            if max_duration.is_nan() || max_duration <= 0.0 {
                return Err(SimError::Config(format!(
                    "max duration must be positive, got {max_duration}"
                )));
            }
        }

        let unit = options.neighbor_grid_unit;
        if !unit.is_finite() || unit <= 0.0 {
            return Err(SimError::Config(format!(
                "neighbor grid unit must be positive, got {unit}"
            )));
        }

        let (models, model_ids) = self.build_models()?;
        self.validate_profiles(&model_ids)?;
        let graph = self.build_graph()?;
        let (mut agents, initial_states) = self.build_agents(&graph, &model_ids)?;
        self.validate_agent_targets(&graph, agents.len())?;
        let events = self.build_events(&graph)?;

        let obstacles = build_obstacles(&self.scene.obstacles);
        let index = SpatialIndex::new(options, &obstacles);

        info!(
            "Scene: {} agents, {} obstacles, {} states, {} models, {} events",
            agents.len(),
            obstacles.len(),
            graph.states.len(),
            models.len(),
            events.len(),
        );
        if agents.is_empty() {
            warn!("Scene has no agents");
        }

        let fsm = Fsm::new(graph, &mut agents, &initial_states, time_step);
        let running = !fsm.all_final();

        Ok(Simulator {
            agents,
            obstacles,
            models,
            index,
            fsm,
            events: EventSystem::new(events),
            time_step,
            max_duration: simulation.max_duration,
            step_count: 0,
            global_time: 0.0,
            revision: 0,
            running,
            step_metrics: StepMetrics::default(),
            last_metrics: None,
            diagnostic_log: DiagnosticLog::default(),
        })
    }

    /// Model table and the index of each model name in it.
    fn build_models(&self) -> SimResult<(Vec<Box<dyn PedestrianModel>>, BTreeMap<&'a str, usize>)> {
        let mut models = Vec::with_capacity(self.scene.models.len());
        let mut ids = BTreeMap::new();

        for (name, config) in &self.scene.models {
            config
                .validate()
                .map_err(|e| SimError::Config(format!("model \"{name}\": {e}")))?;
            let model = config.build();
            info!("Model \"{name}\": {}", model.name());
            ids.insert(name.as_str(), models.len());
            models.push(model);
        }

        Ok((models, ids))
    }

    fn validate_profiles(&self, model_ids: &BTreeMap<&str, usize>) -> SimResult<()> {
        for (name, profile) in &self.scene.profiles {
            if !model_ids.contains_key(profile.model.as_str()) {
                return Err(SimError::UnknownModel(profile.model.clone()));
            }
            validate_profile(profile).map_err(|e| SimError::Config(format!("profile \"{name}\": {e}")))?;
        }
        Ok(())
    }

    fn build_graph(&self) -> SimResult<FsmGraph> {
        let scene = self.scene;
        if scene.states.is_empty() {
            return Err(SimError::Config("no behavior states defined".to_owned()));
        }

        let mut goal_sets = BTreeMap::new();
        for config in &scene.goal_sets {
            let mut set = GoalSet::default();
            for goal in &config.goals {
                goal.goal
                    .validate()
                    .map_err(|e| SimError::Config(format!("goal {} of set {}: {e}", goal.id, config.id)))?;
                if set.goals.insert(goal.id, goal.clone()).is_some() {
                    return Err(SimError::Config(format!(
                        "goal {} is defined twice in goal set {}",
                        goal.id, config.id
                    )));
                }
            }
            if goal_sets.insert(config.id, set).is_some() {
                return Err(SimError::Config(format!("goal set {} is defined twice", config.id)));
            }
        }

        let mut state_ids: BTreeMap<&str, StateId> = BTreeMap::new();
        let mut states = Vec::with_capacity(scene.states.len());
        for config in &scene.states {
            match state_ids.entry(config.name.as_str()) {
                Entry::Occupied(_) => return Err(SimError::DuplicateState(config.name.clone())),
                Entry::Vacant(e) => {
                    e.insert(states.len());
                }
            }
            config.goal_selector.validate(&goal_sets)?;
            states.push(State {
                name: config.name.clone(),
                is_final: config.is_final,
                goal_selector: config.goal_selector.clone(),
                velocity: config.velocity.clone(),
                actions: config.actions.clone(),
            });
        }

        let state_id = |name: &str| {
            state_ids
                .get(name)
                .copied()
                .ok_or_else(|| SimError::UnknownState(name.to_owned()))
        };

        let mut transitions: Vec<Vec<Transition>> = vec![Vec::new(); states.len()];
        for config in &scene.transitions {
            let from = state_id(&config.from)?;
            let target = match &config.to {
                TransitionTargetConfig::Single(name) => TransitionTarget::Single(state_id(name)?),
                TransitionTargetConfig::Random(choices) => {
                    let total: f32 = choices.iter().map(|c| c.weight.max(0.0)).sum();
                    if total <= 0.0 {
                        return Err(SimError::Config(format!(
                            "random transition from \"{}\" has no positive weight",
                            config.from
                        )));
                    }
                    TransitionTarget::Random(
                        choices
                            .iter()
                            .map(|c| -> SimResult<(StateId, f32)> {
                                Ok((state_id(&c.state)?, c.weight))
                            })
                            .collect::<SimResult<_>>()?,
                    )
                }
            };

            if states[from].is_final {
                warn!("Transition from final state \"{}\" is never evaluated", config.from);
            }
            transitions[from].push(Transition {
                condition: config.condition.clone(),
                target,
            });
        }

        Ok(FsmGraph {
            states,
            transitions,
            goal_sets,
            seed: scene.simulation.seed,
        })
    }

    /// Agents of every group in declaration order, and their initial states.
    fn build_agents(
        &self,
        graph: &FsmGraph,
        model_ids: &BTreeMap<&str, usize>,
    ) -> SimResult<(Vec<Agent>, Vec<StateId>)> {
        let mut rng = fastrand::Rng::with_seed(self.scene.simulation.seed);
        let mut agents = Vec::new();
        let mut initial_states = Vec::new();

        for group in &self.scene.groups {
            let profile = self
                .scene
                .profiles
                .get(&group.profile)
                .ok_or_else(|| SimError::UnknownProfile(group.profile.clone()))?;
            let model = *model_ids
                .get(profile.model.as_str())
                .ok_or_else(|| SimError::UnknownModel(profile.model.clone()))?;
            let state = graph
                .state_id(&group.state)
                .ok_or_else(|| SimError::UnknownState(group.state.clone()))?;
            group.generator.validate().map_err(SimError::Config)?;

            for pos in group.generator.positions() {
                let pos = match &group.noise {
                    Some(noise) => perturb(pos, noise, &mut rng),
                    None => pos,
                };
                agents.push(Agent::new(agents.len(), pos, profile, model));
                initial_states.push(state);
            }
        }

        Ok((agents, initial_states))
    }

    fn validate_agent_targets(&self, graph: &FsmGraph, agent_count: usize) -> SimResult<()> {
        for state in &graph.states {
            if let GoalSelector::Agent { target } = state.goal_selector {
                if target >= agent_count {
                    return Err(SimError::UnknownAgent(target));
                }
            }
        }
        Ok(())
    }

    fn build_events(&self, graph: &FsmGraph) -> SimResult<Vec<Event>> {
        self.scene
            .events
            .iter()
            .map(|config| {
                Event::new(
                    config.name.clone(),
                    config.trigger.clone(),
                    config.target.resolve(graph)?,
                    config.effect.resolve(graph)?,
                )
            })
            .collect()
    }
}

fn validate_profile(profile: &AgentProfile) -> Result<(), String> {
    let checks = [
        ("radius", profile.radius, true),
        ("mass", profile.mass, true),
        ("max_accel", profile.max_accel, true),
        ("pref_speed", profile.pref_speed, false),
        ("max_speed", profile.max_speed, false),
        ("neighbor_dist", profile.neighbor_dist, false),
        ("max_angular_velocity", profile.max_angular_velocity, false),
    ];

    for (name, value, strict) in checks {
        let invalid = value.is_nan() || if strict { value <= 0.0 } else { value < 0.0 };
        if invalid {
            let bound = if strict { "positive" } else { "non-negative" };
            return Err(format!("{name} must be {bound}, got {value}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        [models.default]
        kind = "social_force"

        [profiles.walker]
        model = "default"

        [[goal_sets]]
        id = 0
        goals = [{ id = 0, goal = { kind = "point", position = [5.0, 0.0] } }]

        [[states]]
        name = "walk"
        goal_selector = { kind = "explicit", goal_set = 0, goal = 0 }

        [[states]]
        name = "done"
        final = true

        [[transitions]]
        from = "walk"
        to = "done"
        condition = { kind = "goal_reached", distance = 0.2 }

        [[groups]]
        profile = "walker"
        state = "walk"
        generator = { kind = "explicit", positions = [[0.0, 0.0], [0.0, 1.0]] }
    "#;

    fn build(extra: &str) -> SimResult<Simulator> {
        let scene = Scene::from_toml_str(&format!("{BASE}\n{extra}"))?;
        SceneBuilder::new(&scene).build(&SimulatorOptions::default())
    }

    #[test]
    fn test_build_base_scene() {
        let simulator = match build("") {
            Ok(simulator) => simulator,
            Err(e) => panic!("{e}"),
        };

        assert_eq!(simulator.agents().len(), 2);
        assert!(simulator.is_running());
        assert_eq!(simulator.state_name(1), "walk");
        assert!(simulator.agents()[0].vel_pref.x > 0.0);
    }

    #[test]
    fn test_unknown_names() {
        let unknown_state = build(
            r#"
            [[transitions]]
            from = "walk"
            to = "nowhere"
            condition = { kind = "auto" }
            "#,
        );
        assert!(matches!(unknown_state, Err(SimError::UnknownState(s)) if s == "nowhere"));

        let unknown_profile = build(
            r#"
            [[groups]]
            profile = "runner"
            state = "walk"
            generator = { kind = "explicit", positions = [] }
            "#,
        );
        assert!(matches!(unknown_profile, Err(SimError::UnknownProfile(_))));

        let unknown_model = build(
            r#"
            [profiles.runner]
            model = "fast"
            "#,
        );
        assert!(matches!(unknown_model, Err(SimError::UnknownModel(m)) if m == "fast"));
    }

    #[test]
    fn test_duplicate_state() {
        let duplicate = build(
            r#"
            [[states]]
            name = "walk"
            "#,
        );

        assert!(matches!(duplicate, Err(SimError::DuplicateState(_))));
    }

    #[test]
    fn test_missing_goal() {
        let missing = build(
            r#"
            [[states]]
            name = "wander"
            goal_selector = { kind = "explicit", goal_set = 0, goal = 4 }
            "#,
        );

        assert!(matches!(missing, Err(SimError::UnknownGoal { set: 0, goal: 4 })));
    }

    #[test]
    fn test_invalid_values() {
        let scene = Scene::from_toml_str(&BASE.replace(
            "model = \"default\"",
            "model = \"default\"\nradius = 0.0",
        ))
        .unwrap();
        let result = SceneBuilder::new(&scene).build(&SimulatorOptions::default());
        assert!(matches!(result, Err(SimError::Config(_))));

        let mut scene = Scene::from_toml_str(BASE).unwrap();
        scene.simulation.time_step = 0.0;
        let result = SceneBuilder::new(&scene).build(&SimulatorOptions::default());
        assert!(matches!(result, Err(SimError::Config(_))));

        scene.simulation.time_step = 0.1;
        scene.states.clear();
        let result = SceneBuilder::new(&scene).build(&SimulatorOptions::default());
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn test_invalid_grid_unit() {
        let scene = Scene::from_toml_str(BASE).unwrap();

        for unit in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let options = SimulatorOptions {
                neighbor_grid_unit: unit,
                ..Default::default()
            };
            let result = SceneBuilder::new(&scene).build(&options);
            assert!(matches!(result, Err(SimError::Config(_))), "unit {unit}");
        }
    }

    #[test]
    fn test_negative_angular_velocity() {
        let scene = Scene::from_toml_str(&BASE.replace(
            "model = \"default\"",
            "model = \"default\"\nmax_angular_velocity = -90.0",
        ))
        .unwrap();
        let result = SceneBuilder::new(&scene).build(&SimulatorOptions::default());

        assert!(matches!(result, Err(SimError::Config(e)) if e.contains("max_angular_velocity")));
    }

    #[test]
    fn test_follow_missing_agent() {
        let result = build(
            r#"
            [[states]]
            name = "follow"
            goal_selector = { kind = "agent", target = 2 }
            "#,
        );

        assert!(matches!(result, Err(SimError::UnknownAgent(2))));
    }

    #[test]
    fn test_noise_is_seeded() {
        let noisy = r#"
            [[groups]]
            profile = "walker"
            state = "walk"
            generator = { kind = "explicit", positions = [[10.0, 0.0]] }
            noise = { kind = "uniform", min = 0.1, max = 0.5 }
        "#;
        let a = build(noisy).unwrap();
        let b = build(noisy).unwrap();

        let (pa, pb) = (a.agents()[2].pos, b.agents()[2].pos);
        assert_eq!(pa, pb);
        let offset = pa.distance(glam::vec2(10.0, 0.0));
        assert!((0.1 - 1e-5..=0.5 + 1e-5).contains(&offset));
    }
}
