//! Behavior finite-state machine.
//!
//! The graph of states, transitions and goal sets is shared read-only by all
//! agents. Everything that changes per agent lives in an [`AgentRecord`].

mod action;
mod condition;
mod goal;
mod selector;
mod transition;
mod velocity;

use std::collections::BTreeMap;

use log::debug;
use rayon::prelude::*;

pub use self::{
    action::{Action, Undo},
    condition::{Condition, ConditionInput},
    goal::{ActiveGoal, Goal, GoalSet, WeightedGoal},
    selector::GoalSelector,
    transition::{Transition, TransitionTarget},
    velocity::VelComponent,
};
use crate::agent::{Agent, AgentSnapshot};

pub type StateId = usize;

/// Step index used to seed random draws made during initialization.
const INIT_STEP: u64 = u64::MAX;

/// Named node of the behavior graph.
#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    /// Final states evaluate no transitions.
    pub is_final: bool,
    pub goal_selector: GoalSelector,
    pub velocity: VelComponent,
    /// Applied on enter.
    pub actions: Vec<Action>,
}

/// Per-agent state machine data.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub state: StateId,
    pub goal: ActiveGoal,
    /// Simulation time at which the current state was entered.
    pub entered_at: f32,
    undo: Vec<Undo>,
}

impl AgentRecord {
    fn new(state: StateId) -> Self {
        AgentRecord {
            state,
            goal: ActiveGoal::Identity,
            entered_at: 0.0,
            undo: Vec::new(),
        }
    }
}

/// Shared, immutable part of the state machine.
#[derive(Debug, Clone, Default)]
pub struct FsmGraph {
    pub states: Vec<State>,
    /// Outgoing transitions of each state, in declaration order.
    pub transitions: Vec<Vec<Transition>>,
    pub goal_sets: BTreeMap<usize, GoalSet>,
    /// Seed of every random draw made by the state machine.
    pub seed: u64,
}

impl FsmGraph {
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.states.iter().position(|s| s.name == name)
    }

    /// Generator for the draws of one agent in one step.
    fn rng(&self, agent_id: usize, step: u64) -> fastrand::Rng {
        let agent_salt = (agent_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let step_salt = step.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        fastrand::Rng::with_seed(self.seed ^ agent_salt ^ step_salt)
    }

    fn enter(
        &self,
        state: StateId,
        agent: &mut Agent,
        record: &mut AgentRecord,
        agent_count: usize,
        time: f32,
        rng: &mut fastrand::Rng,
    ) {
        let s = &self.states[state];
        record.state = state;
        record.entered_at = time;

        for action in &s.actions {
            if let Some(undo) = action.apply(agent) {
                record.undo.push(undo);
            }
        }
        record.goal = s
            .goal_selector
            .select(agent.id, agent.pos, &self.goal_sets, agent_count, rng);
    }

    fn exit(&self, agent: &mut Agent, record: &mut AgentRecord) {
        while let Some(undo) = record.undo.pop() {
            undo.restore(agent);
        }
    }

    fn transition(
        &self,
        next: StateId,
        agent: &mut Agent,
        record: &mut AgentRecord,
        agent_count: usize,
        time: f32,
        rng: &mut fastrand::Rng,
    ) {
        debug!(
            "Agent {}: {} -> {} at {time:.2}",
            agent.id, self.states[record.state].name, self.states[next].name
        );
        self.exit(agent, record);
        self.enter(next, agent, record, agent_count, time, rng);
    }

    /// Fire at most one transition, then refresh the preferred velocity.
    fn update_agent(
        &self,
        agent: &mut Agent,
        record: &mut AgentRecord,
        world: &[AgentSnapshot],
        time: f32,
        time_step: f32,
        step: u64,
    ) {
        if !self.states[record.state].is_final {
            let (goal_point, _) = record.goal.resolve(agent.pos, &self.goal_sets, world);
            let input = ConditionInput {
                goal_distance_sq: goal_point.distance_squared(agent.pos),
                time_in_state: time - record.entered_at,
            };

            if let Some(t) = self.transitions[record.state]
                .iter()
                .find(|t| t.condition.evaluate(&input))
            {
                let mut rng = self.rng(agent.id, step);
                let next = t.target.resolve(&mut rng);
                self.transition(next, agent, record, world.len(), time, &mut rng);
            }
        }

        self.update_preferred_velocity(agent, record, world, time_step);
    }

    fn update_preferred_velocity(
        &self,
        agent: &mut Agent,
        record: &AgentRecord,
        world: &[AgentSnapshot],
        time_step: f32,
    ) {
        let (goal_point, goal_vel) = record.goal.resolve(agent.pos, &self.goal_sets, world);
        agent.vel_pref = self.states[record.state].velocity.preferred_velocity(
            agent.pos,
            agent.pref_speed,
            goal_point,
            goal_vel,
            time_step,
        );
    }
}

/// Behavior state machine for a population of agents.
pub struct Fsm {
    graph: FsmGraph,
    records: Vec<AgentRecord>,
}

impl Fsm {
    /// Put every agent into its initial state and compute its first preferred
    /// velocity.
    pub fn new(graph: FsmGraph, agents: &mut [Agent], initial_states: &[StateId], time_step: f32) -> Self {
        assert_eq!(agents.len(), initial_states.len());

        let world: Vec<AgentSnapshot> = agents
            .iter()
            .zip(initial_states)
            .map(|(agent, &state)| agent.snapshot(state))
            .collect();

        let records = agents
            .iter_mut()
            .zip(initial_states)
            .map(|(agent, &state)| {
                let mut record = AgentRecord::new(state);
                let mut rng = graph.rng(agent.id, INIT_STEP);
                graph.enter(state, agent, &mut record, world.len(), 0.0, &mut rng);
                graph.update_preferred_velocity(agent, &record, &world, time_step);
                record
            })
            .collect();

        Fsm { graph, records }
    }

    /// Evaluate transitions and preferred velocities of all agents.
    ///
    /// `world` holds the committed state of every agent.
    pub fn update(
        &mut self,
        agents: &mut [Agent],
        world: &[AgentSnapshot],
        time: f32,
        time_step: f32,
        step: u64,
    ) {
        let graph = &self.graph;
        self.records
            .par_iter_mut()
            .zip(agents.par_iter_mut())
            .for_each(|(record, agent)| {
                graph.update_agent(agent, record, world, time, time_step, step)
            });
    }

    /// Move an agent to `state` regardless of its transitions.
    pub fn force_state(&mut self, agent: &mut Agent, state: StateId, agent_count: usize, time: f32, step: u64) {
        let graph = &self.graph;
        let record = &mut self.records[agent.id];
        let mut rng = graph.rng(agent.id, step);
        graph.transition(state, agent, record, agent_count, time, &mut rng);
    }

    pub fn records(&self) -> &[AgentRecord] {
        &self.records
    }

    pub fn current_state(&self, agent: usize) -> StateId {
        self.records[agent].state
    }

    pub fn state_name(&self, state: StateId) -> &str {
        &self.graph.states[state].name
    }

    pub fn is_final(&self, agent: usize) -> bool {
        self.graph.states[self.records[agent].state].is_final
    }

    pub fn all_final(&self) -> bool {
        (0..self.records.len()).all(|i| self.is_final(i))
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::{vec2, Vec2};

    use super::*;
    use crate::scenario::AgentProfile;

    fn state(name: &str, is_final: bool, goal_selector: GoalSelector) -> State {
        State {
            name: name.to_owned(),
            is_final,
            goal_selector,
            velocity: VelComponent::Goal,
            actions: Vec::new(),
        }
    }

    fn point_goals(points: &[Vec2]) -> BTreeMap<usize, GoalSet> {
        let goals = points
            .iter()
            .enumerate()
            .map(|(id, &position)| {
                let goal = Goal::Point { position };
                (id, WeightedGoal { id, weight: 1.0, goal })
            })
            .collect();
        BTreeMap::from([(0, GoalSet { goals })])
    }

    fn single(to: StateId, condition: Condition) -> Transition {
        Transition {
            condition,
            target: TransitionTarget::Single(to),
        }
    }

    fn agents_at(positions: &[Vec2]) -> Vec<Agent> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &p)| Agent::new(i, p, &AgentProfile::default(), 0))
            .collect()
    }

    fn world(agents: &[Agent], fsm: &Fsm) -> Vec<AgentSnapshot> {
        agents.iter().map(|a| a.snapshot(fsm.current_state(a.id))).collect()
    }

    #[test]
    fn test_first_declared_transition_fires() {
        let graph = FsmGraph {
            states: vec![
                state("walk", false, GoalSelector::Identity),
                state("first", true, GoalSelector::Identity),
                state("second", true, GoalSelector::Identity),
            ],
            transitions: vec![
                vec![single(1, Condition::Auto), single(2, Condition::Auto)],
                vec![],
                vec![],
            ],
            ..Default::default()
        };
        let mut agents = agents_at(&[Vec2::ZERO]);
        let mut fsm = Fsm::new(graph, &mut agents, &[0], 0.1);

        let world = world(&agents, &fsm);
        fsm.update(&mut agents, &world, 0.0, 0.1, 0);

        assert_eq!(fsm.state_name(fsm.current_state(0)), "first");
        assert!(fsm.all_final());
    }

    #[test]
    fn test_goal_reached_at_threshold() {
        let graph = FsmGraph {
            states: vec![
                state("walk", false, GoalSelector::Explicit { goal_set: 0, goal: 0 }),
                state("stop", true, GoalSelector::Identity),
            ],
            transitions: vec![vec![single(1, Condition::GoalReached { distance: 0.2 })], vec![]],
            goal_sets: point_goals(&[Vec2::ZERO]),
            ..Default::default()
        };
        let mut agents = agents_at(&[vec2(0.2, 0.0), vec2(0.0, 0.3)]);
        let mut fsm = Fsm::new(graph, &mut agents, &[0, 0], 0.1);

        let world = world(&agents, &fsm);
        fsm.update(&mut agents, &world, 0.0, 0.1, 0);

        assert!(fsm.is_final(0));
        assert!(!fsm.is_final(1));
        assert_eq!(agents[0].vel_pref, Vec2::ZERO);
        assert!(agents[1].vel_pref.y < 0.0);
    }

    #[test]
    fn test_final_state_has_no_transitions() {
        let graph = FsmGraph {
            states: vec![
                state("done", true, GoalSelector::Identity),
                state("other", false, GoalSelector::Identity),
            ],
            transitions: vec![vec![single(1, Condition::Auto)], vec![]],
            ..Default::default()
        };
        let mut agents = agents_at(&[Vec2::ZERO]);
        let mut fsm = Fsm::new(graph, &mut agents, &[0], 0.1);

        let world = world(&agents, &fsm);
        fsm.update(&mut agents, &world, 1.0, 0.1, 3);

        assert_eq!(fsm.current_state(0), 0);
    }

    #[test]
    fn test_timer_and_undo_on_exit() {
        let mut slow = state("slow", false, GoalSelector::Identity);
        slow.actions.push(Action::SetPrefSpeed {
            value: 0.3,
            undo_on_exit: true,
        });
        let graph = FsmGraph {
            states: vec![slow, state("done", true, GoalSelector::Identity)],
            transitions: vec![vec![single(1, Condition::Timer { duration: 1.0 })], vec![]],
            ..Default::default()
        };
        let mut agents = agents_at(&[Vec2::ZERO]);
        let pref_speed = agents[0].pref_speed;
        let mut fsm = Fsm::new(graph, &mut agents, &[0], 0.1);

        assert_float_absolute_eq!(agents[0].pref_speed, 0.3);

        let world = world(&agents, &fsm);
        fsm.update(&mut agents, &world, 0.5, 0.1, 0);
        assert_eq!(fsm.current_state(0), 0);

        fsm.update(&mut agents, &world, 1.0, 0.1, 1);
        assert_eq!(fsm.current_state(0), 1);
        assert_eq!(agents[0].pref_speed, pref_speed);
    }

    #[test]
    fn test_follow_agent() {
        let graph = FsmGraph {
            states: vec![
                state("follow", false, GoalSelector::Agent { target: 1 }),
                state("idle", false, GoalSelector::Identity),
            ],
            transitions: vec![vec![], vec![]],
            ..Default::default()
        };
        let mut agents = agents_at(&[Vec2::ZERO, vec2(0.0, 5.0)]);
        let mut fsm = Fsm::new(graph, &mut agents, &[0, 1], 0.1);

        assert!(agents[0].vel_pref.y > 0.0);
        assert_eq!(agents[1].vel_pref, Vec2::ZERO);

        agents[1].pos = vec2(5.0, 0.0);
        let world = world(&agents, &fsm);
        fsm.update(&mut agents, &world, 0.1, 0.1, 0);

        assert!(agents[0].vel_pref.x > 0.0);
        assert_float_absolute_eq!(agents[0].vel_pref.y, 0.0);
    }

    #[test]
    fn test_force_state_reselects_goal() {
        let graph = FsmGraph {
            states: vec![
                state("idle", false, GoalSelector::Identity),
                state("go", false, GoalSelector::Explicit { goal_set: 0, goal: 0 }),
            ],
            transitions: vec![vec![], vec![]],
            goal_sets: point_goals(&[vec2(3.0, 0.0)]),
            ..Default::default()
        };
        let mut agents = agents_at(&[Vec2::ZERO]);
        let mut fsm = Fsm::new(graph, &mut agents, &[0], 0.1);

        fsm.force_state(&mut agents[0], 1, 1, 2.0, 5);

        assert_eq!(fsm.current_state(0), 1);
        assert_eq!(fsm.records()[0].goal, ActiveGoal::Shared { set: 0, goal: 0 });
        assert_eq!(fsm.records()[0].entered_at, 2.0);
    }
}
