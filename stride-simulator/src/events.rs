//! Scheduled changes applied to sets of agents between steps.

use std::collections::BTreeSet;

use log::{info, warn};
use serde::Deserialize;

use crate::{
    agent::Agent,
    bfsm::{Fsm, FsmGraph, StateId},
    error::{SimError, SimResult},
};

/// Slack when comparing the simulation clock with trigger times.
const TIME_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire once when the clock reaches `time`.
    AtTime { time: f32 },
    /// Fire every `period` seconds starting at `start`.
    Periodic {
        period: f32,
        #[serde(default)]
        start: f32,
    },
}

/// Agent set description as found in a scene.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    ById { id: usize },
    All,
    InState { state: String },
    Union { targets: Vec<TargetConfig> },
    Intersection { targets: Vec<TargetConfig> },
    /// First target minus all the others.
    Difference { targets: Vec<TargetConfig> },
    /// All agents not in the target.
    Negation { target: Box<TargetConfig> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectConfig {
    SetState { state: String },
    ScaleRadius { factor: f32 },
    SetPrefSpeed { value: f32 },
}

/// Set of agents, evaluated whenever its event fires.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTarget {
    ById(usize),
    All,
    InState(StateId),
    Union(Vec<AgentTarget>),
    Intersection(Vec<AgentTarget>),
    Difference(Vec<AgentTarget>),
    Negation(Box<AgentTarget>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    SetState(StateId),
    ScaleRadius(f32),
    SetPrefSpeed(f32),
}

impl TargetConfig {
    pub fn resolve(&self, graph: &FsmGraph) -> SimResult<AgentTarget> {
        let all = |targets: &[TargetConfig]| -> SimResult<Vec<AgentTarget>> {
            targets.iter().map(|t| t.resolve(graph)).collect()
        };

        Ok(match self {
            TargetConfig::ById { id } => AgentTarget::ById(*id),
            TargetConfig::All => AgentTarget::All,
            TargetConfig::InState { state } => AgentTarget::InState(
                graph
                    .state_id(state)
                    .ok_or_else(|| SimError::UnknownState(state.clone()))?,
            ),
            TargetConfig::Union { targets } => AgentTarget::Union(all(targets)?),
            TargetConfig::Intersection { targets } => AgentTarget::Intersection(all(targets)?),
            TargetConfig::Difference { targets } => AgentTarget::Difference(all(targets)?),
            TargetConfig::Negation { target } => {
                AgentTarget::Negation(Box::new(target.resolve(graph)?))
            }
        })
    }
}

impl EffectConfig {
    pub fn resolve(&self, graph: &FsmGraph) -> SimResult<Effect> {
        match *self {
            EffectConfig::SetState { ref state } => graph
                .state_id(state)
                .map(Effect::SetState)
                .ok_or_else(|| SimError::UnknownState(state.clone())),
            EffectConfig::ScaleRadius { factor } if factor > 0.0 => Ok(Effect::ScaleRadius(factor)),
            EffectConfig::ScaleRadius { factor } => Err(SimError::Config(format!(
                "radius scale must be positive, got {factor}"
            ))),
            EffectConfig::SetPrefSpeed { value } => Ok(Effect::SetPrefSpeed(value.max(0.0))),
        }
    }
}

impl AgentTarget {
    /// Ids of the targeted agents, given the current state of every agent.
    pub fn agents(&self, current_states: &[StateId]) -> BTreeSet<usize> {
        let agent_count = current_states.len();

        match self {
            AgentTarget::ById(id) => {
                if *id < agent_count {
                    BTreeSet::from([*id])
                } else {
                    warn!("Event target refers to missing agent {id}");
                    BTreeSet::new()
                }
            }
            AgentTarget::All => (0..agent_count).collect(),
            AgentTarget::InState(state) => current_states
                .iter()
                .enumerate()
                .filter(|(_, s)| *s == state)
                .map(|(i, _)| i)
                .collect(),
            AgentTarget::Union(targets) => targets
                .iter()
                .flat_map(|t| t.agents(current_states))
                .collect(),
            AgentTarget::Intersection(targets) => {
                let mut sets = targets.iter().map(|t| t.agents(current_states));
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            }
            AgentTarget::Difference(targets) => {
                let mut sets = targets.iter().map(|t| t.agents(current_states));
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, set| acc.difference(&set).copied().collect())
            }
            AgentTarget::Negation(target) => {
                let excluded = target.agents(current_states);
                (0..agent_count).filter(|i| !excluded.contains(i)).collect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub trigger: Trigger,
    pub target: AgentTarget,
    pub effect: Effect,
    next_time: Option<f32>,
}

impl Event {
    pub fn new(name: String, trigger: Trigger, target: AgentTarget, effect: Effect) -> SimResult<Self> {
        let next_time = match trigger {
            Trigger::AtTime { time } => time,
            Trigger::Periodic { period, start } => {
                if period.is_nan() || period <= 0.0 {
                    return Err(SimError::Config(format!(
                        "event \"{name}\" has non-positive period {period}"
                    )));
                }
                start
            }
        };

        Ok(Event {
            name,
            trigger,
            target,
            effect,
            next_time: Some(next_time),
        })
    }

    /// Whether the event fires at `time`, scheduling the next firing if so.
    fn poll(&mut self, time: f32) -> bool {
        let Some(next_time) = self.next_time else {
            return false;
        };
        if time + TIME_EPSILON < next_time {
            return false;
        }

        self.next_time = match self.trigger {
            Trigger::AtTime { .. } => None,
            Trigger::Periodic { period, .. } => {
                let mut next = next_time + period;
                while next <= time + TIME_EPSILON {
                    next += period;
                }
                Some(next)
            }
        };
        true
    }
}

/// Events of a simulation, evaluated after every step.
#[derive(Debug, Clone, Default)]
pub struct EventSystem {
    events: Vec<Event>,
}

impl EventSystem {
    pub fn new(events: Vec<Event>) -> Self {
        EventSystem { events }
    }

    /// Fire every due event. Returns the number of events fired.
    pub fn evaluate(&mut self, time: f32, step: u64, agents: &mut [Agent], fsm: &mut Fsm) -> usize {
        let mut fired = 0;

        for event in self.events.iter_mut() {
            if !event.poll(time) {
                continue;
            }

            let current_states: Vec<StateId> = (0..agents.len()).map(|i| fsm.current_state(i)).collect();
            let targets = event.target.agents(&current_states);
            info!(
                "Event \"{}\" fired at {time:.2} for {} agents",
                event.name,
                targets.len()
            );

            let agent_count = agents.len();
            for i in targets {
                let agent = &mut agents[i];
                match event.effect {
                    Effect::SetState(state) => {
                        if fsm.current_state(i) != state {
                            fsm.force_state(agent, state, agent_count, time, step);
                        }
                    }
                    Effect::ScaleRadius(factor) => agent.radius *= factor,
                    Effect::SetPrefSpeed(value) => agent.pref_speed = value,
                }
            }
            fired += 1;
        }

        fired
    }
}
