use serde::Deserialize;

use crate::agent::Agent;

/// Property change applied to an agent when it enters a state.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    SetPrefSpeed {
        value: f32,
        #[serde(default)]
        undo_on_exit: bool,
    },
    ScaleMaxSpeed {
        factor: f32,
        #[serde(default)]
        undo_on_exit: bool,
    },
    OffsetRadius {
        offset: f32,
        #[serde(default)]
        undo_on_exit: bool,
    },
}

/// Previous value of a property changed by an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Undo {
    PrefSpeed(f32),
    MaxSpeed(f32),
    Radius(f32),
}

impl Action {
    /// Apply the action, returning how to restore the agent when the action
    /// is undone on exit.
    pub fn apply(&self, agent: &mut Agent) -> Option<Undo> {
        match *self {
            Action::SetPrefSpeed { value, undo_on_exit } => {
                let undo = Undo::PrefSpeed(agent.pref_speed);
                agent.pref_speed = value.max(0.0);
                undo_on_exit.then_some(undo)
            }
            Action::ScaleMaxSpeed { factor, undo_on_exit } => {
                let undo = Undo::MaxSpeed(agent.max_speed);
                agent.max_speed = (agent.max_speed * factor).max(0.0);
                undo_on_exit.then_some(undo)
            }
            Action::OffsetRadius { offset, undo_on_exit } => {
                let undo = Undo::Radius(agent.radius);
                let radius = agent.radius + offset;
                if radius > 0.0 {
                    agent.radius = radius;
                }
                undo_on_exit.then_some(undo)
            }
        }
    }
}

impl Undo {
    pub fn restore(self, agent: &mut Agent) {
        match self {
            Undo::PrefSpeed(value) => agent.pref_speed = value,
            Undo::MaxSpeed(value) => agent.max_speed = value,
            Undo::Radius(value) => agent.radius = value,
        }
    }
}
