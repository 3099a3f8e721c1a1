use super::{condition::Condition, StateId};

/// Resolver for the state a transition leads to.
#[derive(Debug, Clone)]
pub enum TransitionTarget {
    Single(StateId),
    /// State drawn with probability proportional to its weight.
    Random(Vec<(StateId, f32)>),
}

impl TransitionTarget {
    pub fn resolve(&self, rng: &mut fastrand::Rng) -> StateId {
        match self {
            TransitionTarget::Single(state) => *state,
            TransitionTarget::Random(states) => {
                let total: f32 = states.iter().map(|(_, w)| w.max(0.0)).sum();
                let mut x = rng.f32() * total;
                for &(state, weight) in states {
                    let weight = weight.max(0.0);
                    if x < weight {
                        return state;
                    }
                    x -= weight;
                }
                states.last().map_or(0, |&(state, _)| state)
            }
        }
    }
}

/// Directed edge of the behavior graph.
#[derive(Debug, Clone)]
pub struct Transition {
    pub condition: Condition,
    pub target: TransitionTarget,
}
