use std::collections::BTreeMap;

use glam::Vec2;
use log::warn;
use serde::Deserialize;

use super::goal::{ActiveGoal, GoalSet};
use crate::error::{SimError, SimResult};

/// Policy picking the goal an agent pursues when it enters a state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalSelector {
    /// The agent's own position.
    #[default]
    Identity,
    /// A fixed goal of a goal set.
    Explicit { goal_set: usize, goal: usize },
    /// The goal of a set nearest to the agent.
    Nearest { goal_set: usize },
    /// A goal of a set drawn by weight.
    Random { goal_set: usize },
    /// Another agent, followed while it exists.
    Agent { target: usize },
}

impl GoalSelector {
    pub fn select(
        &self,
        agent_id: usize,
        pos: Vec2,
        goal_sets: &BTreeMap<usize, GoalSet>,
        agent_count: usize,
        rng: &mut fastrand::Rng,
    ) -> ActiveGoal {
        let shared = |set: usize, goal: Option<usize>| match goal {
            Some(goal) => ActiveGoal::Shared { set, goal },
            None => {
                warn!("Agent {agent_id}: goal set {set} has no goal to select");
                ActiveGoal::Identity
            }
        };

        match *self {
            GoalSelector::Identity => ActiveGoal::Identity,
            GoalSelector::Explicit { goal_set, goal } => ActiveGoal::Shared { set: goal_set, goal },
            GoalSelector::Nearest { goal_set } => {
                shared(goal_set, goal_sets.get(&goal_set).and_then(|s| s.nearest(pos)))
            }
            GoalSelector::Random { goal_set } => {
                shared(goal_set, goal_sets.get(&goal_set).and_then(|s| s.random(rng)))
            }
            GoalSelector::Agent { target } => {
                if target == agent_id || target >= agent_count {
                    warn!("Agent {agent_id}: cannot follow agent {target}");
                    ActiveGoal::Identity
                } else {
                    ActiveGoal::Agent { target }
                }
            }
        }
    }

    /// Check the goal references against the available goal sets.
    pub fn validate(&self, goal_sets: &BTreeMap<usize, GoalSet>) -> SimResult<()> {
        let set_of = |id: usize| goal_sets.get(&id).ok_or(SimError::UnknownGoalSet(id));

        match *self {
            GoalSelector::Explicit { goal_set, goal } => {
                if set_of(goal_set)?.get(goal).is_none() {
                    return Err(SimError::UnknownGoal { set: goal_set, goal });
                }
            }
            GoalSelector::Nearest { goal_set } | GoalSelector::Random { goal_set } => {
                if set_of(goal_set)?.is_empty() {
                    return Err(SimError::Config(format!("goal set {goal_set} is empty")));
                }
            }
            GoalSelector::Identity | GoalSelector::Agent { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;
    use crate::bfsm::goal::{Goal, WeightedGoal};

    fn goal_sets() -> BTreeMap<usize, GoalSet> {
        let goals = [(0, vec2(5.0, 0.0)), (1, vec2(-1.0, 0.0))]
            .into_iter()
            .map(|(id, position)| {
                let goal = Goal::Point { position };
                (id, WeightedGoal { id, weight: 1.0, goal })
            })
            .collect();
        BTreeMap::from([(2, GoalSet { goals })])
    }

    #[test]
    fn test_select() {
        let sets = goal_sets();
        let mut rng = fastrand::Rng::with_seed(0);

        let nearest = GoalSelector::Nearest { goal_set: 2 };
        assert_eq!(
            nearest.select(0, Vec2::ZERO, &sets, 3, &mut rng),
            ActiveGoal::Shared { set: 2, goal: 1 }
        );

        let follow = GoalSelector::Agent { target: 1 };
        assert_eq!(follow.select(0, Vec2::ZERO, &sets, 3, &mut rng), ActiveGoal::Agent { target: 1 });
        assert_eq!(follow.select(1, Vec2::ZERO, &sets, 3, &mut rng), ActiveGoal::Identity);
        assert_eq!(follow.select(0, Vec2::ZERO, &sets, 1, &mut rng), ActiveGoal::Identity);
    }

    #[test]
    fn test_validate() {
        let sets = goal_sets();

        assert!(GoalSelector::Explicit { goal_set: 2, goal: 1 }.validate(&sets).is_ok());
        assert!(matches!(
            GoalSelector::Explicit { goal_set: 2, goal: 5 }.validate(&sets),
            Err(SimError::UnknownGoal { set: 2, goal: 5 })
        ));
        assert!(matches!(
            GoalSelector::Random { goal_set: 4 }.validate(&sets),
            Err(SimError::UnknownGoalSet(4))
        ));
    }
}
