use serde::Deserialize;

/// Agent state a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ConditionInput {
    /// Squared distance from the agent to its current goal.
    pub goal_distance_sq: f32,
    /// Time spent in the current state. (seconds)
    pub time_in_state: f32,
}

/// Predicate guarding a transition.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Always true.
    Auto,
    /// True once the goal is within `distance`, inclusive.
    GoalReached { distance: f32 },
    /// True once the agent has spent `duration` in the state.
    Timer { duration: f32 },
    Not { condition: Box<Condition> },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
}

impl Condition {
    pub fn evaluate(&self, input: &ConditionInput) -> bool {
        match self {
            Condition::Auto => true,
            Condition::GoalReached { distance } => input.goal_distance_sq <= distance * distance,
            Condition::Timer { duration } => input.time_in_state >= *duration,
            Condition::Not { condition } => !condition.evaluate(input),
            Condition::And { conditions } => conditions.iter().all(|c| c.evaluate(input)),
            Condition::Or { conditions } => conditions.iter().any(|c| c.evaluate(input)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(goal_distance: f32, time_in_state: f32) -> ConditionInput {
        ConditionInput {
            goal_distance_sq: goal_distance * goal_distance,
            time_in_state,
        }
    }

    #[test]
    fn test_goal_reached_is_inclusive() {
        let condition = Condition::GoalReached { distance: 0.2 };

        assert!(condition.evaluate(&input(0.2, 0.0)));
        assert!(condition.evaluate(&input(0.1, 0.0)));
        assert!(!condition.evaluate(&input(0.2001, 0.0)));
    }

    #[test]
    fn test_combinators() {
        let timer = Condition::Timer { duration: 1.0 };
        let near = Condition::GoalReached { distance: 1.0 };
        let both = Condition::And {
            conditions: vec![timer.clone(), near.clone()],
        };
        let either = Condition::Or {
            conditions: vec![timer.clone(), near],
        };
        let not_timer = Condition::Not {
            condition: Box::new(timer),
        };

        assert!(!both.evaluate(&input(0.5, 0.5)));
        assert!(both.evaluate(&input(0.5, 1.0)));
        assert!(either.evaluate(&input(0.5, 0.5)));
        assert!(!either.evaluate(&input(2.0, 0.5)));
        assert!(not_timer.evaluate(&input(0.0, 0.5)));
        assert!(Condition::Auto.evaluate(&input(100.0, 0.0)));
    }
}
