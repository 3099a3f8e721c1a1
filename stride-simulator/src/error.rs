use thiserror::Error;

/// Errors raised while turning a scene description into a simulator.
///
/// All of them are detected at setup time; a running simulation never fails.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to parse scene: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown state \"{0}\"")]
    UnknownState(String),

    #[error("duplicate state \"{0}\"")]
    DuplicateState(String),

    #[error("unknown model \"{0}\"")]
    UnknownModel(String),

    #[error("unknown agent profile \"{0}\"")]
    UnknownProfile(String),

    #[error("goal set {0} is not defined")]
    UnknownGoalSet(usize),

    #[error("goal {goal} is not defined in goal set {set}")]
    UnknownGoal { set: usize, goal: usize },

    #[error("agent {0} does not exist")]
    UnknownAgent(usize),
}

pub type SimResult<T> = Result<T, SimError>;
