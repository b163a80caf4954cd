use thiserror::Error;

#[derive(Debug, Error)]
pub enum DroverError {
    /// Transient actor failure (login hiccup, dead browser, protocol error).
    /// Handled by restarting the session, bounded by `max_restarts`.
    #[error("actor fault: {0}")]
    ActorFault(String),

    #[error("no credential on file for account '{0}'")]
    MissingCredential(String),

    #[error("spawning refused: outside the configured work window")]
    OutsideWorkWindow,

    #[error("durable state write failed: {0}")]
    Persistence(String),

    #[error("duplicate live session for account '{0}'")]
    DuplicateSession(String),

    #[error("decision source error: {0}")]
    DecisionSource(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DroverError>;
