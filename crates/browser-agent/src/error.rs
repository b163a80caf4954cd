use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse actor response: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("actor process error: {0}")]
    Process(String),

    /// The actor answered, but not with what the protocol allows here.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The actor reported a scripted failure (selector missing, nav timeout).
    #[error("actor reported: {0}")]
    Actor(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
