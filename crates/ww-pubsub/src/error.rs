use thiserror::Error;
use ww_cap::CapError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PubSubError {
    /// The registry has shut down or the topic was torn down.
    #[error("closed")]
    Closed,

    #[error("already closed")]
    AlreadyClosed,

    #[error("failed to join topic {topic:?}: {reason}")]
    JoinFailed { topic: String, reason: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("capability error: {0}")]
    Capability(#[from] CapError),
}

pub type PubSubResult<T> = Result<T, PubSubError>;
