use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cluster error: {0}")]
    Cluster(#[from] ww_cluster::ClusterError),

    #[error("pubsub error: {0}")]
    PubSub(#[from] ww_pubsub::PubSubError),

    #[error("identity error: {0}")]
    Identity(#[from] ww_types::TypeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
