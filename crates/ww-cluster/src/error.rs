use std::time::Duration;

use thiserror::Error;
use ww_cap::CapError;
use ww_types::TypeError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("invalid path {path:?}: {source}")]
    InvalidPath { path: String, source: TypeError },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unknown anchor: {0}")]
    UnknownAnchor(String),

    #[error("anchor server closed")]
    Closed,

    #[error("membership view timed out after {0:?}")]
    Timeout(Duration),

    #[error("routing table error: {0}")]
    Routing(String),

    #[error("capability error: {0}")]
    Capability(#[from] CapError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
