use thiserror::Error;

/// Errors raised by the capability runtime itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapError {
    /// All call slots of the capability are taken.
    #[error("capability busy: {max} calls already in flight")]
    Busy { max: usize },

    /// The capability has been shut down.
    #[error("capability released")]
    Released,
}

pub type CapResult<T> = Result<T, CapError>;
