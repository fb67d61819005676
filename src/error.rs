use thiserror::Error;

/// Failures surfaced by tasks, combinators and the input sampler.
#[derive(Debug, Error)]
pub enum Error {
    /// A task or sampler was driven in a way its lifecycle does not allow.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A task failed while it was being resumed.
    #[error("task failed: {0:#}")]
    Execution(#[from] anyhow::Error),
    /// Malformed arguments handed to a combinator or the input sampler.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn execution(message: impl std::fmt::Display) -> Self {
        Self::Execution(anyhow::anyhow!("{message}"))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
