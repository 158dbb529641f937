use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Unsupported arity: analysis requires exactly 2 variants, observed {observed}")]
    UnsupportedArity { observed: usize },

    #[error("Insufficient data: {observed} observations, minimum sample size is {required}")]
    InsufficientData { observed: usize, required: usize },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn unsupported_arity(observed: usize) -> Self {
        Self::UnsupportedArity { observed }
    }

    pub fn insufficient_data(observed: usize, required: usize) -> Self {
        Self::InsufficientData { observed, required }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Soft errors still leave the engine with a usable result
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
