//! Domain layer - Experiments, observations and analysis results

pub mod error;
pub mod experiment;

pub use error::DomainError;
