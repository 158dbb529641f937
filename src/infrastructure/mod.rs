//! Infrastructure layer - Storage, statistics and runtime plumbing

pub mod experiment;
pub mod logging;
pub mod observability;
pub mod services;
