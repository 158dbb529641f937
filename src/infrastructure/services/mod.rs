//! Infrastructure services

mod experiment_service;

pub use experiment_service::{
    EngineSnapshot, ExperimentEngine, InMemoryExperimentEngine, RecordMetricParams,
};
