//! prodsight: manufacturing process-quality backend.
//!
//! Assembles ML-ready feature/target datasets from shop-floor sensor
//! readings and drives ML pipelines on an external workflow orchestrator:
//! template generation, run lifecycle, status synchronization and
//! deployment of prediction outputs as virtual sensors.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod run;
pub mod store;

pub use error::{
    ConfigError, DatasetError, IngestError, LifecycleError, OrchestratorError, PipelineError,
};
