//! Error types for prodsight operations.
//!
//! Defines error types for the major subsystems:
//! - Configuration loading
//! - Dataset building and feature assembly
//! - Pipeline order validation and template generation
//! - Orchestrator communication
//! - Run lifecycle operations (start, terminate, deploy, undeploy)
//! - Sensor reading ingestion

use thiserror::Error;

/// Errors that can occur while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid tenant entry '{0}': expected 'name=postgres-url'")]
    InvalidTenant(String),

    #[error("No tenants configured")]
    NoTenants,
}

/// Errors that can occur while building a dataset from sensor readings.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A requested reduction method is not one of Min/Max/Avg/StdDev.
    #[error("Unsupported reduction method '{0}', expected one of Min, Max, Avg, StdDev, StackedDataFrame")]
    UnsupportedMethod(String),

    /// Neither a feature table nor a target table could be assembled.
    #[error("Dataset produced no output: {0}")]
    EmptyResult(String),

    /// The DataFrame specification is missing a required relation.
    #[error("DataFrame {id} is missing required relation: {relation}")]
    MissingRelation { id: i64, relation: String },

    #[error("DataFrame {0} has no save path configured")]
    NoSavePath(i64),

    /// Feature tables built from parameters and characteristics have
    /// diverging product indexes and cannot be joined.
    #[error("Cannot join feature tables: {0}")]
    IndexMismatch(String),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during pipeline order validation and workflow
/// template generation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more violations found while validating `pipeline_order`.
    /// All violations are accumulated before the error is reported.
    #[error("Invalid pipeline order: {}", .0.join("; "))]
    InvalidOrder(Vec<String>),

    #[error("Pipeline block {0} not found")]
    BlockNotFound(i64),

    #[error("Pipeline block {block_id} has no block specification")]
    MissingBlockSpecification { block_id: i64 },

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while talking to the external workflow orchestrator.
///
/// Non-2xx responses are not errors at this level: the client hands the
/// last failing response back to the caller, which decides how to react.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request never produced a response (connection refused, DNS, TLS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response arrived but its body could not be interpreted.
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

/// Errors that can occur during run lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A precondition for the operation was not met (400-equivalent).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The operation is not valid in the run's current state (409-equivalent).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The orchestrator rejected a request; status and reason are relayed
    /// verbatim.
    #[error("Orchestrator rejected request ({status}): {reason}")]
    Upstream { status: u16, reason: String },

    #[error("Run {0} not found")]
    RunNotFound(i64),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while ingesting raw sensor readings.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A record failed validation; aborts the enclosing batch job.
    #[error("Invalid reading at record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
