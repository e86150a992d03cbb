//! Machine-learning layer entities: DataFrame specifications, pipeline
//! blocks and runs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::RunStatus;

/// Persisted configuration for one feature/target dataset build.
///
/// The selected step specifications, parameters, characteristics and
/// targets are many-to-many relations loaded alongside the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFrameSpec {
    pub id: i64,
    pub name: Option<String>,
    pub status: RunStatus,
    /// Directory the feature and target artifacts are written to.
    pub save_path: Option<String>,
    /// Row cap: maximum number of products in the output.
    pub product_amount: i64,
    /// Random sampling (true) vs. deterministic ascending-id prefix (false)
    /// when the candidate set exceeds the row cap.
    pub random_records: bool,
    pub product_specification_id: Option<i64>,
    /// Selected ProcessStepSpecifications; candidate products must have at
    /// least one step in this set.
    pub step_specification_ids: Vec<i64>,
    /// Selected ProcessParameters (feature columns).
    pub parameter_ids: Vec<i64>,
    /// Selected QualityCharacteristics used as features (reduced columns).
    pub characteristic_ids: Vec<i64>,
    /// Selected QualityCharacteristics used as targets (raw single values,
    /// never reduced).
    pub target_ids: Vec<i64>,
}

/// Reusable task template synced from the orchestrator's catalog: a
/// workflow template plus one of its entrypoints and its parameter schema.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PipelineBlockSpecification {
    pub id: i64,
    /// `<workflow_template>/<entrypoint>`, unique per catalog entry.
    pub name: String,
    /// Parameter names the entrypoint accepts, as stored JSON.
    pub parameter: serde_json::Value,
    pub workflow_template: Option<String>,
    pub template_entrypoint: Option<String>,
}

/// A parameterized instantiation of a block specification: concrete values
/// for its parameters, shared between run specifications.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PipelineBlock {
    pub id: i64,
    pub name: Option<String>,
    /// `[{"name": ..., "value": ...}, ...]` as stored JSON.
    pub parameter: serde_json::Value,
    pub pipeline_block_specification_id: Option<i64>,
}

/// An ordered graph of pipeline blocks over one DataFrame, ready to be
/// turned into a workflow template.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MlRunSpecification {
    pub id: i64,
    pub name: Option<String>,
    /// Stage-id -> `{id, dependencies}` mapping, validated before template
    /// generation.
    pub pipeline_order: Option<serde_json::Value>,
    /// Cached name of the generated workflow template.
    pub workflow_template: Option<String>,
    /// Where terminal pipeline stages write their output.
    pub save_path: Option<String>,
    /// Force template regeneration on the next start.
    pub create_new_template: bool,
    pub dataframe_id: Option<i64>,
}

/// One execution of a run specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlRun {
    pub id: i64,
    pub name: Option<String>,
    pub status: RunStatus,
    pub save_path: Option<String>,
    /// Per-task parameter snapshot captured at submission time.
    pub parameter: Option<serde_json::Value>,
    /// Job id issued by the orchestrator.
    pub external_job_id: Option<String>,
    pub deployed: bool,
    pub ml_run_specification_id: Option<i64>,
}
