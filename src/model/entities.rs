//! Basic entities of the shop-floor hierarchy.
//!
//! Only the fields the dataset and lifecycle subsystems read are carried
//! here; presentation concerns live outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::RunStatus;

/// Reference definition of one product variant.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductSpecification {
    pub id: i64,
    pub name: Option<String>,
}

/// One physical unit, linked to the specification it was built against.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: Option<String>,
    pub product_specification_id: Option<i64>,
}

/// Template for one manufacturing stage: expected parameters and quality
/// limits. Stages form a DAG through previous/next adjacency (not modelled
/// here; the dataset core only needs membership).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessStepSpecification {
    pub id: i64,
    pub name: Option<String>,
    pub optional: Option<bool>,
    pub product_specification_id: Option<i64>,
    /// Set on specifications derived by deploying a run; undeploy removes
    /// exactly those.
    pub ml_run_id: Option<i64>,
}

/// One executed manufacturing stage of one product.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessStep {
    pub id: i64,
    pub name: Option<String>,
    pub product_id: Option<i64>,
    pub process_step_specification_id: Option<i64>,
    pub status: String,
}

impl ProcessStep {
    pub fn status(&self) -> RunStatus {
        RunStatus::from_str_lossy(&self.status)
    }
}

/// A named input/setting measured during a process step.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessParameter {
    pub id: i64,
    pub name: String,
    pub process_step_specification_id: Option<i64>,
}

/// A named outcome/quality measure of a process step.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QualityCharacteristic {
    pub id: i64,
    pub name: String,
    pub process_step_specification_id: Option<i64>,
}

/// A physical or virtual measurement source. Virtual sensors represent
/// model-predicted value streams and are tagged with the run that created
/// them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Sensor {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub virtual_sensor: bool,
    pub quality_characteristic_id: Option<i64>,
    pub ml_run_id: Option<i64>,
}

/// One recorded sensor value at a point in time. Immutable once written
/// apart from administrative date correction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    pub value: Option<f64>,
    pub date: Option<DateTime<Utc>>,
    pub sensor_id: Option<i64>,
    pub process_step_id: Option<i64>,
    pub process_parameter_id: Option<i64>,
    pub quality_characteristic_id: Option<i64>,
}
