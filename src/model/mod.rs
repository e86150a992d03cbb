//! Domain model for the manufacturing-process-quality hierarchy.
//!
//! The hierarchy runs ProductSpecification -> ProcessStepSpecification ->
//! ProcessParameter / QualityCharacteristic on the specification side, and
//! Product -> ProcessStep -> SensorReading on the instance side. The
//! machine-learning layer adds DataFrame specifications, pipeline blocks
//! and runs on top.

mod entities;
mod ml;
mod status;

pub use entities::{
    ProcessParameter, ProcessStep, ProcessStepSpecification, Product, ProductSpecification,
    QualityCharacteristic, Sensor, SensorReading,
};
pub use ml::{
    DataFrameSpec, MlRun, MlRunSpecification, PipelineBlock, PipelineBlockSpecification,
};
pub use status::{ReductionMethod, ReductionSet, RunStatus};
