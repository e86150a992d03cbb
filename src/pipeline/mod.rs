//! Pipeline-block graphs and workflow template generation.
//!
//! [`order`] validates the user-defined stage graph, [`template`] models
//! the orchestrator's workflow-template JSON, and [`generator`] turns a
//! validated graph into a submittable template.

pub mod generator;
pub mod order;
pub mod template;

pub use generator::{derive_stage_paths, generate_template, GeneratorInputs, StagePaths};
pub use order::{OrderEntry, PipelineOrder};
pub use template::{
    parameter_snapshot, DagTask, Parameter, TemplateInner, TemplateRef, WorkflowTemplate,
};
