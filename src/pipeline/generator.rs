//! Workflow template generation from a validated pipeline order.
//!
//! Stage classification drives the artifact wiring: roots read the
//! DataFrame artifact, edges write to the run specification's save path,
//! interior stages exchange intermediates at the fixed artifact-exchange
//! location.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use super::order::PipelineOrder;
use super::template::{
    ArtifactRef, Arguments, DagTask, Parameter, TemplateRef, WorkflowTemplate,
};
use crate::config::{ARTIFACT_INPUT_PATH, ARTIFACT_OUTPUT_PATH};
use crate::error::PipelineError;
use crate::model::{PipelineBlock, PipelineBlockSpecification};

/// Derived input/output location for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub input: String,
    pub output: String,
}

/// Everything template generation needs, resolved by the caller.
pub struct GeneratorInputs<'a> {
    pub order: &'a PipelineOrder,
    /// Pipeline blocks keyed by block id.
    pub blocks: &'a HashMap<i64, PipelineBlock>,
    /// Block specifications keyed by the block id they instantiate.
    pub specifications: &'a HashMap<i64, PipelineBlockSpecification>,
    /// Where the DataFrame artifacts live; consumed by root stages.
    pub dataframe_path: &'a str,
    /// Where edge stages write their output.
    pub save_path: &'a str,
}

/// Derives input/output paths per stage. Both default to the fixed
/// artifact-exchange location; roots get the DataFrame path as input,
/// edges get the save path as output.
pub fn derive_stage_paths(
    order: &PipelineOrder,
    dataframe_path: &str,
    save_path: &str,
) -> BTreeMap<String, StagePaths> {
    let mut paths: BTreeMap<String, StagePaths> = order
        .iter()
        .map(|(stage, _)| {
            (
                stage.clone(),
                StagePaths {
                    input: ARTIFACT_INPUT_PATH.to_string(),
                    output: ARTIFACT_OUTPUT_PATH.to_string(),
                },
            )
        })
        .collect();

    for root in order.roots() {
        if let Some(p) = paths.get_mut(root) {
            p.input = dataframe_path.to_string();
        }
    }
    for edge in order.edges() {
        if let Some(p) = paths.get_mut(edge) {
            p.output = save_path.to_string();
        }
    }
    paths
}

/// Stored block parameter shape: `[{"name": ..., "value": ...}, ...]`.
#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Serializes a stored parameter value into the schema's string-only
/// representation: null becomes the empty string, lists become a
/// comma-joined string.
fn parameter_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Builds the workflow template for a validated pipeline order.
pub fn generate_template(
    inputs: &GeneratorInputs<'_>,
    template_name: &str,
    label: &str,
) -> Result<WorkflowTemplate, PipelineError> {
    let stage_paths = derive_stage_paths(inputs.order, inputs.dataframe_path, inputs.save_path);

    let mut tasks = Vec::with_capacity(inputs.order.len());
    for (stage, entry) in inputs.order.iter() {
        let block = inputs
            .blocks
            .get(&entry.block_id)
            .ok_or(PipelineError::BlockNotFound(entry.block_id))?;
        let spec = inputs
            .specifications
            .get(&entry.block_id)
            .ok_or(PipelineError::MissingBlockSpecification {
                block_id: entry.block_id,
            })?;

        let raw_parameters: Vec<RawParameter> =
            serde_json::from_value(block.parameter.clone())?;
        let paths = &stage_paths[stage];

        let parameters = raw_parameters
            .into_iter()
            .map(|p| {
                let value = match p.name.as_str() {
                    "input_path" => paths.input.clone(),
                    "output_path" => paths.output.clone(),
                    _ => parameter_value_to_string(&p.value),
                };
                Parameter {
                    name: p.name,
                    value,
                }
            })
            .collect();

        let artifacts = entry
            .dependencies
            .iter()
            .enumerate()
            .map(|(i, dep)| ArtifactRef {
                name: format!("artifacts-{}", i),
                from: format!("{{{{tasks.{}.outputs.artifacts.artifacts}}}}", dep),
            })
            .collect();

        tasks.push(DagTask {
            name: stage.clone(),
            template_ref: TemplateRef {
                name: spec.workflow_template.clone().ok_or(
                    PipelineError::MissingBlockSpecification {
                        block_id: entry.block_id,
                    },
                )?,
                template: spec.template_entrypoint.clone().ok_or(
                    PipelineError::MissingBlockSpecification {
                        block_id: entry.block_id,
                    },
                )?,
            },
            dependencies: entry.dependencies.clone(),
            arguments: Arguments {
                parameters,
                artifacts,
            },
        });
    }

    let mut template = WorkflowTemplate::base_dag(template_name, label);
    template.set_dag_tasks(tasks);
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn order(raw: serde_json::Value, known: &[i64]) -> PipelineOrder {
        let known: HashSet<i64> = known.iter().copied().collect();
        PipelineOrder::validate(&raw, &known).unwrap()
    }

    fn block(id: i64, parameter: serde_json::Value) -> PipelineBlock {
        PipelineBlock {
            id,
            name: Some(format!("block-{}", id)),
            parameter,
            pipeline_block_specification_id: Some(id * 10),
        }
    }

    fn spec(id: i64, template: &str, entrypoint: &str) -> PipelineBlockSpecification {
        PipelineBlockSpecification {
            id: id * 10,
            name: format!("{}/{}", template, entrypoint),
            parameter: json!([]),
            workflow_template: Some(template.to_string()),
            template_entrypoint: Some(entrypoint.to_string()),
        }
    }

    fn linear_inputs() -> (
        PipelineOrder,
        HashMap<i64, PipelineBlock>,
        HashMap<i64, PipelineBlockSpecification>,
    ) {
        let order = order(
            json!({
                "a": {"id": 1, "dependencies": []},
                "b": {"id": 2, "dependencies": ["a"]},
            }),
            &[1, 2],
        );
        let blocks: HashMap<i64, PipelineBlock> = [
            (
                1,
                block(
                    1,
                    json!([
                        {"name": "input_path", "value": "placeholder"},
                        {"name": "output_path", "value": "placeholder"},
                        {"name": "epochs", "value": 20},
                    ]),
                ),
            ),
            (
                2,
                block(
                    2,
                    json!([
                        {"name": "input_path", "value": null},
                        {"name": "output_path", "value": null},
                        {"name": "columns", "value": ["temp", "feed"]},
                        {"name": "comment", "value": null},
                    ]),
                ),
            ),
        ]
        .into_iter()
        .collect();
        let specs: HashMap<i64, PipelineBlockSpecification> = [
            (1, spec(1, "preprocess", "clean")),
            (2, spec(2, "trainer", "fit")),
        ]
        .into_iter()
        .collect();
        (order, blocks, specs)
    }

    #[test]
    fn test_derive_stage_paths_root_and_edge() {
        let (order, _, _) = linear_inputs();
        let paths = derive_stage_paths(&order, "/data/df", "/data/out");
        assert_eq!(paths["a"].input, "/data/df");
        assert_eq!(paths["a"].output, ARTIFACT_OUTPUT_PATH);
        assert_eq!(paths["b"].input, ARTIFACT_INPUT_PATH);
        assert_eq!(paths["b"].output, "/data/out");
    }

    #[test]
    fn test_derive_stage_paths_interior_stage() {
        let order = order(
            json!({
                "a": {"id": 1, "dependencies": []},
                "b": {"id": 1, "dependencies": ["a"]},
                "c": {"id": 1, "dependencies": ["b"]},
            }),
            &[1],
        );
        let paths = derive_stage_paths(&order, "/df", "/out");
        assert_eq!(paths["b"].input, ARTIFACT_INPUT_PATH);
        assert_eq!(paths["b"].output, ARTIFACT_OUTPUT_PATH);
    }

    #[test]
    fn test_generate_template_paths_and_parameters() {
        let (order, blocks, specs) = linear_inputs();
        let inputs = GeneratorInputs {
            order: &order,
            blocks: &blocks,
            specifications: &specs,
            dataframe_path: "/data/df",
            save_path: "/data/out",
        };
        let template = generate_template(&inputs, "dag-mill-run", "prodsight").unwrap();
        assert_eq!(template.template.metadata.name, "dag-mill-run");

        let tasks = template.dag_tasks();
        assert_eq!(tasks.len(), 2);

        let a = &tasks[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.template_ref.name, "preprocess");
        assert_eq!(a.template_ref.template, "clean");
        assert!(a.dependencies.is_empty());
        assert!(a.arguments.artifacts.is_empty());
        let a_params: HashMap<&str, &str> = a
            .arguments
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(a_params["input_path"], "/data/df");
        assert_eq!(a_params["output_path"], ARTIFACT_OUTPUT_PATH);
        assert_eq!(a_params["epochs"], "20");

        let b = &tasks[1];
        assert_eq!(b.dependencies, vec!["a"]);
        let b_params: HashMap<&str, &str> = b
            .arguments
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(b_params["input_path"], ARTIFACT_INPUT_PATH);
        assert_eq!(b_params["output_path"], "/data/out");
        assert_eq!(b_params["columns"], "temp,feed");
        assert_eq!(b_params["comment"], "");
    }

    #[test]
    fn test_generate_template_artifact_wiring() {
        let order = order(
            json!({
                "a": {"id": 1, "dependencies": []},
                "b": {"id": 1, "dependencies": []},
                "c": {"id": 1, "dependencies": ["a", "b"]},
            }),
            &[1],
        );
        let blocks: HashMap<i64, PipelineBlock> =
            [(1, block(1, json!([])))].into_iter().collect();
        let specs: HashMap<i64, PipelineBlockSpecification> =
            [(1, spec(1, "trainer", "fit"))].into_iter().collect();
        let inputs = GeneratorInputs {
            order: &order,
            blocks: &blocks,
            specifications: &specs,
            dataframe_path: "/df",
            save_path: "/out",
        };
        let template = generate_template(&inputs, "dag-x", "prodsight").unwrap();
        let c = &template.dag_tasks()[2];
        assert_eq!(c.arguments.artifacts.len(), 2);
        assert_eq!(c.arguments.artifacts[0].name, "artifacts-0");
        assert_eq!(
            c.arguments.artifacts[0].from,
            "{{tasks.a.outputs.artifacts.artifacts}}"
        );
        assert_eq!(
            c.arguments.artifacts[1].from,
            "{{tasks.b.outputs.artifacts.artifacts}}"
        );
    }

    #[test]
    fn test_generate_template_missing_block_specification() {
        let (order, blocks, _) = linear_inputs();
        let empty: HashMap<i64, PipelineBlockSpecification> = HashMap::new();
        let inputs = GeneratorInputs {
            order: &order,
            blocks: &blocks,
            specifications: &empty,
            dataframe_path: "/df",
            save_path: "/out",
        };
        assert!(matches!(
            generate_template(&inputs, "dag-x", "prodsight"),
            Err(PipelineError::MissingBlockSpecification { block_id: 1 })
        ));
    }
}
