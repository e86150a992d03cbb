//! Serde model of the orchestrator's workflow-template schema.
//!
//! Only the slice of the schema this system reads and writes is typed;
//! foreign metadata fields (resource versions and the like) are carried
//! through untouched so template updates round-trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Entrypoint name of the generated DAG template.
pub const DAG_ENTRYPOINT: &str = "main";

/// A workflow template as submitted to and returned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTemplate {
    pub template: TemplateInner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateInner {
    pub metadata: TemplateMetadata,
    pub spec: TemplateSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TemplateMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Fields managed by the orchestrator (resourceVersion, uid, ...);
    /// preserved verbatim when updating an existing template.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSpec {
    pub entrypoint: String,
    pub templates: Vec<DagTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DagTemplate {
    pub name: String,
    pub dag: Dag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dag {
    pub tasks: Vec<DagTask>,
}

/// One task of the DAG: a reference to a block specification's template
/// plus the concrete parameters and artifact wiring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DagTask {
    pub name: String,
    #[serde(rename = "templateRef")]
    pub template_ref: TemplateRef,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub arguments: Arguments,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateRef {
    /// Workflow template holding the task's implementation.
    pub name: String,
    /// Entrypoint within that template.
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Arguments {
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

/// A concrete parameter value. The schema has no native null or list
/// type: nulls are serialized as empty strings, lists as comma-joined
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// A synthetic artifact reference wiring a task to one dependency's
/// declared output artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRef {
    pub name: String,
    pub from: String,
}

impl WorkflowTemplate {
    /// The base DAG skeleton: one `main` template with an empty task
    /// list, labelled so the catalog sync recognizes it.
    pub fn base_dag(name: &str, label: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("creator".to_string(), label.to_string());
        Self {
            template: TemplateInner {
                metadata: TemplateMetadata {
                    name: name.to_string(),
                    labels,
                    extra: serde_json::Map::new(),
                },
                spec: TemplateSpec {
                    entrypoint: DAG_ENTRYPOINT.to_string(),
                    templates: vec![DagTemplate {
                        name: DAG_ENTRYPOINT.to_string(),
                        dag: Dag::default(),
                    }],
                },
            },
        }
    }

    /// Tasks of the main DAG.
    pub fn dag_tasks(&self) -> &[DagTask] {
        self.template
            .spec
            .templates
            .first()
            .map(|t| t.dag.tasks.as_slice())
            .unwrap_or(&[])
    }

    /// Replaces the main DAG's tasks.
    pub fn set_dag_tasks(&mut self, tasks: Vec<DagTask>) {
        if let Some(t) = self.template.spec.templates.first_mut() {
            t.dag.tasks = tasks;
        }
    }
}

/// Per-task parameter snapshot: stage id -> {parameter name -> value},
/// captured on the run record at submission time.
pub fn parameter_snapshot(tasks: &[DagTask]) -> serde_json::Value {
    let mut snapshot = serde_json::Map::new();
    for task in tasks {
        let mut params = serde_json::Map::new();
        for p in &task.arguments.parameters {
            params.insert(p.name.clone(), serde_json::Value::String(p.value.clone()));
        }
        snapshot.insert(task.name.clone(), serde_json::Value::Object(params));
    }
    serde_json::Value::Object(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dag_shape() {
        let tpl = WorkflowTemplate::base_dag("dag-mill-run", "prodsight");
        assert_eq!(tpl.template.metadata.name, "dag-mill-run");
        assert_eq!(tpl.template.spec.entrypoint, "main");
        assert_eq!(tpl.template.spec.templates.len(), 1);
        assert!(tpl.dag_tasks().is_empty());
        assert_eq!(
            tpl.template.metadata.labels.get("creator"),
            Some(&"prodsight".to_string())
        );
    }

    #[test]
    fn test_metadata_preserves_foreign_fields() {
        let json = serde_json::json!({
            "name": "dag-x",
            "resourceVersion": "12345",
            "uid": "abc-def"
        });
        let meta: TemplateMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.name, "dag-x");
        assert_eq!(meta.extra.get("resourceVersion").unwrap(), "12345");

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back.get("uid").unwrap(), "abc-def");
    }

    #[test]
    fn test_task_serializes_camel_case_template_ref() {
        let task = DagTask {
            name: "a".to_string(),
            template_ref: TemplateRef {
                name: "trainer".to_string(),
                template: "fit".to_string(),
            },
            dependencies: vec![],
            arguments: Arguments::default(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("templateRef").is_some());
        // empty artifacts are omitted entirely
        assert!(json["arguments"].get("artifacts").is_none());
    }

    #[test]
    fn test_parameter_snapshot() {
        let tasks = vec![DagTask {
            name: "a".to_string(),
            template_ref: TemplateRef {
                name: "t".to_string(),
                template: "e".to_string(),
            },
            dependencies: vec![],
            arguments: Arguments {
                parameters: vec![Parameter {
                    name: "input_path".to_string(),
                    value: "/data/df".to_string(),
                }],
                artifacts: vec![],
            },
        }];
        let snap = parameter_snapshot(&tasks);
        assert_eq!(snap["a"]["input_path"], "/data/df");
    }
}
