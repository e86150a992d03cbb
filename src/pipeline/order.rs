//! Validation of the user-defined pipeline stage graph.
//!
//! `pipeline_order` is stored as JSON: a mapping from stage id to
//! `{"id": <block id>, "dependencies": [<stage id>, ...]}`. Validation
//! accumulates every violation and reports them as one error instead of
//! stopping at the first, so a user can fix the whole graph in one round.

use std::collections::{BTreeMap, HashSet};

use crate::error::PipelineError;

/// One validated stage: the pipeline block it runs and the stages it
/// depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEntry {
    pub block_id: i64,
    pub dependencies: Vec<String>,
}

/// A validated pipeline stage graph. Iteration order is the stage id's
/// lexicographic order, which keeps generated templates stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOrder {
    stages: BTreeMap<String, OrderEntry>,
}

impl PipelineOrder {
    /// Parses and validates the stored JSON against the block set linked
    /// to the owning run specification.
    ///
    /// Checks, all accumulated:
    /// - the value is a JSON object;
    /// - every entry carries a block id that belongs to `known_blocks`;
    /// - `dependencies`, when present, is a list of stage ids that exist
    ///   as keys of the mapping;
    /// - no entry lists itself as a dependency.
    pub fn validate(
        raw: &serde_json::Value,
        known_blocks: &HashSet<i64>,
    ) -> Result<Self, PipelineError> {
        let Some(map) = raw.as_object() else {
            return Err(PipelineError::InvalidOrder(vec![format!(
                "pipeline_order must be an object, not {}",
                json_type_name(raw)
            )]));
        };

        let keys: HashSet<&str> = map.keys().map(|k| k.as_str()).collect();
        let mut violations = Vec::new();
        let mut stages = BTreeMap::new();

        for (key, value) in map {
            let block_id = match value.get("id").and_then(|v| v.as_i64()) {
                Some(id) => id,
                None => {
                    violations.push(format!(
                        "order entry '{}' has no pipeline block id",
                        key
                    ));
                    continue;
                }
            };
            if !known_blocks.contains(&block_id) {
                violations.push(format!(
                    "pipeline block {} of entry '{}' is not linked to the run specification",
                    block_id, key
                ));
            }

            let mut dependencies = Vec::new();
            match value.get("dependencies") {
                None | Some(serde_json::Value::Null) => {}
                Some(serde_json::Value::Array(deps)) => {
                    for dep in deps {
                        // Non-string stage ids are coerced to their JSON
                        // text, so a dependency 3 matches the key "3".
                        let dep = match dep {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        if dep == *key {
                            violations.push(format!(
                                "order entry '{}' cannot depend on itself",
                                key
                            ));
                        } else if !keys.contains(dep.as_str()) {
                            violations.push(format!(
                                "dependency '{}' of entry '{}' is not an order entry",
                                dep, key
                            ));
                        }
                        dependencies.push(dep);
                    }
                }
                Some(other) => {
                    violations.push(format!(
                        "dependencies of entry '{}' must be a list, not {}",
                        key,
                        json_type_name(other)
                    ));
                }
            }

            stages.insert(
                key.clone(),
                OrderEntry {
                    block_id,
                    dependencies,
                },
            );
        }

        if !violations.is_empty() {
            return Err(PipelineError::InvalidOrder(violations));
        }
        Ok(Self { stages })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OrderEntry)> {
        self.stages.iter()
    }

    pub fn get(&self, stage: &str) -> Option<&OrderEntry> {
        self.stages.get(stage)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages with no dependencies: they consume the DataFrame artifact.
    pub fn roots(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|(_, e)| e.dependencies.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Stages nobody depends on: they write to the run's save path.
    pub fn edges(&self) -> Vec<&str> {
        let depended_on: HashSet<&str> = self
            .stages
            .values()
            .flat_map(|e| e.dependencies.iter().map(|d| d.as_str()))
            .collect();
        self.stages
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !depended_on.contains(k))
            .collect()
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
