//! Catalog import: turns the orchestrator's labelled workflow templates
//! into pipeline block specifications on every tenant.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::orchestrator::OrchestratorClient;
use crate::store::TenantRegistry;

/// Outcome of one catalog sweep across all tenants.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogReport {
    /// Block specifications created.
    pub created: usize,
    /// Block specifications refreshed.
    pub updated: usize,
    /// Upserts that failed; the sweep continues past them.
    pub errors: usize,
}

/// One importable entrypoint discovered in the orchestrator's templates.
#[derive(Debug, Clone, PartialEq)]
struct CatalogEntry {
    /// `<workflow_template>/<entrypoint>`.
    name: String,
    workflow_template: String,
    entrypoint: String,
    /// Parameter names the entrypoint accepts.
    parameters: Value,
}

/// Imports the orchestrator's template catalog into every tenant.
///
/// Only templates labelled `creator=<catalog_label>` participate. Each
/// named entrypoint of a qualifying template becomes one block
/// specification, keyed `<template>/<entrypoint>`; existing entries are
/// refreshed in place.
pub async fn sync_catalog(
    registry: &TenantRegistry,
    client: &OrchestratorClient,
) -> Result<CatalogReport, LifecycleError> {
    let response = client.list_templates().await?;
    if !response.is_success() {
        return Err(LifecycleError::Upstream {
            status: response.status,
            reason: response.reason,
        });
    }
    let body = response.json().map_err(LifecycleError::Orchestrator)?;
    let entries = collect_entries(&body, client.catalog_label());
    info!(entries = entries.len(), "Catalog templates discovered");

    let report = apply_entries(registry, &entries).await;
    info!(
        created = report.created,
        updated = report.updated,
        errors = report.errors,
        "Catalog sweep finished"
    );
    Ok(report)
}

/// Upserts the discovered entries into every tenant. A failure on one
/// upsert or one tenant is logged and counted; the sweep continues with
/// the remaining tenants.
async fn apply_entries(registry: &TenantRegistry, entries: &[CatalogEntry]) -> CatalogReport {
    let mut report = CatalogReport::default();
    for tenant in registry.tenant_names() {
        let store = match registry.store(&tenant) {
            Ok(store) => store,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Tenant unavailable for catalog sweep");
                report.errors += 1;
                continue;
            }
        };
        for entry in entries {
            match store
                .upsert_block_specification(
                    &entry.name,
                    &entry.parameters,
                    &entry.workflow_template,
                    &entry.entrypoint,
                )
                .await
            {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    warn!(
                        tenant = %tenant,
                        entry = %entry.name, error = %e, "Catalog upsert failed"
                    );
                    report.errors += 1;
                }
            }
        }
    }
    report
}

/// Extracts importable entrypoints from a template-list response body.
fn collect_entries(body: &Value, catalog_label: &str) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        return entries;
    };
    for item in items {
        let labelled = item
            .pointer("/metadata/labels/creator")
            .and_then(Value::as_str)
            == Some(catalog_label);
        if !labelled {
            continue;
        }
        let Some(template_name) = item.pointer("/metadata/name").and_then(Value::as_str) else {
            continue;
        };
        let Some(templates) = item.pointer("/spec/templates").and_then(Value::as_array) else {
            continue;
        };
        for template in templates {
            let Some(entrypoint) = template.get("name").and_then(Value::as_str) else {
                continue;
            };
            let parameters: Vec<Value> = template
                .pointer("/inputs/parameters")
                .and_then(Value::as_array)
                .map(|params| {
                    params
                        .iter()
                        .filter_map(|p| p.get("name").cloned())
                        .collect()
                })
                .unwrap_or_default();
            entries.push(CatalogEntry {
                name: format!("{}/{}", template_name, entrypoint),
                workflow_template: template_name.to_string(),
                entrypoint: entrypoint.to_string(),
                parameters: Value::Array(parameters),
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template_list() -> Value {
        json!({
            "items": [
                {
                    "metadata": {
                        "name": "trainer",
                        "labels": {"creator": "prodsight"}
                    },
                    "spec": {
                        "templates": [
                            {
                                "name": "fit",
                                "inputs": {"parameters": [
                                    {"name": "input_path"},
                                    {"name": "output_path"},
                                    {"name": "epochs"}
                                ]}
                            },
                            {"name": "evaluate"}
                        ]
                    }
                },
                {
                    "metadata": {
                        "name": "foreign",
                        "labels": {"creator": "someone-else"}
                    },
                    "spec": {"templates": [{"name": "task"}]}
                },
                {
                    "metadata": {"name": "unlabelled"},
                    "spec": {"templates": [{"name": "task"}]}
                }
            ]
        })
    }

    #[test]
    fn test_collect_entries_filters_by_label() {
        let entries = collect_entries(&template_list(), "prodsight");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "trainer/fit");
        assert_eq!(entries[1].name, "trainer/evaluate");
    }

    #[test]
    fn test_collect_entries_parameter_names() {
        let entries = collect_entries(&template_list(), "prodsight");
        assert_eq!(
            entries[0].parameters,
            json!(["input_path", "output_path", "epochs"])
        );
        assert_eq!(entries[1].parameters, json!([]));
    }

    #[test]
    fn test_collect_entries_empty_body() {
        assert!(collect_entries(&json!({}), "prodsight").is_empty());
        assert!(collect_entries(&json!({"items": null}), "prodsight").is_empty());
    }

    #[tokio::test]
    async fn test_apply_entries_survives_unreachable_tenant() {
        use sqlx::postgres::PgPoolOptions;
        use std::collections::HashMap;

        // Port 9 is discard; the lazy pools only fail once a query runs.
        let mut pools = HashMap::new();
        for tenant in ["plant_a", "plant_b"] {
            let pool = PgPoolOptions::new()
                .acquire_timeout(std::time::Duration::from_secs(2))
                .connect_lazy("postgres://prodsight@127.0.0.1:9/tenant")
                .unwrap();
            pools.insert(tenant.to_string(), pool);
        }
        let registry = TenantRegistry::from_pools(pools);
        let entries = collect_entries(&template_list(), "prodsight");
        assert_eq!(entries.len(), 2);

        // Every upsert fails, but the sweep finishes with a full report.
        let report = apply_entries(&registry, &entries).await;
        assert_eq!(report.errors, 4);
        assert_eq!(report.created + report.updated, 0);
    }
}
