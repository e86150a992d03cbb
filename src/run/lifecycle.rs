//! Run lifecycle operations: start, terminate, deploy, undeploy, delete.
//!
//! Every operation takes an explicit [`Store`] handle; which tenant it acts
//! on is always visible at the call site.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::error::{LifecycleError, PipelineError};
use crate::model::{MlRun, MlRunSpecification, PipelineBlockSpecification, RunStatus};
use crate::orchestrator::{OrchestratorClient, OrchestratorResponse};
use crate::pipeline::{
    generate_template, parameter_snapshot, DagTask, GeneratorInputs, PipelineOrder, TemplateInner,
};
use crate::store::{Store, StoreError};

/// Drives the lifecycle of ML runs for one tenant.
pub struct RunLifecycle<'a> {
    store: &'a Store,
    client: &'a OrchestratorClient,
}

impl<'a> RunLifecycle<'a> {
    pub fn new(store: &'a Store, client: &'a OrchestratorClient) -> Self {
        Self { store, client }
    }

    /// Starts a run from a run specification.
    ///
    /// Validates the preconditions, ensures the workflow template exists at
    /// the orchestrator (regenerating it when requested or missing), submits
    /// a workflow and records the run with status Scheduled. No run record
    /// is created when any step fails.
    pub async fn start(&self, run_specification_id: i64) -> Result<i64, LifecycleError> {
        let spec = self.store.load_run_specification(run_specification_id).await?;

        if spec.save_path.as_deref().unwrap_or("").is_empty() {
            return Err(LifecycleError::Precondition(format!(
                "run specification {} has no save path",
                spec.id
            )));
        }
        let dataframe_id = spec.dataframe_id.ok_or_else(|| {
            LifecycleError::Precondition(format!(
                "run specification {} has no DataFrame",
                spec.id
            ))
        })?;
        let dataframe = self.store.load_dataframe(dataframe_id).await?;
        if dataframe.status != RunStatus::Succeeded {
            return Err(LifecycleError::Precondition(format!(
                "DataFrame {} is not built yet (status {})",
                dataframe_id, dataframe.status
            )));
        }
        let dataframe_path = dataframe.save_path.ok_or_else(|| {
            LifecycleError::Precondition(format!("DataFrame {} has no save path", dataframe_id))
        })?;
        let raw_order = spec.pipeline_order.as_ref().ok_or_else(|| {
            LifecycleError::Precondition(format!(
                "run specification {} has no pipeline order",
                spec.id
            ))
        })?;

        let blocks = self.store.blocks_for_run_specification(spec.id).await?;
        let known: HashSet<i64> = blocks.iter().map(|b| b.id).collect();
        let order = PipelineOrder::validate(raw_order, &known)?;

        let mut specifications: HashMap<i64, PipelineBlockSpecification> = HashMap::new();
        for block in &blocks {
            let spec_id = block.pipeline_block_specification_id.ok_or(
                PipelineError::MissingBlockSpecification { block_id: block.id },
            )?;
            let block_spec = self.store.block_specification(spec_id).await?;
            specifications.insert(block.id, block_spec);
        }
        let blocks: HashMap<i64, _> = blocks.into_iter().map(|b| (b.id, b)).collect();

        let template_name = spec
            .workflow_template
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| template_slug(&spec));

        let existing = self.fetch_template(&template_name).await?;
        let save_path = spec.save_path.clone().unwrap_or_default();

        let tasks: Vec<DagTask> = match (&existing, spec.create_new_template) {
            (Some(existing), false) => {
                // Template already registered and up to date; reuse it.
                existing_dag_tasks(existing)
            }
            _ => {
                let inputs = GeneratorInputs {
                    order: &order,
                    blocks: &blocks,
                    specifications: &specifications,
                    dataframe_path: &dataframe_path,
                    save_path: &save_path,
                };
                let mut template =
                    generate_template(&inputs, &template_name, self.client.catalog_label())?;

                let response = if let Some(existing) = existing {
                    // Orchestrator-managed metadata must round-trip on update.
                    template.template.metadata.extra = existing.metadata.extra.clone();
                    self.client.update_template(&template).await?
                } else {
                    self.client.create_template(&template).await?
                };
                if !response.is_success() {
                    return Err(upstream(&response));
                }
                template.template.spec.templates[0].dag.tasks.clone()
            }
        };

        self.store
            .set_run_specification_template(spec.id, &template_name)
            .await?;

        let response = self.client.submit(&template_name).await?;
        if !response.is_success() {
            return Err(upstream(&response));
        }
        let job_id = response
            .json()?
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                LifecycleError::Upstream {
                    status: response.status,
                    reason: "submit response carries no workflow name".to_string(),
                }
            })?;

        let snapshot = parameter_snapshot(&tasks);
        let run_name = spec.name.clone().unwrap_or_else(|| template_name.clone());
        let run_id = self
            .store
            .create_run(
                &run_name,
                &job_id,
                &snapshot,
                spec.save_path.as_deref(),
                spec.id,
            )
            .await?;
        info!(
            tenant = %self.store.tenant(),
            run_id, job_id = %job_id, template = %template_name, "Run started"
        );
        Ok(run_id)
    }

    /// Terminates a run that is still in flight.
    ///
    /// Only the orchestrator is told; the run keeps its current status and
    /// stays in the sweep's working set until the orchestrator reports the
    /// terminal phase.
    pub async fn terminate(&self, run_id: i64) -> Result<(), LifecycleError> {
        let run = self.load_run(run_id).await?;
        if !run.status.is_active() {
            return Err(LifecycleError::Conflict(format!(
                "run {} is not active (status {})",
                run_id, run.status
            )));
        }
        let job_id = run.external_job_id.ok_or_else(|| {
            LifecycleError::Precondition(format!("run {} has no external job id", run_id))
        })?;

        let response = self.client.terminate(&job_id).await?;
        if !response.is_success() {
            return Err(upstream(&response));
        }
        info!(tenant = %self.store.tenant(), run_id, "Run termination requested");
        Ok(())
    }

    /// Deploys a succeeded run: creates a derived process step specification
    /// and one virtual sensor per target characteristic, so predictions can
    /// be recorded as readings.
    ///
    /// On a partial failure every resource created so far is removed again
    /// before the error is returned; a failed deploy leaves no trace.
    pub async fn deploy(&self, run_id: i64) -> Result<(), LifecycleError> {
        let run = self.load_run(run_id).await?;
        if run.status != RunStatus::Succeeded {
            return Err(LifecycleError::Precondition(format!(
                "run {} has not succeeded (status {})",
                run_id, run.status
            )));
        }
        if run.deployed {
            return Err(LifecycleError::Conflict(format!(
                "run {} is already deployed",
                run_id
            )));
        }
        let spec_id = run.ml_run_specification_id.ok_or_else(|| {
            LifecycleError::Precondition(format!("run {} has no run specification", run_id))
        })?;
        let spec = self.store.load_run_specification(spec_id).await?;
        let dataframe_id = spec.dataframe_id.ok_or_else(|| {
            LifecycleError::Precondition(format!(
                "run specification {} has no DataFrame",
                spec_id
            ))
        })?;
        let dataframe = self.store.load_dataframe(dataframe_id).await?;
        if dataframe.target_ids.is_empty() {
            return Err(LifecycleError::Precondition(format!(
                "DataFrame {} has no target characteristics",
                dataframe_id
            )));
        }
        let product_spec_id = dataframe.product_specification_id.ok_or_else(|| {
            LifecycleError::Precondition(format!(
                "DataFrame {} has no product specification",
                dataframe_id
            ))
        })?;
        let product_spec = self.store.product_specification(product_spec_id).await?;
        let targets = self.store.characteristics_by_ids(&dataframe.target_ids).await?;

        let run_name = run.name.clone().unwrap_or_else(|| format!("run-{}", run_id));
        let dataframe_name = dataframe
            .name
            .clone()
            .unwrap_or_else(|| format!("dataframe-{}", dataframe_id));
        let product_spec_name = product_spec
            .name
            .clone()
            .unwrap_or_else(|| format!("specification-{}", product_spec_id));

        let result = self
            .create_derived_resources(
                &run_name,
                &dataframe_name,
                &product_spec_name,
                product_spec_id,
                run_id,
                &targets,
            )
            .await;
        if let Err(e) = result {
            warn!(
                tenant = %self.store.tenant(),
                run_id, error = %e, "Deploy failed, removing partial resources"
            );
            self.store.delete_derived_resources(run_id).await?;
            return Err(e.into());
        }

        self.store.set_run_deployed(run_id, true).await?;
        info!(tenant = %self.store.tenant(), run_id, "Run deployed");
        Ok(())
    }

    async fn create_derived_resources(
        &self,
        run_name: &str,
        dataframe_name: &str,
        product_spec_name: &str,
        product_spec_id: i64,
        run_id: i64,
        targets: &[crate::model::QualityCharacteristic],
    ) -> Result<(), StoreError> {
        let step_spec_name = format!("{}-{}-Prediction", run_name, product_spec_name);
        self.store
            .create_derived_step_specification(&step_spec_name, product_spec_id, run_id)
            .await?;
        for target in targets {
            let sensor_name = format!("{}_{}_{}", run_name, dataframe_name, target.name);
            self.store
                .create_virtual_sensor(
                    &sensor_name,
                    &format!("Predicted {}", target.name),
                    target.id,
                    run_id,
                )
                .await?;
        }
        Ok(())
    }

    /// Removes the derived resources of a deployed run. Undeploying a run
    /// that is not deployed is a no-op.
    pub async fn undeploy(&self, run_id: i64) -> Result<(), LifecycleError> {
        let _ = self.load_run(run_id).await?;
        self.store.delete_derived_resources(run_id).await?;
        self.store.set_run_deployed(run_id, false).await?;
        info!(tenant = %self.store.tenant(), run_id, "Run undeployed");
        Ok(())
    }

    /// Deletes a run, removing its derived resources first.
    pub async fn delete(&self, run_id: i64) -> Result<(), LifecycleError> {
        let _ = self.load_run(run_id).await?;
        // Derived resources can outlive the deployed flag after a failed
        // deploy cleanup; teardown is a no-op on a clean run.
        self.store.delete_derived_resources(run_id).await?;
        self.store.delete_run(run_id).await?;
        info!(tenant = %self.store.tenant(), run_id, "Run deleted");
        Ok(())
    }

    async fn load_run(&self, run_id: i64) -> Result<MlRun, LifecycleError> {
        match self.store.load_run(run_id).await {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound { .. }) => Err(LifecycleError::RunNotFound(run_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_template(
        &self,
        name: &str,
    ) -> Result<Option<TemplateInner>, LifecycleError> {
        let response = self.client.get_template(name).await?;
        if !response.is_success() {
            return Ok(None);
        }
        let inner: TemplateInner = serde_json::from_str(&response.body)?;
        Ok(Some(inner))
    }
}

/// Workflow-template name derived from a run specification: `dag-` plus the
/// lowercased name with whitespace collapsed to hyphens.
fn template_slug(spec: &MlRunSpecification) -> String {
    let name = spec
        .name
        .clone()
        .unwrap_or_else(|| format!("specification-{}", spec.id));
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("dag-{}", slug)
}

fn existing_dag_tasks(inner: &TemplateInner) -> Vec<DagTask> {
    inner
        .spec
        .templates
        .first()
        .map(|t| t.dag.tasks.clone())
        .unwrap_or_default()
}

fn upstream(response: &OrchestratorResponse) -> LifecycleError {
    let reason = if response.body.is_empty() {
        response.reason.clone()
    } else {
        response.body.clone()
    };
    LifecycleError::Upstream {
        status: response.status,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: Option<&str>) -> MlRunSpecification {
        MlRunSpecification {
            id: 7,
            name: name.map(str::to_string),
            pipeline_order: None,
            workflow_template: None,
            save_path: None,
            create_new_template: false,
            dataframe_id: None,
        }
    }

    #[test]
    fn test_template_slug_lowercases_and_hyphenates() {
        assert_eq!(template_slug(&spec(Some("Mill Quality V2"))), "dag-mill-quality-v2");
        assert_eq!(template_slug(&spec(Some("drift"))), "dag-drift");
    }

    #[test]
    fn test_template_slug_without_name() {
        assert_eq!(template_slug(&spec(None)), "dag-specification-7");
    }

    #[test]
    fn test_upstream_prefers_body() {
        let with_body = OrchestratorResponse {
            status: 400,
            reason: "Bad Request".to_string(),
            body: "order is empty".to_string(),
        };
        let LifecycleError::Upstream { status, reason } = upstream(&with_body) else {
            panic!("expected Upstream");
        };
        assert_eq!(status, 400);
        assert_eq!(reason, "order is empty");

        let empty_body = OrchestratorResponse {
            status: 503,
            reason: "Service Unavailable".to_string(),
            body: String::new(),
        };
        let LifecycleError::Upstream { reason, .. } = upstream(&empty_body) else {
            panic!("expected Upstream");
        };
        assert_eq!(reason, "Service Unavailable");
    }
}
