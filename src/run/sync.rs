//! Periodic status synchronization between the orchestrator and the run
//! records of every tenant.

use tracing::{info, warn};

use crate::model::RunStatus;
use crate::orchestrator::OrchestratorClient;
use crate::store::{Store, TenantRegistry};

/// Outcome of one sweep over one tenant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TenantSync {
    pub tenant: String,
    /// Active runs inspected.
    pub checked: usize,
    /// Runs that reached a terminal status this sweep.
    pub updated: usize,
    /// Runs that could not be synchronized this sweep.
    pub errors: usize,
}

/// Outcome of one sweep over all tenants.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub tenants: Vec<TenantSync>,
}

impl SyncReport {
    pub fn total_updated(&self) -> usize {
        self.tenants.iter().map(|t| t.updated).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.tenants.iter().map(|t| t.errors).sum()
    }
}

/// Synchronizes the status of every active run across all tenants.
///
/// A failure on one run, or on one whole tenant, is logged and counted but
/// never stops the sweep; the affected runs stay active and are retried on
/// the next sweep. A workflow the orchestrator no longer reports, or one
/// in an unknown phase, moves the run to Other.
pub async fn sync_all(registry: &TenantRegistry, client: &OrchestratorClient) -> SyncReport {
    let mut report = SyncReport::default();
    for tenant in registry.tenant_names() {
        let outcome = match registry.store(&tenant) {
            Ok(store) => sync_tenant(&store, client).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(sync) => report.tenants.push(sync),
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Tenant sweep failed");
                report.tenants.push(TenantSync {
                    tenant,
                    errors: 1,
                    ..TenantSync::default()
                });
            }
        }
    }
    info!(
        updated = report.total_updated(),
        errors = report.total_errors(),
        "Run status sweep finished"
    );
    report
}

async fn sync_tenant(
    store: &Store,
    client: &OrchestratorClient,
) -> Result<TenantSync, crate::store::StoreError> {
    let active = store.active_runs().await?;
    let mut sync = TenantSync {
        tenant: store.tenant().to_string(),
        checked: active.len(),
        ..TenantSync::default()
    };

    for (run_id, job_id) in active {
        let status = match client.workflow_phase(&job_id).await {
            Ok(Some(phase)) => RunStatus::from_phase(&phase),
            Ok(None) => RunStatus::Other,
            Err(e) => {
                warn!(
                    tenant = %store.tenant(),
                    run_id, job_id = %job_id, error = %e, "Could not fetch workflow status"
                );
                sync.errors += 1;
                continue;
            }
        };
        if let Err(e) = store.update_run_status(run_id, status).await {
            warn!(
                tenant = %store.tenant(),
                run_id, error = %e, "Could not persist run status"
            );
            sync.errors += 1;
            continue;
        }
        if !status.is_active() {
            info!(
                tenant = %store.tenant(),
                run_id, status = %status, "Run finished"
            );
            sync.updated += 1;
        }
    }
    Ok(sync)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::config::{OrchestratorConfig, RetryBudget};

    fn dead_tenant_pool() -> sqlx::PgPool {
        // Port 9 is discard; the lazy pool only fails once a query runs.
        PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect_lazy("postgres://prodsight@127.0.0.1:9/tenant")
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_survives_unreachable_tenant() {
        let mut pools = HashMap::new();
        pools.insert("plant_a".to_string(), dead_tenant_pool());
        pools.insert("plant_b".to_string(), dead_tenant_pool());
        let registry = TenantRegistry::from_pools(pools);
        let client = OrchestratorClient::new(OrchestratorConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            token: "Bearer test".to_string(),
            namespace: "ml".to_string(),
            catalog_label: "prodsight".to_string(),
            retry: RetryBudget::none(),
        });

        let report = sync_all(&registry, &client).await;
        assert_eq!(report.tenants.len(), 2);
        assert_eq!(report.total_errors(), 2);
        assert_eq!(report.total_updated(), 0);
    }

    #[test]
    fn test_report_totals() {
        let report = SyncReport {
            tenants: vec![
                TenantSync {
                    tenant: "plant_a".to_string(),
                    checked: 3,
                    updated: 2,
                    errors: 1,
                },
                TenantSync {
                    tenant: "plant_b".to_string(),
                    checked: 1,
                    updated: 0,
                    errors: 0,
                },
            ],
        };
        assert_eq!(report.total_updated(), 2);
        assert_eq!(report.total_errors(), 1);
    }
}
