//! Tenant registry: one connection pool per logical database.

use std::collections::HashMap;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::queries::Store;
use super::StoreError;
use crate::config::TenantConfig;

/// Owns one Postgres pool per configured tenant and hands out [`Store`]
/// handles bound to a single tenant.
pub struct TenantRegistry {
    pools: HashMap<String, PgPool>,
}

impl TenantRegistry {
    /// Connects to every configured tenant database.
    pub async fn connect(tenants: &[TenantConfig]) -> Result<Self, StoreError> {
        let mut pools = HashMap::new();
        for tenant in tenants {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .min_connections(1)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(&tenant.database_url)
                .await
                .map_err(|e| {
                    StoreError::ConnectionFailed(format!("tenant '{}': {}", tenant.name, e))
                })?;
            pools.insert(tenant.name.clone(), pool);
        }
        Ok(Self { pools })
    }

    /// Builds a registry from pre-established pools (used by tests).
    pub fn from_pools(pools: HashMap<String, PgPool>) -> Self {
        Self { pools }
    }

    /// Returns a store handle for one tenant.
    pub fn store(&self, tenant: &str) -> Result<Store, StoreError> {
        let pool = self
            .pools
            .get(tenant)
            .ok_or_else(|| StoreError::UnknownTenant(tenant.to_string()))?;
        Ok(Store::new(tenant.to_string(), pool.clone()))
    }

    /// Names of all configured tenants, in stable order.
    pub fn tenant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs migrations against every tenant database.
    pub async fn migrate_all(&self) -> Result<(), StoreError> {
        for (name, pool) in &self.pools {
            tracing::info!(tenant = %name, "Running migrations");
            super::MigrationRunner::new(pool.clone()).run().await?;
        }
        Ok(())
    }
}
