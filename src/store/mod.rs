//! Multi-tenant entity store backed by PostgreSQL.
//!
//! Tenant isolation is achieved by one logical database per tenant. A
//! [`TenantRegistry`] owns one connection pool per tenant; every operation
//! goes through a [`Store`] handle bound to exactly one tenant, so no
//! ambient or global routing state exists.

mod migrations;
mod queries;
mod schema;
mod tenant;

pub use migrations::MigrationRunner;
pub use queries::{FeatureKind, NewReading, StackedReading, Store};
pub use tenant::TenantRegistry;

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to a tenant database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// No tenant with the given name is configured.
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    /// A row that must exist was not found.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Stored JSON could not be interpreted.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
