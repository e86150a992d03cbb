//! Idempotent schema migration runner for tenant databases.

use sqlx::PgPool;

use super::schema;
use super::StoreError;

/// Applies the schema to one tenant database, tracking applied statements
/// in a `_migrations` table so re-runs are cheap no-ops.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending migrations. Safe to call repeatedly.
    pub async fn run(&self) -> Result<(), StoreError> {
        self.ensure_migrations_table().await?;

        for (idx, statement) in schema::all_schema_statements().iter().enumerate() {
            let name = format!("schema_v1_part_{}", idx);
            if !self.is_applied(&name).await? {
                self.apply(&name, statement).await?;
            }
        }
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_applied(&self, name: &str) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn apply(&self, name: &str, statement: &str) -> Result<(), StoreError> {
        // Multi-statement DDL blocks are split on ';' because sqlx prepares
        // one statement per query.
        for part in statement.split(';').filter(|p| !p.trim().is_empty()) {
            sqlx::query(part).execute(&self.pool).await?;
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        tracing::debug!(migration = %name, "Applied migration");
        Ok(())
    }
}
