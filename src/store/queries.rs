//! Entity store queries for one tenant.
//!
//! A [`Store`] is bound to exactly one tenant database. It exposes the
//! query capability the dataset and lifecycle subsystems need: filtering
//! by foreign key, distinct id lists, grouped aggregates, bulk inserts and
//! the handful of CRUD operations driven by the state machines.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::StoreError;
use crate::model::{
    DataFrameSpec, MlRun, MlRunSpecification, PipelineBlock, PipelineBlockSpecification,
    ProcessParameter, ProductSpecification, QualityCharacteristic, ReductionMethod, RunStatus,
};

/// Which reading column a feature lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Parameter,
    Characteristic,
}

impl FeatureKind {
    fn reading_column(self) -> &'static str {
        match self {
            FeatureKind::Parameter => "process_parameter_id",
            FeatureKind::Characteristic => "quality_characteristic_id",
        }
    }
}

/// One long-format reading row: product, timestamp, feature id, value.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedReading {
    pub product_id: i64,
    pub date: DateTime<Utc>,
    pub kind: i64,
    pub value: f64,
}

/// A sensor reading to be bulk-inserted.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub value: f64,
    pub date: DateTime<Utc>,
    pub sensor_id: Option<i64>,
    pub process_step_id: Option<i64>,
    pub process_parameter_id: Option<i64>,
    pub quality_characteristic_id: Option<i64>,
}

/// Store handle bound to one tenant database.
#[derive(Clone)]
pub struct Store {
    tenant: String,
    pool: PgPool,
}

impl Store {
    pub fn new(tenant: String, pool: PgPool) -> Self {
        Self { tenant, pool }
    }

    /// Name of the tenant this handle is bound to.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // DataFrame specifications
    // =========================================================================

    /// Loads a DataFrame spec with its four selection sets.
    pub async fn load_dataframe(&self, id: i64) -> Result<DataFrameSpec, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, status, save_path, product_amount, random_records,
                   product_specification_id
            FROM dataframes WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "DataFrame",
            id,
        })?;

        let step_specification_ids = self
            .join_ids(
                "SELECT process_step_specification_id FROM dataframe_step_specifications WHERE dataframe_id = $1",
                id,
            )
            .await?;
        let parameter_ids = self
            .join_ids(
                "SELECT process_parameter_id FROM dataframe_parameters WHERE dataframe_id = $1",
                id,
            )
            .await?;
        let characteristic_ids = self
            .join_ids(
                "SELECT quality_characteristic_id FROM dataframe_characteristics WHERE dataframe_id = $1",
                id,
            )
            .await?;
        let target_ids = self
            .join_ids(
                "SELECT quality_characteristic_id FROM dataframe_targets WHERE dataframe_id = $1",
                id,
            )
            .await?;

        let status: String = row.get("status");
        Ok(DataFrameSpec {
            id: row.get("id"),
            name: row.get("name"),
            status: RunStatus::from_str_lossy(&status),
            save_path: row.get("save_path"),
            product_amount: row.get("product_amount"),
            random_records: row.get("random_records"),
            product_specification_id: row.get("product_specification_id"),
            step_specification_ids,
            parameter_ids,
            characteristic_ids,
            target_ids,
        })
    }

    async fn join_ids(&self, sql: &str, id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as(sql).bind(id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    pub async fn update_dataframe_status(
        &self,
        id: i64,
        status: RunStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE dataframes SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Feature assembly queries
    // =========================================================================

    /// Distinct ids of products belonging to a product specification that
    /// have at least one process step in the selected specification set.
    pub async fn candidate_product_ids(
        &self,
        product_specification_id: i64,
        step_specification_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT p.id
            FROM products p
            JOIN process_steps ps ON ps.product_id = p.id
            WHERE p.product_specification_id = $1
              AND ps.process_step_specification_id = ANY($2)
            "#,
        )
        .bind(product_specification_id)
        .bind(step_specification_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    pub async fn parameters_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<ProcessParameter>, StoreError> {
        let rows = sqlx::query_as::<_, ProcessParameter>(
            "SELECT id, name, process_step_specification_id FROM process_parameters WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn characteristics_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<QualityCharacteristic>, StoreError> {
        let rows = sqlx::query_as::<_, QualityCharacteristic>(
            "SELECT id, name, process_step_specification_id FROM quality_characteristics WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Process steps of the given products under one step specification,
    /// as (step id, product id) pairs ordered descending by product id.
    pub async fn steps_for_products(
        &self,
        product_ids: &[i64],
        step_specification_id: i64,
    ) -> Result<Vec<(i64, i64)>, StoreError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, product_id FROM process_steps
            WHERE product_id = ANY($1) AND process_step_specification_id = $2
            ORDER BY product_id DESC
            "#,
        )
        .bind(product_ids)
        .bind(step_specification_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Applies one reduction method to a feature's readings, grouped by
    /// process step. Steps without readings are absent from the result.
    pub async fn aggregate_readings(
        &self,
        step_ids: &[i64],
        kind: FeatureKind,
        feature_id: i64,
        method: ReductionMethod,
    ) -> Result<HashMap<i64, f64>, StoreError> {
        // Aggregate function and filter column come from enums, never from
        // user input.
        let sql = format!(
            "SELECT process_step_id, {}(value) FROM sensor_readings \
             WHERE process_step_id = ANY($1) AND {} = $2 \
             GROUP BY process_step_id",
            method.sql_fn(),
            kind.reading_column(),
        );
        let rows: Vec<(i64, Option<f64>)> = sqlx::query_as(&sql)
            .bind(step_ids)
            .bind(feature_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(step, value)| value.map(|v| (step, v)))
            .collect())
    }

    /// The literal single reading of a target characteristic per process
    /// step (earliest by date when several exist). Targets are ground-truth
    /// measurements and are never reduced.
    pub async fn raw_target_values(
        &self,
        step_ids: &[i64],
        characteristic_id: i64,
    ) -> Result<HashMap<i64, f64>, StoreError> {
        let rows: Vec<(i64, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (process_step_id) process_step_id, value
            FROM sensor_readings
            WHERE process_step_id = ANY($1) AND quality_characteristic_id = $2
            ORDER BY process_step_id, date
            "#,
        )
        .bind(step_ids)
        .bind(characteristic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(step, value)| value.map(|v| (step, v)))
            .collect())
    }

    /// Long-format readings for stacked (time-series) output: one row per
    /// reading, keyed to the product through its process step, ordered by
    /// product, feature and timestamp.
    pub async fn stacked_readings(
        &self,
        product_ids: &[i64],
        step_specification_id: i64,
        kind: FeatureKind,
        feature_ids: &[i64],
    ) -> Result<Vec<StackedReading>, StoreError> {
        let column = kind.reading_column();
        let sql = format!(
            "SELECT ps.product_id, sr.date, sr.{column}, sr.value \
             FROM sensor_readings sr \
             JOIN process_steps ps ON sr.process_step_id = ps.id \
             WHERE ps.product_id = ANY($1) \
               AND ps.process_step_specification_id = $2 \
               AND sr.{column} = ANY($3) \
             ORDER BY ps.product_id, sr.{column}, sr.date",
        );
        let rows: Vec<(i64, Option<DateTime<Utc>>, i64, Option<f64>)> = sqlx::query_as(&sql)
            .bind(product_ids)
            .bind(step_specification_id)
            .bind(feature_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(product_id, date, kind, value)| {
                match (date, value) {
                    (Some(date), Some(value)) => Some(StackedReading {
                        product_id,
                        date,
                        kind,
                        value,
                    }),
                    _ => None,
                }
            })
            .collect())
    }

    // =========================================================================
    // Pipeline blocks and run specifications
    // =========================================================================

    pub async fn load_run_specification(
        &self,
        id: i64,
    ) -> Result<MlRunSpecification, StoreError> {
        sqlx::query_as::<_, MlRunSpecification>(
            r#"
            SELECT id, name, pipeline_order, workflow_template, save_path,
                   create_new_template, dataframe_id
            FROM ml_run_specifications WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "MlRunSpecification",
            id,
        })
    }

    /// Pipeline blocks linked to a run specification.
    pub async fn blocks_for_run_specification(
        &self,
        run_specification_id: i64,
    ) -> Result<Vec<PipelineBlock>, StoreError> {
        let rows = sqlx::query_as::<_, PipelineBlock>(
            r#"
            SELECT b.id, b.name, b.parameter, b.pipeline_block_specification_id
            FROM pipeline_blocks b
            JOIN run_specification_blocks rb ON rb.pipeline_block_id = b.id
            WHERE rb.ml_run_specification_id = $1
            ORDER BY b.id
            "#,
        )
        .bind(run_specification_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn block_specification(
        &self,
        id: i64,
    ) -> Result<PipelineBlockSpecification, StoreError> {
        sqlx::query_as::<_, PipelineBlockSpecification>(
            r#"
            SELECT id, name, parameter, workflow_template, template_entrypoint
            FROM pipeline_block_specifications WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "PipelineBlockSpecification",
            id,
        })
    }

    /// Caches the generated workflow-template name and clears the
    /// regeneration flag.
    pub async fn set_run_specification_template(
        &self,
        id: i64,
        template_name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ml_run_specifications SET workflow_template = $1, create_new_template = FALSE WHERE id = $2",
        )
        .bind(template_name)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Creates or updates a catalog entry. Returns true when a new row was
    /// created, false when an existing row was updated or already current.
    pub async fn upsert_block_specification(
        &self,
        name: &str,
        parameter: &serde_json::Value,
        workflow_template: &str,
        template_entrypoint: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO pipeline_block_specifications
                (name, parameter, workflow_template, template_entrypoint)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                parameter = EXCLUDED.parameter,
                workflow_template = EXCLUDED.workflow_template,
                template_entrypoint = EXCLUDED.template_entrypoint
            RETURNING (xmax = 0) AS created
            "#,
        )
        .bind(name)
        .bind(parameter)
        .bind(workflow_template)
        .bind(template_entrypoint)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<bool, _>("created"))
    }

    // =========================================================================
    // Runs
    // =========================================================================

    pub async fn load_run(&self, id: i64) -> Result<MlRun, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, status, save_path, parameter, external_job_id,
                   deployed, ml_run_specification_id
            FROM ml_runs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "MlRun",
            id,
        })?;
        let status: String = row.get("status");
        Ok(MlRun {
            id: row.get("id"),
            name: row.get("name"),
            status: RunStatus::from_str_lossy(&status),
            save_path: row.get("save_path"),
            parameter: row.get("parameter"),
            external_job_id: row.get("external_job_id"),
            deployed: row.get("deployed"),
            ml_run_specification_id: row.get("ml_run_specification_id"),
        })
    }

    /// Creates a run record at submission time, status Scheduled.
    pub async fn create_run(
        &self,
        name: &str,
        external_job_id: &str,
        parameter: &serde_json::Value,
        save_path: Option<&str>,
        run_specification_id: i64,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO ml_runs
                (name, status, save_path, parameter, external_job_id, ml_run_specification_id)
            VALUES ($1, 'Scheduled', $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(save_path)
        .bind(parameter)
        .bind(external_job_id)
        .bind(run_specification_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Runs still in flight, as (run id, external job id) pairs.
    pub async fn active_runs(&self) -> Result<Vec<(i64, String)>, StoreError> {
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            "SELECT id, external_job_id FROM ml_runs WHERE status = ANY($1)",
        )
        .bind(
            RunStatus::ACTIVE
                .iter()
                .map(|s| s.as_str().to_string())
                .collect::<Vec<_>>(),
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, job)| job.map(|j| (id, j)))
            .collect())
    }

    pub async fn update_run_status(&self, id: i64, status: RunStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE ml_runs SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_run_deployed(&self, id: i64, deployed: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE ml_runs SET deployed = $1 WHERE id = $2")
            .bind(deployed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_run(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM ml_runs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Deploy / undeploy derived resources
    // =========================================================================

    pub async fn product_specification(
        &self,
        id: i64,
    ) -> Result<ProductSpecification, StoreError> {
        sqlx::query_as::<_, ProductSpecification>(
            "SELECT id, name FROM product_specifications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "ProductSpecification",
            id,
        })
    }

    pub async fn create_virtual_sensor(
        &self,
        name: &str,
        description: &str,
        quality_characteristic_id: i64,
        run_id: i64,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sensors (name, description, virtual_sensor, quality_characteristic_id, ml_run_id)
            VALUES ($1, $2, TRUE, $3, $4)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(quality_characteristic_id)
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    pub async fn create_derived_step_specification(
        &self,
        name: &str,
        product_specification_id: i64,
        run_id: i64,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO process_step_specifications (name, optional, product_specification_id, ml_run_id)
            VALUES ($1, TRUE, $2, $3)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(product_specification_id)
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Ids of sensors tagged to a run.
    pub async fn sensors_for_run(&self, run_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM sensors WHERE ml_run_id = $1")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Removes every derived resource of a run: readings of its virtual
    /// sensors, the sensors themselves, and the derived step specification.
    /// Deleting an already-clean run is a no-op.
    pub async fn delete_derived_resources(&self, run_id: i64) -> Result<(), StoreError> {
        let sensor_ids = self.sensors_for_run(run_id).await?;
        sqlx::query("DELETE FROM sensor_readings WHERE sensor_id = ANY($1)")
            .bind(&sensor_ids)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM sensors WHERE id = ANY($1)")
            .bind(&sensor_ids)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM process_step_specifications WHERE ml_run_id = $1")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Bulk ingestion
    // =========================================================================

    /// Inserts readings in batches of `batch_size`. Each batch commits
    /// independently; a failure aborts the remainder but keeps prior
    /// batches (at-least-once, not atomic).
    pub async fn bulk_insert_readings(
        &self,
        readings: &[NewReading],
        batch_size: usize,
    ) -> Result<u64, StoreError> {
        let mut inserted = 0u64;
        for chunk in readings.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for r in chunk {
                sqlx::query(
                    r#"
                    INSERT INTO sensor_readings
                        (value, date, sensor_id, process_step_id, process_parameter_id, quality_characteristic_id)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(r.value)
                .bind(r.date)
                .bind(r.sensor_id)
                .bind(r.process_step_id)
                .bind(r.process_parameter_id)
                .bind(r.quality_characteristic_id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            inserted += chunk.len() as u64;
        }
        Ok(inserted)
    }
}
