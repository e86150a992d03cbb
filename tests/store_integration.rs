//! Integration tests against a real tenant database.
//!
//! These tests migrate and write to the configured database.
//! Run with: PRODSIGHT_TEST_DATABASE_URL=postgres://... cargo test --test store_integration -- --ignored

use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use prodsight::config::{OrchestratorConfig, RetryBudget};
use prodsight::error::LifecycleError;
use prodsight::model::RunStatus;
use prodsight::orchestrator::OrchestratorClient;
use prodsight::run::RunLifecycle;
use prodsight::store::{MigrationRunner, Store};

async fn test_pool() -> PgPool {
    let url = std::env::var("PRODSIGHT_TEST_DATABASE_URL")
        .expect("PRODSIGHT_TEST_DATABASE_URL must be set for integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Could not connect to the test database");
    MigrationRunner::new(pool.clone())
        .run()
        .await
        .expect("Migrations failed");
    pool
}

/// Client that is never contacted; lifecycle store paths take no requests.
fn offline_client() -> OrchestratorClient {
    OrchestratorClient::new(OrchestratorConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        token: "Bearer test".to_string(),
        namespace: "ml".to_string(),
        catalog_label: "prodsight".to_string(),
        retry: RetryBudget::none(),
    })
}

async fn insert_run(pool: &PgPool, name: &str, status: &str, deployed: bool) -> i64 {
    sqlx::query("INSERT INTO ml_runs (name, status, deployed) VALUES ($1, $2, $3) RETURNING id")
        .bind(name)
        .bind(status)
        .bind(deployed)
        .fetch_one(pool)
        .await
        .unwrap()
        .get::<i64, _>("id")
}

async fn insert_characteristic(pool: &PgPool, name: &str) -> i64 {
    sqlx::query("INSERT INTO quality_characteristics (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
        .get::<i64, _>("id")
}

async fn insert_product_specification(pool: &PgPool, name: &str) -> i64 {
    sqlx::query("INSERT INTO product_specifications (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
        .get::<i64, _>("id")
}

async fn derived_step_specification_count(pool: &PgPool, run_id: i64) -> i64 {
    sqlx::query("SELECT COUNT(*) AS n FROM process_step_specifications WHERE ml_run_id = $1")
        .bind(run_id)
        .fetch_one(pool)
        .await
        .unwrap()
        .get::<i64, _>("n")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test store_integration -- --ignored
async fn test_undeploy_twice_leaves_no_derived_resources() {
    let pool = test_pool().await;
    let store = Store::new("test".to_string(), pool.clone());
    let client = offline_client();
    let lifecycle = RunLifecycle::new(&store, &client);

    let product_spec_id = insert_product_specification(&pool, "undeploy-twice-spec").await;
    let characteristic_id = insert_characteristic(&pool, "undeploy-twice-target").await;
    let run_id = insert_run(&pool, "undeploy-twice-run", "Succeeded", true).await;

    store
        .create_derived_step_specification("undeploy-twice-Prediction", product_spec_id, run_id)
        .await
        .unwrap();
    store
        .create_virtual_sensor("undeploy-twice-sensor", "Predicted", characteristic_id, run_id)
        .await
        .unwrap();
    assert_eq!(store.sensors_for_run(run_id).await.unwrap().len(), 1);

    lifecycle.undeploy(run_id).await.unwrap();
    lifecycle.undeploy(run_id).await.unwrap();

    assert!(store.sensors_for_run(run_id).await.unwrap().is_empty());
    assert_eq!(derived_step_specification_count(&pool, run_id).await, 0);
    assert!(!store.load_run(run_id).await.unwrap().deployed);

    store.delete_run(run_id).await.unwrap();
    sqlx::query("DELETE FROM quality_characteristics WHERE id = $1")
        .bind(characteristic_id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM product_specifications WHERE id = $1")
        .bind(product_spec_id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_delete_removes_derived_resources_of_undeployed_run() {
    let pool = test_pool().await;
    let store = Store::new("test".to_string(), pool.clone());
    let client = offline_client();
    let lifecycle = RunLifecycle::new(&store, &client);

    let product_spec_id = insert_product_specification(&pool, "delete-orphan-spec").await;
    let characteristic_id = insert_characteristic(&pool, "delete-orphan-target").await;
    // Derived resources present but deployed=false, as left behind when a
    // deploy fails after partially creating them.
    let run_id = insert_run(&pool, "delete-orphan-run", "Succeeded", false).await;
    store
        .create_derived_step_specification("delete-orphan-Prediction", product_spec_id, run_id)
        .await
        .unwrap();
    store
        .create_virtual_sensor("delete-orphan-sensor", "Predicted", characteristic_id, run_id)
        .await
        .unwrap();

    lifecycle.delete(run_id).await.unwrap();

    assert!(matches!(
        lifecycle.delete(run_id).await,
        Err(LifecycleError::RunNotFound(_))
    ));
    assert!(store.sensors_for_run(run_id).await.unwrap().is_empty());
    assert_eq!(derived_step_specification_count(&pool, run_id).await, 0);

    sqlx::query("DELETE FROM quality_characteristics WHERE id = $1")
        .bind(characteristic_id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM product_specifications WHERE id = $1")
        .bind(product_spec_id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_terminated_run_stays_in_sweep_until_terminal_phase() {
    let pool = test_pool().await;
    let store = Store::new("test".to_string(), pool.clone());

    let spec_id =
        sqlx::query("INSERT INTO ml_run_specifications (name) VALUES ($1) RETURNING id")
            .bind("sweep-spec")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get::<i64, _>("id");
    let run_id = store
        .create_run("sweep-run", "sweep-job-1", &json!([]), None, spec_id)
        .await
        .unwrap();

    // Scheduled at submission; termination writes nothing locally, so the
    // run must stay in the sweep's working set.
    let active = store.active_runs().await.unwrap();
    assert!(active.contains(&(run_id, "sweep-job-1".to_string())));

    store
        .update_run_status(run_id, RunStatus::Running)
        .await
        .unwrap();
    let active = store.active_runs().await.unwrap();
    assert!(active.contains(&(run_id, "sweep-job-1".to_string())));

    // Only the orchestrator-reported terminal phase retires it.
    store
        .update_run_status(run_id, RunStatus::Failed)
        .await
        .unwrap();
    let active = store.active_runs().await.unwrap();
    assert!(!active.iter().any(|(id, _)| *id == run_id));

    store.delete_run(run_id).await.unwrap();
    sqlx::query("DELETE FROM ml_run_specifications WHERE id = $1")
        .bind(spec_id)
        .execute(&pool)
        .await
        .unwrap();
}
