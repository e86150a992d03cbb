//! CLI command definitions and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::config::Config;
use crate::dataset::DatasetBuilder;
use crate::jobs::{Job, JobContext, JobKind, JobQueue, WorkerPool, WorkerPoolConfig};
use crate::orchestrator::OrchestratorClient;
use crate::run::{sync_all, sync_catalog, RunLifecycle};
use crate::store::TenantRegistry;

/// Process-quality backend: dataset assembly and ML pipeline orchestration.
#[derive(Parser)]
#[command(name = "prodsight")]
#[command(about = "Manufacturing process-quality backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run schema migrations against every tenant database.
    Migrate,

    /// Build the feature/target dataset of one DataFrame specification.
    BuildDataset(BuildDatasetArgs),

    /// Enqueue a dataset build as a background job.
    EnqueueDataset(BuildDatasetArgs),

    /// Start an ML run from a run specification.
    StartRun(RunSpecArgs),

    /// Terminate an active run.
    TerminateRun(RunArgs),

    /// Deploy a succeeded run as virtual sensors.
    DeployRun(RunArgs),

    /// Remove a run's deployed virtual sensors.
    UndeployRun(RunArgs),

    /// Delete a run, undeploying it first if needed.
    DeleteRun(RunArgs),

    /// Synchronize active run statuses with the orchestrator.
    SyncStatus,

    /// Import the orchestrator's template catalog into every tenant.
    SyncCatalog,

    /// Import raw sensor readings from a JSON file.
    ImportReadings(ImportArgs),

    /// Run the background worker pool until interrupted.
    Worker,
}

#[derive(Parser, Debug)]
pub struct BuildDatasetArgs {
    /// Tenant the DataFrame belongs to.
    #[arg(short, long)]
    pub tenant: String,

    /// DataFrame specification id.
    #[arg(short, long)]
    pub dataframe: i64,

    /// Reduction methods (Min, Max, Avg, StdDev) or StackedDataFrame.
    #[arg(short, long, value_delimiter = ',', default_value = "Avg")]
    pub methods: Vec<String>,

    /// Explicit product ids; resolved from the specification when omitted.
    #[arg(short, long, value_delimiter = ',')]
    pub products: Option<Vec<i64>>,
}

#[derive(Parser, Debug)]
pub struct RunSpecArgs {
    /// Tenant the run specification belongs to.
    #[arg(short, long)]
    pub tenant: String,

    /// Run specification id.
    #[arg(short, long)]
    pub specification: i64,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Tenant the run belongs to.
    #[arg(short, long)]
    pub tenant: String,

    /// Run id.
    #[arg(short, long)]
    pub run: i64,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Tenant to import into.
    #[arg(short, long)]
    pub tenant: String,

    /// JSON file holding an array of reading records.
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let registry = TenantRegistry::connect(&config.tenants).await?;
    let client = OrchestratorClient::new(config.orchestrator.clone());

    match cli.command {
        Commands::Migrate => {
            registry.migrate_all().await?;
            info!("Migrations complete");
        }
        Commands::BuildDataset(args) => {
            let store = registry.store(&args.tenant)?;
            DatasetBuilder::new(&store)
                .run(args.dataframe, &args.methods, args.products)
                .await?;
        }
        Commands::EnqueueDataset(args) => {
            let queue = JobQueue::connect(&config.redis_url, &config.queue_name).await?;
            let job = Job::new(JobKind::BuildDataset {
                tenant: args.tenant,
                dataframe_id: args.dataframe,
                methods: args.methods,
                product_ids: args.products,
            });
            let job_id = job.id;
            queue.enqueue(&job).await?;
            info!(%job_id, "Dataset build enqueued");
        }
        Commands::StartRun(args) => {
            let store = registry.store(&args.tenant)?;
            let run_id = RunLifecycle::new(&store, &client)
                .start(args.specification)
                .await?;
            info!(run_id, "Run started");
        }
        Commands::TerminateRun(args) => {
            let store = registry.store(&args.tenant)?;
            RunLifecycle::new(&store, &client).terminate(args.run).await?;
        }
        Commands::DeployRun(args) => {
            let store = registry.store(&args.tenant)?;
            RunLifecycle::new(&store, &client).deploy(args.run).await?;
        }
        Commands::UndeployRun(args) => {
            let store = registry.store(&args.tenant)?;
            RunLifecycle::new(&store, &client).undeploy(args.run).await?;
        }
        Commands::DeleteRun(args) => {
            let store = registry.store(&args.tenant)?;
            RunLifecycle::new(&store, &client).delete(args.run).await?;
        }
        Commands::SyncStatus => {
            let report = sync_all(&registry, &client).await;
            info!(
                updated = report.total_updated(),
                errors = report.total_errors(),
                "Status sync complete"
            );
        }
        Commands::SyncCatalog => {
            let report = sync_catalog(&registry, &client).await?;
            info!(
                created = report.created,
                updated = report.updated,
                errors = report.errors,
                "Catalog sync complete"
            );
        }
        Commands::ImportReadings(args) => {
            let store = registry.store(&args.tenant)?;
            let inserted = crate::ingest::import_file(&store, &args.file).await?;
            info!(inserted, "Import complete");
        }
        Commands::Worker => {
            let queue = Arc::new(JobQueue::connect(&config.redis_url, &config.queue_name).await?);
            let context = Arc::new(JobContext { registry, client });
            let pool_config = WorkerPoolConfig {
                num_workers: config.num_workers,
                ..WorkerPoolConfig::default()
            };
            let mut pool = WorkerPool::new(pool_config, queue, context);
            pool.start().await?;
            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, shutting down");
            pool.shutdown().await?;
        }
    }
    Ok(())
}
