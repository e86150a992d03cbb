//! Environment-driven configuration.
//!
//! All settings come from the process environment and are loaded once at
//! startup. The resulting [`Config`] is passed down explicitly; no module
//! reads the environment on its own and there is no ambient tenant state.

use std::time::Duration;

use crate::error::ConfigError;

/// Fixed artifact-exchange location consumed by interior pipeline stages.
pub const ARTIFACT_INPUT_PATH: &str = "/code/artifacts/input";
/// Fixed artifact-exchange location written by interior pipeline stages.
pub const ARTIFACT_OUTPUT_PATH: &str = "/code/artifacts/output";

/// One logical tenant database.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantConfig {
    /// Tenant name, used as the routing key for jobs and CLI commands.
    pub name: String,
    /// Postgres connection string for this tenant's schema.
    pub database_url: String,
}

/// Retry budget for orchestrator requests.
///
/// `max_wait` bounds the total time spent waiting between attempts;
/// `base_delay` seeds the exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBudget {
    pub max_wait: Duration,
    pub base_delay: Duration,
}

impl RetryBudget {
    /// A budget that allows no retries: the first response is the answer.
    pub fn none() -> Self {
        Self {
            max_wait: Duration::ZERO,
            base_delay: Duration::from_millis(10),
        }
    }

    /// Standard budget used by background jobs.
    pub fn standard() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            base_delay: Duration::from_secs(5),
        }
    }
}

/// Connection settings for the external workflow orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL of the orchestrator API, without trailing slash.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: String,
    /// Namespace under which templates and workflows live.
    pub namespace: String,
    /// Label identifying templates managed by this system. Submitted
    /// workflows are tagged `creator=<label>` and the catalog sync only
    /// imports templates carrying it.
    pub catalog_label: String,
    /// Default retry budget for requests.
    pub retry: RetryBudget,
}

impl OrchestratorConfig {
    /// API prefix for workflow-template resources.
    pub fn templates_url(&self) -> String {
        format!(
            "{}/api/v1/workflow-templates/{}",
            self.base_url, self.namespace
        )
    }

    /// API prefix for workflow resources.
    pub fn workflows_url(&self) -> String {
        format!("{}/api/v1/workflows/{}", self.base_url, self.namespace)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub tenants: Vec<TenantConfig>,
    /// Redis connection URL for the job queue.
    pub redis_url: String,
    /// Name of the job queue.
    pub queue_name: String,
    /// Number of worker tasks in the pool.
    pub num_workers: usize,
}

impl Config {
    /// Loads the configuration from the environment.
    ///
    /// Required variables:
    ///
    /// * `ORCHESTRATOR_URL` - base URL of the workflow orchestrator
    /// * `ORCHESTRATOR_TOKEN` - bearer token
    /// * `ORCHESTRATOR_NAMESPACE` - namespace for templates and workflows
    /// * `PRODSIGHT_TENANTS` - semicolon-separated `name=postgres-url` pairs
    ///
    /// Optional variables:
    ///
    /// * `PRODSIGHT_REDIS_URL` (default `redis://localhost:6379`)
    /// * `PRODSIGHT_QUEUE` (default `prodsight-jobs`)
    /// * `PRODSIGHT_WORKERS` (default `4`)
    /// * `PRODSIGHT_CATALOG_LABEL` (default `prodsight`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_var("ORCHESTRATOR_URL")?
            .trim_end_matches('/')
            .to_string();
        let token = require_var("ORCHESTRATOR_TOKEN")?;
        let namespace = require_var("ORCHESTRATOR_NAMESPACE")?;
        let catalog_label =
            std::env::var("PRODSIGHT_CATALOG_LABEL").unwrap_or_else(|_| "prodsight".to_string());

        let tenants = parse_tenants(&require_var("PRODSIGHT_TENANTS")?)?;

        let redis_url = std::env::var("PRODSIGHT_REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let queue_name =
            std::env::var("PRODSIGHT_QUEUE").unwrap_or_else(|_| "prodsight-jobs".to_string());
        let num_workers = match std::env::var("PRODSIGHT_WORKERS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PRODSIGHT_WORKERS".to_string(),
                reason: format!("'{}' is not a number", v),
            })?,
            Err(_) => 4,
        };

        Ok(Self {
            orchestrator: OrchestratorConfig {
                base_url,
                token,
                namespace,
                catalog_label,
                retry: RetryBudget::standard(),
            },
            tenants,
            redis_url,
            queue_name,
            num_workers,
        })
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

/// Parses `name=url;name=url` tenant declarations.
fn parse_tenants(raw: &str) -> Result<Vec<TenantConfig>, ConfigError> {
    let mut tenants = Vec::new();
    for entry in raw.split(';').filter(|e| !e.trim().is_empty()) {
        let (name, url) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidTenant(entry.to_string()))?;
        if name.trim().is_empty() || url.trim().is_empty() {
            return Err(ConfigError::InvalidTenant(entry.to_string()));
        }
        tenants.push(TenantConfig {
            name: name.trim().to_string(),
            database_url: url.trim().to_string(),
        });
    }
    if tenants.is_empty() {
        return Err(ConfigError::NoTenants);
    }
    Ok(tenants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tenants_multiple() {
        let tenants =
            parse_tenants("plant_a=postgres://localhost/a;plant_b=postgres://localhost/b").unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].name, "plant_a");
        assert_eq!(tenants[1].database_url, "postgres://localhost/b");
    }

    #[test]
    fn test_parse_tenants_trims_whitespace() {
        let tenants = parse_tenants(" main = postgres://localhost/main ;").unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "main");
        assert_eq!(tenants[0].database_url, "postgres://localhost/main");
    }

    #[test]
    fn test_parse_tenants_rejects_malformed_entry() {
        assert!(parse_tenants("just-a-name").is_err());
        assert!(parse_tenants("=postgres://localhost/x").is_err());
    }

    #[test]
    fn test_parse_tenants_rejects_empty() {
        assert!(matches!(parse_tenants(""), Err(ConfigError::NoTenants)));
    }

    #[test]
    fn test_orchestrator_urls() {
        let cfg = OrchestratorConfig {
            base_url: "http://argo.local".to_string(),
            token: "t".to_string(),
            namespace: "ml".to_string(),
            catalog_label: "prodsight".to_string(),
            retry: RetryBudget::none(),
        };
        assert_eq!(
            cfg.templates_url(),
            "http://argo.local/api/v1/workflow-templates/ml"
        );
        assert_eq!(cfg.workflows_url(), "http://argo.local/api/v1/workflows/ml");
    }
}
