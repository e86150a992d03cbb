//! Thin client over the orchestrator's REST API.
//!
//! Requests retry with bounded exponential backoff on transport failures
//! and non-2xx responses. When the budget runs out, the last failing
//! response is returned to the caller rather than swallowed; the caller
//! decides whether a 404 is fatal or expected.

use std::time::Duration;

use reqwest::Method;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{OrchestratorConfig, RetryBudget};
use crate::error::OrchestratorError;
use crate::pipeline::WorkflowTemplate;

/// A response from the orchestrator, transport concerns already handled.
#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl OrchestratorResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, OrchestratorError> {
        serde_json::from_str(&self.body)
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))
    }
}

/// Client for workflow-template and workflow resources.
pub struct OrchestratorClient {
    http: reqwest::Client,
    config: OrchestratorConfig,
}

impl OrchestratorClient {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn catalog_label(&self) -> &str {
        &self.config.catalog_label
    }

    /// Fetches a workflow template by name. 404 comes back as a plain
    /// failing response. Never retried: a 404 is an expected answer here.
    pub async fn get_template(
        &self,
        name: &str,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let url = format!("{}/{}", self.config.templates_url(), name);
        self.request_with(Method::GET, &url, None, RetryBudget::none())
            .await
    }

    /// Lists all workflow templates in the namespace.
    pub async fn list_templates(&self) -> Result<OrchestratorResponse, OrchestratorError> {
        self.request(Method::GET, &self.config.templates_url(), None)
            .await
    }

    /// Creates a new workflow template.
    pub async fn create_template(
        &self,
        template: &WorkflowTemplate,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let body = serde_json::to_value(template)
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))?;
        self.request(Method::POST, &self.config.templates_url(), Some(body))
            .await
    }

    /// Replaces an existing workflow template.
    pub async fn update_template(
        &self,
        template: &WorkflowTemplate,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let url = format!(
            "{}/{}",
            self.config.templates_url(),
            template.template.metadata.name
        );
        let body = serde_json::to_value(template)
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))?;
        self.request(Method::PUT, &url, Some(body)).await
    }

    /// Submits a workflow from a template. On success the response body
    /// carries the created workflow's generated name in `metadata.name`.
    pub async fn submit(
        &self,
        template_name: &str,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let url = format!("{}/submit", self.config.workflows_url());
        let body = json!({
            "resourceKind": "WorkflowTemplate",
            "resourceName": template_name,
            "submitOptions": {
                "entrypoint": "main",
                "labels": format!("creator={}", self.config.catalog_label),
            },
        });
        self.request(Method::POST, &url, Some(body)).await
    }

    /// Fetches a workflow and extracts its `status.phase`. A non-2xx
    /// response yields `Ok(None)`. Never retried: the status sweep polls
    /// again on its own cadence.
    pub async fn workflow_phase(
        &self,
        job_id: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        let url = format!("{}/{}", self.config.workflows_url(), job_id);
        let response = self
            .request_with(Method::GET, &url, None, RetryBudget::none())
            .await?;
        if !response.is_success() {
            return Ok(None);
        }
        let body = response.json()?;
        Ok(body
            .pointer("/status/phase")
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Terminates a running workflow.
    pub async fn terminate(
        &self,
        job_id: &str,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let url = format!("{}/{}/terminate", self.config.workflows_url(), job_id);
        self.request(Method::PUT, &url, None).await
    }

    /// Executes one request under the configured retry budget.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        self.request_with(method, url, body, self.config.retry).await
    }

    /// Executes one request under an explicit retry budget.
    ///
    /// Backoff doubles from `base_delay` until the accumulated wait would
    /// exceed `max_wait`; the loop then stops and the last failing response
    /// is returned. Transport failures that outlive the budget surface as
    /// [`OrchestratorError::Transport`].
    async fn request_with(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        budget: RetryBudget,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let RetryBudget {
            max_wait,
            base_delay,
        } = budget;
        let mut waited = Duration::ZERO;
        let mut delay = base_delay;
        let mut attempt = 1u32;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), url)
                .header("Authorization", &self.config.token)
                .header("Content-Type", "application/json");
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            let outcome = match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let reason = response
                        .status()
                        .canonical_reason()
                        .unwrap_or("Unknown")
                        .to_string();
                    let body = response.text().await.unwrap_or_default();
                    let response = OrchestratorResponse {
                        status,
                        reason,
                        body,
                    };
                    if response.is_success() {
                        debug!(%url, status, "Orchestrator request succeeded");
                        return Ok(response);
                    }
                    Ok(response)
                }
                Err(e) => Err(OrchestratorError::Transport(e.to_string())),
            };

            if waited + delay > max_wait {
                return match outcome {
                    Ok(response) => {
                        warn!(
                            %url,
                            status = response.status,
                            attempt,
                            "Orchestrator request failed, retry budget exhausted"
                        );
                        Ok(response)
                    }
                    Err(e) => Err(e),
                };
            }

            match &outcome {
                Ok(response) => warn!(
                    %url,
                    status = response.status,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "Orchestrator request failed, retrying"
                ),
                Err(e) => warn!(
                    %url,
                    error = %e,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "Orchestrator request failed, retrying"
                ),
            }

            tokio::time::sleep(delay).await;
            waited += delay;
            delay *= 2;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryBudget;

    fn config(base_url: &str) -> OrchestratorConfig {
        OrchestratorConfig {
            base_url: base_url.to_string(),
            token: "Bearer test".to_string(),
            namespace: "ml".to_string(),
            catalog_label: "prodsight".to_string(),
            retry: RetryBudget::none(),
        }
    }

    #[test]
    fn test_response_success_range() {
        let ok = OrchestratorResponse {
            status: 201,
            reason: "Created".to_string(),
            body: String::new(),
        };
        assert!(ok.is_success());
        let not_found = OrchestratorResponse {
            status: 404,
            reason: "Not Found".to_string(),
            body: String::new(),
        };
        assert!(!not_found.is_success());
    }

    #[test]
    fn test_response_json() {
        let response = OrchestratorResponse {
            status: 200,
            reason: "OK".to_string(),
            body: r#"{"metadata": {"name": "dag-x-abcde"}}"#.to_string(),
        };
        let body = response.json().unwrap();
        assert_eq!(body["metadata"]["name"], "dag-x-abcde");

        let garbage = OrchestratorResponse {
            status: 200,
            reason: "OK".to_string(),
            body: "not json".to_string(),
        };
        assert!(garbage.json().is_err());
    }

    #[tokio::test]
    async fn test_transport_failure_without_budget() {
        // Port 9 is discard; nothing listens there in the test environment.
        let client = OrchestratorClient::new(config("http://127.0.0.1:9"));
        let err = client.get_template("dag-x").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Transport(_)));
    }

    #[tokio::test]
    async fn test_template_and_phase_lookups_never_retry() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.retry = RetryBudget::standard();
        let client = OrchestratorClient::new(cfg);

        // Under the standard budget these would block for minutes if they
        // retried; both must return after a single attempt.
        let started = std::time::Instant::now();
        let err = client.get_template("dag-x").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Transport(_)));
        let err = client.workflow_phase("dag-x-abcde").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
