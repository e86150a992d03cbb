//! HTTP client for the external workflow orchestrator.

pub mod client;

pub use client::{OrchestratorClient, OrchestratorResponse};
