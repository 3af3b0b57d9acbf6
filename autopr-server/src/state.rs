//! Shared application state for the trigger server.

use std::sync::Arc;

use anyhow::Result;

use autopr::core::types::ModelAssignment;
use autopr::io::codebase::SnapshotLimits;
use autopr::io::config::AppConfig;
use autopr::io::generation::{GenerationClient, ModelCatalog, OllamaClient};
use autopr::io::git::{GitRepositoryOps, RepositoryOps};
use autopr::io::github::{GitHubClient, HostingOps};

/// Collaborators shared by every request. All of them are stateless between
/// calls, so concurrent runs share them without locking.
#[derive(Clone)]
pub struct AppState {
    pub generation: Arc<dyn GenerationClient>,
    pub catalog: Arc<dyn ModelCatalog>,
    pub repository: Arc<dyn RepositoryOps>,
    pub hosting: Arc<dyn HostingOps>,
    /// Used for roles a request leaves unassigned.
    pub default_models: ModelAssignment,
    pub limits: SnapshotLimits,
}

impl AppState {
    /// Build the production collaborators.
    ///
    /// The HTTP clients are blocking, so this must run outside the async
    /// runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let ollama = Arc::new(OllamaClient::new(
            &config.ollama.base_url,
            config.ollama_timeout(),
        )?);
        let hosting = GitHubClient::new(&config.github.api_base_url, config.github_timeout())?;
        Ok(Self {
            generation: ollama.clone(),
            catalog: ollama,
            repository: Arc::new(GitRepositoryOps::new(config.git_settings())),
            hosting: Arc::new(hosting),
            default_models: config.model_assignment()?,
            limits: config.snapshot_limits(),
        })
    }
}
