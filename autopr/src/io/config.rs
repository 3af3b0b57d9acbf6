//! Configuration stored in `autopr.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{ModelAssignment, StageRole};
use crate::io::codebase::SnapshotLimits;
use crate::io::git::GitSettings;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "autopr.toml";

/// Application configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// work against a local Ollama and github.com.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ollama: OllamaConfig,
    pub github: GitHubConfig,
    pub git: GitConfig,
    pub analysis: AnalysisConfig,
    /// Default model per stage role (`planner = "llama3"`, ...).
    pub models: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Per generation request, including generation time.
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base_url: String,
    pub clone_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            clone_base_url: "https://github.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    /// Parent directory for working copies. Defaults to `<tmp>/autopr`.
    pub workspace_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Truncate captured git stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            timeout_secs: 300,
            output_limit_bytes: 100_000,
            author_name: "autopr".to_string(),
            author_email: "autopr@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub budget_bytes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let limits = SnapshotLimits::default();
        Self {
            max_files: limits.max_files,
            max_file_bytes: limits.max_file_bytes,
            budget_bytes: limits.budget_bytes,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ollama.base_url.trim().is_empty() {
            return Err(anyhow!("ollama.base_url must not be empty"));
        }
        if self.ollama.request_timeout_secs == 0 {
            return Err(anyhow!("ollama.request_timeout_secs must be > 0"));
        }
        if self.github.request_timeout_secs == 0 {
            return Err(anyhow!("github.request_timeout_secs must be > 0"));
        }
        if self.git.timeout_secs == 0 {
            return Err(anyhow!("git.timeout_secs must be > 0"));
        }
        if self.git.output_limit_bytes == 0 {
            return Err(anyhow!("git.output_limit_bytes must be > 0"));
        }
        if self.analysis.max_files == 0 || self.analysis.budget_bytes == 0 {
            return Err(anyhow!("analysis.max_files and analysis.budget_bytes must be > 0"));
        }
        for key in self.models.keys() {
            key.parse::<StageRole>()
                .with_context(|| format!("models.{key}"))?;
        }
        Ok(())
    }

    /// Default model assignment from the `[models]` table.
    pub fn model_assignment(&self) -> Result<ModelAssignment> {
        self.models
            .iter()
            .map(|(role, model)| Ok::<_, anyhow::Error>((role.parse::<StageRole>()?, model.clone())))
            .collect()
    }

    pub fn git_settings(&self) -> GitSettings {
        GitSettings {
            workspace_dir: self
                .git
                .workspace_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("autopr")),
            clone_base_url: self.github.clone_base_url.clone(),
            timeout: Duration::from_secs(self.git.timeout_secs),
            output_limit_bytes: self.git.output_limit_bytes,
            author_name: self.git.author_name.clone(),
            author_email: self.git.author_email.clone(),
        }
    }

    pub fn snapshot_limits(&self) -> SnapshotLimits {
        SnapshotLimits {
            max_files: self.analysis.max_files,
            max_file_bytes: self.analysis.max_file_bytes,
            budget_bytes: self.analysis.budget_bytes,
        }
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.request_timeout_secs)
    }

    pub fn github_timeout(&self) -> Duration {
        Duration::from_secs(self.github.request_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autopr.toml");
        let mut cfg = AppConfig::default();
        cfg.models.insert("planner".into(), "llama3".into());
        cfg.git.workspace_dir = Some(temp.path().join("work"));
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autopr.toml");
        fs::write(
            &path,
            "[ollama]\nbase_url = \"http://gpu:11434\"\n\n[models]\nplanner = \"llama3\"\ndeveloper = \"codellama\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.ollama.base_url, "http://gpu:11434");
        assert_eq!(cfg.ollama.request_timeout_secs, 600);
        let models = cfg.model_assignment().expect("models");
        assert_eq!(models.get(StageRole::Implementer), Some("codellama"));
    }

    #[test]
    fn rejects_unknown_roles_and_zero_timeouts() {
        let mut cfg = AppConfig::default();
        cfg.models.insert("tester".into(), "x".into());
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.git.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
