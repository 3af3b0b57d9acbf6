//! Task-to-pull-request CLI.
//!
//! `autopr run` drives one pipeline run and streams NDJSON progress frames to
//! stdout; diagnostics go to stderr. The listing commands expose the same
//! collaborators the run uses.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use autopr::core::request::TaskRequest;
use autopr::core::types::{ModelAssignment, RepoId, StageRole};
use autopr::exit_codes;
use autopr::io::config::{AppConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use autopr::io::generation::{ModelCatalog, OllamaClient};
use autopr::io::git::GitRepositoryOps;
use autopr::io::github::{GitHubClient, HostingOps};
use autopr::logging;
use autopr::pipeline::{Orchestrator, RunOutcome};
use autopr::progress::NdjsonWriter;

#[derive(Parser)]
#[command(
    name = "autopr",
    version,
    about = "Turn a task description into a reviewed pull request using local LLM agents"
)]
struct Cli {
    /// Config file; defaults apply if it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file with every default filled in.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the pipeline for one task and stream progress as NDJSON.
    Run {
        /// Target repository, `owner/name`.
        #[arg(long)]
        repo: String,
        /// Branch to clone and to open the pull request against.
        #[arg(long, default_value = "main")]
        base: String,
        /// Natural-language task description.
        #[arg(long)]
        task: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Per-role model override, e.g. `--model implementer=codellama`.
        #[arg(long = "model", value_name = "ROLE=MODEL", value_parser = parse_model_override)]
        models: Vec<(StageRole, String)>,
    },
    /// List models offered by the generation backend.
    Models,
    /// List repositories the token can access.
    Repos {
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// List branches of a repository.
    Branches {
        /// Repository, `owner/name`.
        #[arg(long)]
        repo: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            repo,
            base,
            task,
            token,
            models,
        } => cmd_run(&load_config(&cli.config)?, repo, base, task, token, models),
        Command::Models => cmd_models(&load_config(&cli.config)?),
        Command::Repos { token } => cmd_repos(&load_config(&cli.config)?, token),
        Command::Branches { repo, token } => {
            cmd_branches(&load_config(&cli.config)?, &repo, token)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(path, &AppConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    config: &AppConfig,
    repo: String,
    base: String,
    task: String,
    token: Option<String>,
    overrides: Vec<(StageRole, String)>,
) -> Result<i32> {
    let models = config
        .model_assignment()?
        .merged(&overrides.into_iter().collect::<ModelAssignment>());
    let request = TaskRequest {
        access_token: token.unwrap_or_default(),
        repository: repo,
        base_branch: base,
        task,
        models,
    };

    let generation = OllamaClient::new(&config.ollama.base_url, config.ollama_timeout())?;
    let repository = GitRepositoryOps::new(config.git_settings());
    let hosting = GitHubClient::new(&config.github.api_base_url, config.github_timeout())?;
    let orchestrator = Orchestrator::new(&generation, &repository, &hosting)
        .with_limits(config.snapshot_limits());

    let observer = NdjsonWriter::new(io::stdout().lock());
    match orchestrator.run(&request, observer) {
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::INVALID)
        }
        Ok(report) => match report.outcome {
            RunOutcome::PullRequestCreated(_) => Ok(exit_codes::OK),
            RunOutcome::Aborted { .. } => Ok(exit_codes::ABORTED),
        },
    }
}

fn cmd_models(config: &AppConfig) -> Result<i32> {
    let client = OllamaClient::new(&config.ollama.base_url, config.ollama_timeout())?;
    for model in client.list_models()? {
        println!("{}", model.name);
    }
    Ok(exit_codes::OK)
}

fn cmd_repos(config: &AppConfig, token: Option<String>) -> Result<i32> {
    let token = require_token(token)?;
    let client = GitHubClient::new(&config.github.api_base_url, config.github_timeout())?;
    for repo in client.list_repositories(&token)? {
        println!("{}", repo.full_name);
    }
    Ok(exit_codes::OK)
}

fn cmd_branches(config: &AppConfig, repo: &str, token: Option<String>) -> Result<i32> {
    let token = require_token(token)?;
    let repo: RepoId = repo.parse()?;
    let client = GitHubClient::new(&config.github.api_base_url, config.github_timeout())?;
    for branch in client.list_branches(&token, &repo)? {
        println!("{}", branch.name);
    }
    Ok(exit_codes::OK)
}

fn require_token(token: Option<String>) -> Result<String> {
    token
        .filter(|t| !t.trim().is_empty())
        .context("a GitHub token is required (--token or GITHUB_TOKEN)")
}

fn parse_model_override(raw: &str) -> Result<(StageRole, String)> {
    let (role, model) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected ROLE=MODEL, got '{raw}'"))?;
    let model = model.trim();
    if model.is_empty() {
        return Err(anyhow!("model for '{role}' is empty"));
    }
    Ok((role.trim().parse()?, model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "autopr",
            "run",
            "--repo",
            "octo/app",
            "--task",
            "Fix the login bug",
            "--token",
            "t",
            "--model",
            "developer=codellama",
            "--model",
            "prWriter=llama3",
        ]);
        match cli.command {
            Command::Run {
                repo, base, models, ..
            } => {
                assert_eq!(repo, "octo/app");
                assert_eq!(base, "main");
                assert_eq!(
                    models,
                    vec![
                        (StageRole::Implementer, "codellama".to_string()),
                        (StageRole::PrWriter, "llama3".to_string()),
                    ]
                );
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["autopr", "--config", "x.toml", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn model_override_rejects_malformed_values() {
        assert!(parse_model_override("planner").is_err());
        assert!(parse_model_override("planner=").is_err());
        assert!(parse_model_override("tester=llama3").is_err());
    }

    #[test]
    fn blank_token_is_rejected() {
        assert!(require_token(Some("  ".into())).is_err());
        assert!(require_token(None).is_err());
        assert_eq!(require_token(Some("t".into())).expect("token"), "t");
    }
}
