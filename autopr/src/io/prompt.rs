//! Prompt templates for the stage agents.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

/// Template names, one per prompt shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Planner,
    BranchNamer,
    Analyzer,
    Implementer,
    Improvements,
    Reviewer,
    PrWriter,
}

impl Template {
    const ALL: [Template; 7] = [
        Template::Planner,
        Template::BranchNamer,
        Template::Analyzer,
        Template::Implementer,
        Template::Improvements,
        Template::Reviewer,
        Template::PrWriter,
    ];

    fn name(self) -> &'static str {
        match self {
            Template::Planner => "planner",
            Template::BranchNamer => "branch_namer",
            Template::Analyzer => "analyzer",
            Template::Implementer => "implementer",
            Template::Improvements => "improvements",
            Template::Reviewer => "reviewer",
            Template::PrWriter => "pr_writer",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Template::Planner => include_str!("prompts/planner.md"),
            Template::BranchNamer => include_str!("prompts/branch_namer.md"),
            Template::Analyzer => include_str!("prompts/analyzer.md"),
            Template::Implementer => include_str!("prompts/implementer.md"),
            Template::Improvements => include_str!("prompts/improvements.md"),
            Template::Reviewer => include_str!("prompts/reviewer.md"),
            Template::PrWriter => include_str!("prompts/pr_writer.md"),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for template in Template::ALL {
            env.add_template(template.name(), template.source())
                .expect("bundled prompt template should be valid");
        }
        Self { env }
    }

    /// Shared engine; templates are compiled once per process.
    pub fn global() -> &'static PromptEngine {
        static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);
        &ENGINE
    }

    pub fn render<C: Serialize>(&self, template: Template, ctx: C) -> Result<String> {
        let rendered = self
            .env
            .get_template(template.name())?
            .render(ctx)
            .with_context(|| format!("render {} prompt", template.name()))?;
        debug!(template = template.name(), bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}
