//! Bounded snapshot of a working copy for the analysis and review prompts.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use tracing::{debug, instrument, warn};

use crate::io::edits::resolve_in_working_copy;

/// Build and dependency directories skipped even when no ignore file lists them.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "dist", "build", "vendor"];

/// Extensions treated as binary without reading the file.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "bmp", "pdf", "zip", "gz", "tgz", "tar", "jar",
    "class", "so", "dylib", "dll", "exe", "bin", "o", "a", "rlib", "wasm", "woff", "woff2", "ttf",
    "otf", "mp3", "mp4", "mov",
];

/// Files worth showing even when no task keyword matches them.
const ORIENTATION_FILES: &[&str] = &[
    "readme.md",
    "cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "add", "make", "use", "should",
    "when", "all", "new", "can", "are", "not", "but", "have", "has", "will", "our", "your",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLimits {
    /// Listed paths; the rest are summarized as a count.
    pub max_files: usize,
    /// Per-excerpt cap.
    pub max_file_bytes: usize,
    /// Total bytes across all excerpts.
    pub budget_bytes: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_files: 200,
            max_file_bytes: 8_000,
            budget_bytes: 40_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

/// File listing plus the excerpts most related to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodebaseSnapshot {
    /// Listed paths, sorted, at most `max_files`.
    pub files: Vec<String>,
    /// Every text file found, including unlisted ones.
    pub total_files: usize,
    pub excerpts: Vec<Excerpt>,
}

impl CodebaseSnapshot {
    /// Markdown rendering used inside prompts.
    pub fn render(&self) -> String {
        let mut out = format!("## Repository files ({} total)\n\n", self.total_files);
        if self.files.is_empty() {
            out.push_str("(no files)\n");
        }
        for path in &self.files {
            out.push_str("- ");
            out.push_str(path);
            out.push('\n');
        }
        let unlisted = self.total_files.saturating_sub(self.files.len());
        if unlisted > 0 {
            out.push_str(&format!("- ... and {unlisted} more\n"));
        }
        if !self.excerpts.is_empty() {
            out.push_str("\n## Relevant excerpts\n");
            for excerpt in &self.excerpts {
                out.push_str(&render_excerpt(excerpt));
            }
        }
        out
    }
}

fn render_excerpt(excerpt: &Excerpt) -> String {
    let mut out = format!("\n### {}\n\n```\n{}", excerpt.path, excerpt.content);
    if !excerpt.content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");
    if excerpt.truncated {
        out.push_str("[truncated]\n");
    }
    out
}

/// Walk `root` and collect a bounded snapshot ranked against `task`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn snapshot(root: &Path, task: &str, limits: SnapshotLimits) -> Result<CodebaseSnapshot> {
    let mut all = list_files(root);
    all.sort();

    let keywords = task_keywords(task);
    let mut ranked: Vec<(usize, &String)> = all
        .iter()
        .map(|path| (relevance(path, &keywords), path))
        .filter(|(score, _)| *score > 0)
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut excerpts = Vec::new();
    let mut remaining = limits.budget_bytes;
    for (_, path) in ranked {
        if remaining == 0 {
            break;
        }
        let cap = limits.max_file_bytes.min(remaining);
        let Some(excerpt) = read_excerpt(root, path, cap)? else {
            continue;
        };
        remaining = remaining.saturating_sub(excerpt.content.len());
        excerpts.push(excerpt);
    }

    debug!(
        total_files = all.len(),
        excerpts = excerpts.len(),
        keywords = keywords.len(),
        "snapshot collected"
    );
    let total_files = all.len();
    all.truncate(limits.max_files);
    Ok(CodebaseSnapshot {
        files: all,
        total_files,
        excerpts,
    })
}

/// Read at most `max_bytes` of a text file under `root`.
///
/// Returns `None` for missing or binary files, and for paths that leave the
/// working copy or pass through a symlink.
pub fn read_excerpt(root: &Path, rel: &str, max_bytes: usize) -> Result<Option<Excerpt>> {
    let path = match resolve_in_working_copy(root, rel) {
        Ok((_, path)) => path,
        Err(err) => {
            warn!(path = rel, error = %format!("{err:#}"), "excerpt skipped");
            return Ok(None);
        }
    };
    if !path.is_file() {
        return Ok(None);
    }
    let file = fs::File::open(&path).with_context(|| format!("open {rel}"))?;
    let mut bytes = Vec::new();
    file.take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .with_context(|| format!("read {rel}"))?;
    let truncated = bytes.len() > max_bytes;
    bytes.truncate(max_bytes);
    if bytes.contains(&0) {
        return Ok(None);
    }
    let Some(content) = utf8_prefix(&bytes) else {
        return Ok(None);
    };
    Ok(Some(Excerpt {
        path: rel.to_string(),
        content: content.to_string(),
        truncated,
    }))
}

/// Valid UTF-8 prefix, tolerating a character cut at the end.
fn utf8_prefix(bytes: &[u8]) -> Option<&str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&bytes[..e.valid_up_to()]).ok(),
        Err(_) => None,
    }
}

/// Text files under `root` as `/`-separated relative paths.
///
/// Hidden entries and whatever the repository's `.gitignore`/`.git/info/exclude`
/// exclude are skipped. Symlinks are never followed.
fn list_files(root: &Path) -> Vec<String> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .parents(false)
        .follow_links(false)
        .git_ignore(true)
        .git_exclude(true)
        .git_global(false)
        .require_git(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0 || !is_dir || !SKIPPED_DIRS.contains(&&*name)
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !has_binary_extension(&rel) {
            files.push(rel);
        }
    }
    files
}

fn has_binary_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn task_keywords(task: &str) -> BTreeSet<String> {
    task.split(|c: char| !c.is_ascii_alphanumeric())
        .map(str::to_ascii_lowercase)
        .filter(|word| word.len() >= 3 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

fn relevance(path: &str, keywords: &BTreeSet<String>) -> usize {
    let lower = path.to_ascii_lowercase();
    let mut score = keywords
        .iter()
        .filter(|kw| lower.contains(kw.as_str()))
        .count()
        * 2;
    if ORIENTATION_FILES.contains(&lower.as_str()) {
        score += 1;
    }
    score
}
