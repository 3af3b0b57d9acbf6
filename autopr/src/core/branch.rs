//! Branch-name normalization for generated text.
//!
//! The branch namer returns free text; this module turns it into a
//! `category/slug` name that git and hosting providers accept.

use std::sync::LazyLock;

use regex::Regex;

/// Category used when the generated text has no `/`.
pub const DEFAULT_CATEGORY: &str = "feature";

/// Soft length guideline passed to the branch namer; not enforced.
pub const BRANCH_NAME_GUIDELINE_LEN: usize = 50;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^branch[\s_-]*name\s*:\s*").expect("valid label regex"));

static VALID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9-]+/[a-z0-9]+(-[a-z0-9]+)*$").expect("valid branch regex")
});

/// Generated text contained nothing usable as a branch slug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("generated branch name '{raw}' has no usable characters")]
pub struct EmptyBranchName {
    pub raw: String,
}

/// Normalize raw generated text into `category/slug`.
///
/// Only the first non-empty line is used. A leading `branch name:` label and
/// surrounding quotes or backticks are dropped, the text is lowercased, every
/// character outside `[a-z0-9]` becomes a hyphen, hyphen runs collapse and
/// segments are trimmed of hyphens. The first segment is the category; any
/// further segments are joined into the slug. Without a `/` the
/// [`DEFAULT_CATEGORY`] is prepended.
///
/// Normalizing an already normalized name returns it unchanged.
pub fn normalize_branch_name(raw: &str) -> Result<String, EmptyBranchName> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let unlabeled = LABEL_RE.replace(line, "");
    let unquoted = unlabeled.trim().trim_matches(|c| matches!(c, '`' | '"' | '\''));
    let lowered = unquoted.to_ascii_lowercase();

    let segments: Vec<String> = lowered
        .split('/')
        .map(slugify)
        .filter(|segment| !segment.is_empty())
        .collect();

    let (category, slug) = match segments.as_slice() {
        [] => {
            return Err(EmptyBranchName {
                raw: raw.to_string(),
            });
        }
        [slug] => (DEFAULT_CATEGORY.to_string(), slug.clone()),
        [category, rest @ ..] => (category.clone(), rest.join("-")),
    };

    Ok(format!("{category}/{slug}"))
}

/// True if `name` is in normalized `category/slug` form.
pub fn is_normalized_branch_name(name: &str) -> bool {
    VALID_RE.is_match(name)
}

fn slugify(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
