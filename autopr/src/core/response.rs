//! Deterministic parsing of generated text into stage outputs.
//!
//! Models are asked for JSON but routinely wrap it in code fences or prose, so
//! every parser here first locates the JSON object and, where a stage allows
//! it, falls back to a plain-text reading.

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::types::{PullRequestContent, ReviewResult};

/// Sentinel a reviewer emits in plain text when nothing needs changing.
pub const NO_IMPROVEMENTS: &str = "NO_IMPROVEMENTS";

/// GitHub rejects longer pull request titles.
const MAX_TITLE_CHARS: usize = 256;

/// One whole-file write requested by the implementer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

/// Parsed implementer response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditSet {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub files: Vec<FileEdit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Improvements {
    List(Vec<String>),
    Single(String),
}

#[derive(Deserialize)]
struct ReviewJson {
    #[serde(default)]
    approved: Option<bool>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    improvements: Option<Improvements>,
}

impl ReviewJson {
    /// Stray `{}` in prose should not read as a clean verdict.
    fn is_verdict(&self) -> bool {
        self.approved.is_some() || self.summary.is_some() || self.improvements.is_some()
    }
}

#[derive(Deserialize)]
struct PullRequestJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

/// Locate and deserialize the first JSON object in `text`.
///
/// Tries, in order: the whole text, the body of the first code fence, and the
/// span between the first `{` and the last `}`.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    if let Some(fenced) = fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str(fenced.trim())
    {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the info string (e.g. `json`) on the fence line.
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Parse the implementer's edit set. Plain text is not accepted.
pub fn parse_edit_set(text: &str) -> Result<EditSet> {
    extract_json::<EditSet>(text)
        .ok_or_else(|| anyhow!("response did not contain a JSON edit set"))
}

/// Parse the reviewer's verdict.
///
/// `has_improvements` is true iff at least one non-blank improvement is
/// listed. Plain text is accepted: it is clean if it contains
/// [`NO_IMPROVEMENTS`], otherwise the whole text is the improvement request.
pub fn parse_review(text: &str) -> Result<ReviewResult> {
    if let Some(review) = extract_json::<ReviewJson>(text).filter(ReviewJson::is_verdict) {
        let improvements: Vec<String> = match review.improvements {
            Some(Improvements::List(items)) => items,
            Some(Improvements::Single(item)) => vec![item],
            None => Vec::new(),
        }
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
        return Ok(ReviewResult {
            has_improvements: !improvements.is_empty(),
            summary: review.summary.unwrap_or_default().trim().to_string(),
            improvements,
        });
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("review response was empty");
    }
    if trimmed.contains(NO_IMPROVEMENTS) {
        return Ok(ReviewResult {
            has_improvements: false,
            summary: trimmed.replace(NO_IMPROVEMENTS, "").trim().to_string(),
            improvements: Vec::new(),
        });
    }
    Ok(ReviewResult {
        has_improvements: true,
        summary: String::new(),
        improvements: vec![trimmed.to_string()],
    })
}

/// Parse pull request title and body.
///
/// Plain text falls back to the first non-empty line (without `#` or a
/// `Title:` label) as title and the remainder as body.
pub fn parse_pull_request(text: &str) -> Result<PullRequestContent> {
    let (title, body) = match extract_json::<PullRequestJson>(text) {
        Some(pr) => (pr.title, pr.body),
        None => split_title_body(text),
    };
    let title = clean_title(&title);
    if title.is_empty() {
        bail!("pull request response had no title");
    }
    Ok(PullRequestContent {
        title,
        body: body.trim().to_string(),
    })
}

fn split_title_body(text: &str) -> (String, String) {
    let mut lines = text.trim().lines();
    let title = lines
        .by_ref()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();
    let body = lines.collect::<Vec<_>>().join("\n");
    (title, body)
}

fn clean_title(raw: &str) -> String {
    let mut title = raw.trim().trim_start_matches('#').trim();
    if let Some(label) = title.get(..6)
        && label.eq_ignore_ascii_case("title:")
    {
        title = title[6..].trim();
    }
    let title = title.trim_matches(|c| matches!(c, '`' | '"' | '*'));
    title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_code_fence() {
        let text = "Here you go:\n```json\n{\"summary\":\"s\",\"files\":[]}\n```\nDone.";
        let edits = parse_edit_set(text).expect("parse");
        assert_eq!(edits.summary, "s");
        assert!(edits.files.is_empty());
    }

    #[test]
    fn extracts_json_surrounded_by_prose() {
        let text = "Sure! {\"summary\":\"add fn\",\"files\":[{\"path\":\"src/lib.rs\",\"content\":\"fn a() {}\"}]} hope it helps";
        let edits = parse_edit_set(text).expect("parse");
        assert_eq!(edits.files.len(), 1);
        assert_eq!(edits.files[0].path, "src/lib.rs");
        assert_eq!(edits.files[0].content, "fn a() {}");
    }

    #[test]
    fn edit_set_requires_json() {
        let err = parse_edit_set("I changed some files.").unwrap_err();
        assert!(err.to_string().contains("JSON edit set"));
    }

    #[test]
    fn review_with_improvements_list() {
        let review = parse_review(
            r#"{"approved": false, "summary": "mostly fine", "improvements": ["add tests", "  "]}"#,
        )
        .expect("parse");
        assert!(review.has_improvements);
        assert_eq!(review.improvements, vec!["add tests".to_string()]);
        assert_eq!(review.summary, "mostly fine");
    }

    #[test]
    fn review_with_empty_improvements_is_clean() {
        let review =
            parse_review(r#"{"approved": true, "summary": "lgtm", "improvements": []}"#)
                .expect("parse");
        assert!(!review.has_improvements);
    }

    #[test]
    fn review_accepts_single_improvement_string() {
        let review = parse_review(r#"{"improvements": "rename x"}"#).expect("parse");
        assert_eq!(review.improvements, vec!["rename x".to_string()]);
    }

    #[test]
    fn plain_text_review_uses_sentinel() {
        let clean = parse_review("Looks good. NO_IMPROVEMENTS").expect("parse");
        assert!(!clean.has_improvements);
        assert_eq!(clean.summary, "Looks good.");

        let dirty = parse_review("Handle the None case in parse().").expect("parse");
        assert!(dirty.has_improvements);
        assert_eq!(dirty.improvements.len(), 1);
    }

    #[test]
    fn stray_braces_in_prose_are_not_a_verdict() {
        let review = parse_review("Replace `impl Foo {}` with a derive.").expect("parse");
        assert!(review.has_improvements);
    }

    #[test]
    fn empty_review_is_an_error() {
        assert!(parse_review("   ").is_err());
    }

    #[test]
    fn pull_request_from_json() {
        let pr = parse_pull_request(r#"{"title": "Add health endpoint", "body": "Adds /health."}"#)
            .expect("parse");
        assert_eq!(pr.title, "Add health endpoint");
        assert_eq!(pr.body, "Adds /health.");
    }

    #[test]
    fn pull_request_from_markdown() {
        let pr = parse_pull_request("\n# Title: Add health endpoint\n\n## Summary\nAdds /health.\n")
            .expect("parse");
        assert_eq!(pr.title, "Add health endpoint");
        assert_eq!(pr.body, "## Summary\nAdds /health.");
    }

    #[test]
    fn pull_request_without_title_is_an_error() {
        assert!(parse_pull_request(r#"{"title": "", "body": "x"}"#).is_err());
    }
}
