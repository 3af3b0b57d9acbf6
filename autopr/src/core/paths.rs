//! Validation of model-supplied file paths.

use anyhow::{Result, bail};

/// Normalize a model-supplied path to a `/`-separated path relative to the
/// working copy root.
///
/// Rejects empty, absolute and drive-prefixed paths, any `..` component, and
/// anything inside `.git`.
pub fn normalize_edit_path(raw: &str) -> Result<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        bail!("empty file path");
    }
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        bail!("absolute path '{raw}' is not allowed");
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => bail!("path '{raw}' escapes the working copy"),
            ".git" => bail!("path '{raw}' points into .git"),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        bail!("path '{raw}' does not name a file");
    }
    Ok(parts.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(normalize_edit_path("./src//lib.rs").unwrap(), "src/lib.rs");
        assert_eq!(normalize_edit_path("src\\main.rs").unwrap(), "src/main.rs");
        assert_eq!(normalize_edit_path(" README.md ").unwrap(), "README.md");
    }

    #[test]
    fn rejects_escapes_and_absolute_paths() {
        for bad in ["", "/etc/passwd", "C:/x", "../x", "src/../../x", ".git/config", "./."] {
            assert!(normalize_edit_path(bad).is_err(), "accepted {bad:?}");
        }
    }
}
