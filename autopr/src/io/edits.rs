//! Writing implementer edits into a working copy.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::paths::normalize_edit_path;
use crate::core::response::FileEdit;
use crate::core::types::{ChangeAction, FileChange};

/// Resolve a model-supplied path to a location inside `root`.
///
/// On top of [`normalize_edit_path`], no existing component below `root` may
/// be a symlink. Components that do not exist yet are accepted.
pub fn resolve_in_working_copy(root: &Path, raw: &str) -> Result<(String, PathBuf)> {
    let rel = normalize_edit_path(raw)?;
    let mut current = root.to_path_buf();
    for part in rel.split('/') {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                bail!("path '{raw}' goes through a symlink");
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => break,
            Err(e) => return Err(e).with_context(|| format!("stat {}", current.display())),
        }
    }
    let full = root.join(&rel);
    Ok((rel, full))
}

/// Write every edit as a whole file under `root`.
///
/// All paths are checked before anything is written, so a single unsafe path
/// leaves the working copy untouched. A path edited twice is reported once,
/// with the action it had before the first write.
#[instrument(skip_all, fields(root = %root.display(), edits = edits.len()))]
pub fn apply_edits(root: &Path, edits: &[FileEdit]) -> Result<Vec<FileChange>> {
    let normalized = edits
        .iter()
        .map(|edit| resolve_in_working_copy(root, &edit.path).map(|resolved| (resolved, edit)))
        .collect::<Result<Vec<_>>>()?;

    let mut changes: Vec<FileChange> = Vec::new();
    for ((rel, target), edit) in normalized {
        let action = if target.exists() {
            ChangeAction::Modified
        } else {
            ChangeAction::Created
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&target, &edit.content).with_context(|| format!("write {rel}"))?;
        debug!(path = %rel, ?action, bytes = edit.content.len(), "applied edit");

        if !changes.iter().any(|c| c.path == rel) {
            changes.push(FileChange { path: rel, action });
        }
    }
    Ok(changes)
}
