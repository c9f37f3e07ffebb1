//! Line-aware text patching with unified diff output.
//!
//! Edits apply in order against the in-memory content. Each edit first tries
//! an exact substring match; failing that, it slides a window of the old
//! text's line count over the content and accepts the first window whose
//! lines match after trimming. If any edit finds nothing the whole batch is
//! rejected and the file is left untouched.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::atomic::write_atomic;
use crate::error::{FsError, FsResult};
use crate::guard::ResolvedPath;

/// One text substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEdit {
    /// Text to find.
    #[serde(alias = "oldText")]
    pub old_text: String,
    /// Replacement text.
    #[serde(alias = "newText")]
    pub new_text: String,
}

impl PatchEdit {
    pub fn new(old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self {
            old_text: old_text.into(),
            new_text: new_text.into(),
        }
    }
}

/// How an edit located its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMatch {
    /// Exact substring, first occurrence.
    Exact,
    /// Whitespace-insensitive line window starting at this 1-based line.
    Fuzzy { line: usize },
}

/// Result of applying a batch of edits in memory.
#[derive(Debug, Clone)]
pub struct Patched {
    pub content: String,
    pub matches: Vec<EditMatch>,
}

/// Result of [`PatchEngine::apply`].
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// Fenced unified diff.
    pub diff: String,
    /// Whether the file was written.
    pub written: bool,
    pub matches: Vec<EditMatch>,
}

/// Applies edit batches to files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatchEngine;

impl PatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply `edits` to the file at `path`.
    ///
    /// `label` is the caller's name for the file and is what appears in the
    /// diff header. Nothing is written when `dry_run` is set or when any
    /// edit fails to match.
    pub async fn apply(
        &self,
        path: &ResolvedPath,
        label: &str,
        edits: &[PatchEdit],
        dry_run: bool,
    ) -> FsResult<PatchOutcome> {
        let original = tokio::fs::read_to_string(path.as_path())
            .await
            .map_err(|e| FsError::io(label, e))?;
        let original = normalize_line_endings(&original);

        let patched = apply_edits(&original, edits)?;
        let diff = fence_diff(&unified_diff(&original, &patched.content, label));

        let written = !dry_run;
        if written {
            write_atomic(path.as_path(), patched.content.as_bytes())
                .await
                .map_err(|e| FsError::io(label, e))?;
        }

        tracing::debug!(
            path = %path.as_path().display(),
            edits = edits.len(),
            dry_run,
            "applied edits"
        );

        Ok(PatchOutcome {
            diff,
            written,
            matches: patched.matches,
        })
    }
}

/// Apply `edits` in order to `content`.
///
/// Fails with `PatchNoMatch` naming the first edit that matched nothing.
pub fn apply_edits(content: &str, edits: &[PatchEdit]) -> FsResult<Patched> {
    let mut current = normalize_line_endings(content);
    let mut matches = Vec::with_capacity(edits.len());

    for (index, edit) in edits.iter().enumerate() {
        if edit.old_text.is_empty() {
            return Err(FsError::invalid_argument(format!(
                "edit {index} has empty old_text"
            )));
        }
        let old = normalize_line_endings(&edit.old_text);
        let new = normalize_line_endings(&edit.new_text);

        let Some((next, how)) = apply_one(&current, &old, &new) else {
            return Err(FsError::PatchNoMatch {
                edit_index: index,
                old_text: edit.old_text.clone(),
            });
        };
        current = next;
        matches.push(how);
    }

    Ok(Patched {
        content: current,
        matches,
    })
}

fn apply_one(content: &str, old: &str, new: &str) -> Option<(String, EditMatch)> {
    if let Some(pos) = content.find(old) {
        let mut out = String::with_capacity(content.len() - old.len() + new.len());
        out.push_str(&content[..pos]);
        out.push_str(new);
        out.push_str(&content[pos + old.len()..]);
        return Some((out, EditMatch::Exact));
    }
    fuzzy_replace(content, old, new).map(|(out, line)| (out, EditMatch::Fuzzy { line }))
}

fn fuzzy_replace(content: &str, old: &str, new: &str) -> Option<(String, usize)> {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let content_lines: Vec<&str> = content.split('\n').collect();
    if old_lines.len() > content_lines.len() {
        return None;
    }

    let start = (0..=content_lines.len() - old_lines.len()).find(|&i| {
        old_lines
            .iter()
            .zip(&content_lines[i..])
            .all(|(o, c)| o.trim() == c.trim())
    })?;

    let base_indent = leading_whitespace(content_lines[start]);
    let replacement: Vec<String> = new
        .split('\n')
        .enumerate()
        .map(|(j, line)| {
            if j == 0 {
                return format!("{base_indent}{}", line.trim_start());
            }
            let old_indent = old_lines.get(j).map_or("", |l| leading_whitespace(l));
            let new_indent = leading_whitespace(line);
            if old_indent.is_empty() || new_indent.is_empty() {
                return line.to_string();
            }
            let extra = new_indent.len().saturating_sub(old_indent.len());
            format!("{base_indent}{}{}", " ".repeat(extra), line.trim_start())
        })
        .collect();

    let mut lines: Vec<&str> = Vec::with_capacity(content_lines.len() + replacement.len());
    lines.extend_from_slice(&content_lines[..start]);
    lines.extend(replacement.iter().map(String::as_str));
    lines.extend_from_slice(&content_lines[start + old_lines.len()..]);

    Some((lines.join("\n"), start + 1))
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Convert CRLF line endings to LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Unified diff between two versions, both sides labelled with `label`.
pub fn unified_diff(original: &str, modified: &str, label: &str) -> String {
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(3)
        .header(&format!("{label}\toriginal"), &format!("{label}\tmodified"))
        .to_string()
}

/// Wrap a diff in a backtick fence longer than any backtick run inside it.
pub fn fence_diff(diff: &str) -> String {
    let mut ticks = 3;
    while diff.contains(&"`".repeat(ticks)) {
        ticks += 1;
    }
    let fence = "`".repeat(ticks);
    format!("{fence}diff\n{diff}{fence}\n\n")
}
