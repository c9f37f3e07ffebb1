//! Recursive directory tree.
//!
//! Built iteratively: nodes go into a flat arena with parent links while the
//! walk runs, then are folded into nested [`TreeNode`]s. Children are always
//! created after their parent, so folding from the back attaches every child
//! before its parent is moved. Siblings enter the arena in reverse name
//! order, which the backwards fold turns into name order.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs;
use tokio::time::Instant;

use crate::error::{FsError, FsResult};
use crate::guard::{PathGuard, ResolvedPath};
use crate::search::{is_dir, ExcludeSet};
use crate::types::{TreeKind, TreeNode};

struct Slot {
    node: Option<TreeNode>,
    parent: Option<usize>,
}

/// Build the tree below `root`, skipping excluded and out-of-sandbox
/// entries. Entries are sorted by name within each directory.
pub async fn directory_tree(
    guard: &PathGuard,
    requested: &str,
    root: &ResolvedPath,
    exclude_patterns: &[String],
    timeout: Duration,
    max_depth: usize,
) -> FsResult<Vec<TreeNode>> {
    let excludes = ExcludeSet::new(exclude_patterns)?;
    let started = Instant::now();
    let base = root.as_path();

    let mut arena: Vec<Slot> = Vec::new();
    let mut visited = HashSet::from([base.to_path_buf()]);
    let mut stack: Vec<(PathBuf, Option<usize>, usize)> = vec![(base.to_path_buf(), None, 0)];

    while let Some((dir, parent, depth)) = stack.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| FsError::io(requested, e))?;

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::io(requested, e))?
        {
            if started.elapsed() >= timeout {
                return Err(FsError::Timeout {
                    requested: requested.to_string(),
                    elapsed_ms: started.elapsed().as_millis(),
                });
            }
            let path = entry.path();
            let relative = path.strip_prefix(base).unwrap_or(&path);
            if excludes.is_excluded(relative) {
                continue;
            }
            let Ok(real) = guard.resolve_path(&path).await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let dir_like = is_dir(&entry, &real).await;
            found.push((name, path, real, dir_like));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, path, real, dir_like) in found.into_iter().rev() {
            let index = arena.len();
            let (kind, children) = if dir_like {
                (TreeKind::Directory, Some(Vec::new()))
            } else {
                (TreeKind::File, None)
            };
            arena.push(Slot {
                node: Some(TreeNode {
                    name,
                    kind,
                    children,
                }),
                parent,
            });
            if dir_like && depth < max_depth && visited.insert(real.into_path_buf()) {
                stack.push((path, Some(index), depth + 1));
            }
        }
    }

    let mut top = Vec::new();
    for index in (0..arena.len()).rev() {
        let Some(node) = arena[index].node.take() else {
            continue;
        };
        match arena[index].parent {
            Some(parent) => {
                if let Some(children) = arena[parent]
                    .node
                    .as_mut()
                    .and_then(|p| p.children.as_mut())
                {
                    children.push(node);
                }
            }
            None => top.push(node),
        }
    }
    Ok(top)
}
