//! Directory listing engines.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fs::SandboxFs;
use crate::tools::{ExecResult, ExecutionEngine};
use crate::types::{SizedEntry, SortBy};

use super::{fs_failure, invalid_params};

/// Engine for a flat, name-sorted listing.
pub struct ListDirectoryEngine {
    fs: Arc<SandboxFs>,
}

impl ListDirectoryEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

#[async_trait]
impl ExecutionEngine for ListDirectoryEngine {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List a directory; entries are prefixed [DIR] or [FILE]"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.list_directory")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: PathParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.list_directory(&p.path).await {
            Ok(entries) => {
                let lines: Vec<String> = entries.iter().map(|e| e.listing_line()).collect();
                Ok(ExecResult::success(lines.join("\n")))
            }
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

/// Engine for a listing with sizes and a summary footer.
pub struct ListDirectoryWithSizesEngine {
    fs: Arc<SandboxFs>,
}

impl ListDirectoryWithSizesEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct SizedParams {
    path: String,
    #[serde(default, alias = "sortBy")]
    sort_by: SortBy,
}

#[async_trait]
impl ExecutionEngine for ListDirectoryWithSizesEngine {
    fn name(&self) -> &str {
        "list_directory_with_sizes"
    }

    fn description(&self) -> &str {
        "List a directory with file sizes, sorted by name or by size"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" },
                "sort_by": {
                    "type": "string",
                    "enum": ["name", "size"],
                    "description": "Sort order (default: name; size is largest first)",
                    "default": "name"
                }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.list_directory_with_sizes")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: SizedParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.list_directory_with_sizes(&p.path, p.sort_by).await {
            Ok(entries) => Ok(ExecResult::success(render_sized(&entries))),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

fn render_sized(entries: &[SizedEntry]) -> String {
    let mut out = String::new();
    let (mut files, mut dirs, mut total) = (0usize, 0usize, 0u64);
    for entry in entries {
        if entry.kind.is_dir() {
            dirs += 1;
            out.push_str(&format!("[DIR]  {}\n", entry.name));
        } else {
            files += 1;
            total += entry.size_bytes;
            out.push_str(&format!(
                "[FILE] {:<30} {:>10}\n",
                entry.name,
                format_size(entry.size_bytes)
            ));
        }
    }
    out.push_str(&format!(
        "\nTotal: {files} files, {dirs} directories\nCombined size: {}",
        format_size(total)
    ));
    out
}

/// Human-readable byte count: `512 B`, `1.50 KB`, `2.00 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Engine for the recursive JSON tree.
pub struct DirectoryTreeEngine {
    fs: Arc<SandboxFs>,
}

impl DirectoryTreeEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct TreeParams {
    path: String,
    #[serde(default, alias = "excludePatterns")]
    exclude_patterns: Vec<String>,
}

#[async_trait]
impl ExecutionEngine for DirectoryTreeEngine {
    fn name(&self) -> &str {
        "directory_tree"
    }

    fn description(&self) -> &str {
        "Recursive JSON tree of a directory; each node has name, type, and children for directories"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to walk" },
                "exclude_patterns": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Names or glob patterns to leave out"
                }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.directory_tree")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: TreeParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.directory_tree(&p.path, &p.exclude_patterns).await {
            Ok(tree) => ExecResult::json(&tree),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}
