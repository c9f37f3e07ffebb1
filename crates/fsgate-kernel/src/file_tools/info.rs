//! Metadata engines: file info, allowed roots, cache statistics.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fs::SandboxFs;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{fs_failure, invalid_params};

/// Engine for file metadata.
pub struct GetFileInfoEngine {
    fs: Arc<SandboxFs>,
}

impl GetFileInfoEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

#[async_trait]
impl ExecutionEngine for GetFileInfoEngine {
    fn name(&self) -> &str {
        "get_file_info"
    }

    fn description(&self) -> &str {
        "Size, timestamps, type, and permissions of a file or directory"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File or directory" }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.get_file_info")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: PathParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.get_file_info(&p.path).await {
            Ok(info) => Ok(ExecResult::success(info.to_lines())),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

/// Engine listing the sandbox roots.
pub struct ListAllowedDirectoriesEngine {
    fs: Arc<SandboxFs>,
}

impl ListAllowedDirectoriesEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ExecutionEngine for ListAllowedDirectoriesEngine {
    fn name(&self) -> &str {
        "list_allowed_directories"
    }

    fn description(&self) -> &str {
        "List the directories this server may access"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "type": "object", "properties": {} }))
    }

    async fn execute(&self, _params: &str) -> anyhow::Result<ExecResult> {
        let roots: Vec<String> = self
            .fs
            .list_allowed_directories()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Ok(ExecResult::success(format!(
            "Allowed directories:\n{}",
            roots.join("\n")
        )))
    }
}

/// Engine reporting content cache counters.
pub struct CacheStatsEngine {
    fs: Arc<SandboxFs>,
}

impl CacheStatsEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ExecutionEngine for CacheStatsEngine {
    fn name(&self) -> &str {
        "cache_stats"
    }

    fn description(&self) -> &str {
        "Content cache hits, misses, evictions, and current size"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "type": "object", "properties": {} }))
    }

    async fn execute(&self, _params: &str) -> anyhow::Result<ExecResult> {
        ExecResult::json(&self.fs.cache_stats())
    }
}
