//! Mutating engines: write, mkdir, move.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fs::SandboxFs;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{fs_failure, invalid_params};

/// Engine for creating or overwriting a file.
pub struct WriteFileEngine {
    fs: Arc<SandboxFs>,
}

impl WriteFileEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

#[async_trait]
impl ExecutionEngine for WriteFileEngine {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create a new file or completely overwrite an existing one"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.write_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: WriteParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.write_file(&p.path, &p.content).await {
            Ok(bytes) => Ok(ExecResult::success(format!(
                "Successfully wrote {} bytes to {}",
                bytes, p.path
            ))),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

/// Engine for `mkdir -p`.
pub struct CreateDirectoryEngine {
    fs: Arc<SandboxFs>,
}

impl CreateDirectoryEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

#[async_trait]
impl ExecutionEngine for CreateDirectoryEngine {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a directory and any missing parents; succeeds if it already exists"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to create" }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.create_directory")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: PathParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.create_directory(&p.path).await {
            Ok(()) => Ok(ExecResult::success(format!(
                "Successfully created directory {}",
                p.path
            ))),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

/// Engine for moving or renaming files and directories.
pub struct MoveFileEngine {
    fs: Arc<SandboxFs>,
}

impl MoveFileEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct MoveParams {
    source: String,
    destination: String,
}

#[async_trait]
impl ExecutionEngine for MoveFileEngine {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory; fails if the destination exists"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "source": { "type": "string", "description": "Existing path" },
                "destination": { "type": "string", "description": "New path (must not exist)" }
            },
            "required": ["source", "destination"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.move_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: MoveParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.move_file(&p.source, &p.destination).await {
            Ok(()) => Ok(ExecResult::success(format!(
                "Successfully moved {} to {}",
                p.source, p.destination
            ))),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}
