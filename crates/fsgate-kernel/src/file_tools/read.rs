//! Read engines: whole-file text (with head/tail windows), media payloads,
//! and concurrent multi-file reads.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fs::SandboxFs;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{fs_failure, invalid_params};

/// Engine for reading a file as text.
pub struct ReadTextFileEngine {
    fs: Arc<SandboxFs>,
}

impl ReadTextFileEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct ReadTextParams {
    path: String,
    head: Option<usize>,
    tail: Option<usize>,
}

#[async_trait]
impl ExecutionEngine for ReadTextFileEngine {
    fn name(&self) -> &str {
        "read_text_file"
    }

    fn description(&self) -> &str {
        "Read a file as text, optionally only its first or last N lines"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to read"
                },
                "head": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Return only the first N lines"
                },
                "tail": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Return only the last N lines"
                }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.read_text_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: ReadTextParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.read_text_file(&p.path, p.head, p.tail).await {
            Ok(text) => Ok(ExecResult::success(text)),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

/// Engine for reading images, audio, and other binaries as base64.
pub struct ReadMediaFileEngine {
    fs: Arc<SandboxFs>,
}

impl ReadMediaFileEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

#[async_trait]
impl ExecutionEngine for ReadMediaFileEngine {
    fn name(&self) -> &str {
        "read_media_file"
    }

    fn description(&self) -> &str {
        "Read an image or audio file as base64 with its MIME type"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to read" }
            },
            "required": ["path"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.read_media_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: PathParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        match self.fs.read_media_file(&p.path).await {
            Ok(media) => ExecResult::json(&media),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}

/// Engine for reading several files at once.
pub struct ReadMultipleFilesEngine {
    fs: Arc<SandboxFs>,
}

impl ReadMultipleFilesEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct ReadMultipleParams {
    paths: Vec<String>,
}

#[async_trait]
impl ExecutionEngine for ReadMultipleFilesEngine {
    fn name(&self) -> &str {
        "read_multiple_files"
    }

    fn description(&self) -> &str {
        "Read several files concurrently; a failed read does not stop the others"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "File paths to read"
                }
            },
            "required": ["paths"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.read_multiple_files")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: ReadMultipleParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        let sections: Vec<String> = self
            .fs
            .read_multiple_files(&p.paths)
            .await
            .into_iter()
            .map(|(path, result)| match result {
                Ok(text) => format!("{path}:\n{text}\n"),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e.log_message(), "read failed");
                    format!("{path}: Error - {}", e.user_message())
                }
            })
            .collect();

        Ok(ExecResult::success(sections.join("\n---\n")))
    }
}
