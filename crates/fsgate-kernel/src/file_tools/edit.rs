//! EditFileEngine: batched text replacement with a diff preview.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fs::SandboxFs;
use crate::patch::PatchEdit;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{fs_failure, invalid_params};

/// Engine for applying a list of edits to one file.
pub struct EditFileEngine {
    fs: Arc<SandboxFs>,
}

impl EditFileEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct EditParams {
    path: String,
    edits: Vec<PatchEdit>,
    #[serde(default, alias = "dryRun")]
    dry_run: bool,
}

#[async_trait]
impl ExecutionEngine for EditFileEngine {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Apply text replacements to a file and return a unified diff; all edits apply or none do"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to edit"
                },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_text": {
                                "type": "string",
                                "description": "Text to find; matched exactly, then line-by-line ignoring surrounding whitespace"
                            },
                            "new_text": {
                                "type": "string",
                                "description": "Replacement text"
                            }
                        },
                        "required": ["old_text", "new_text"]
                    }
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Preview the diff without writing (default: false)",
                    "default": false
                }
            },
            "required": ["path", "edits"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.edit_file")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: EditParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        if p.edits.is_empty() {
            return Ok(ExecResult::failure(1, "edits must not be empty"));
        }

        match self.fs.edit_file(&p.path, &p.edits, p.dry_run).await {
            Ok(outcome) => Ok(ExecResult::success(outcome.diff)),
            Err(e) => Ok(fs_failure(self.name(), e)),
        }
    }
}
