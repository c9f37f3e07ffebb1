//! SearchFilesEngine: case-insensitive name search.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::fs::SandboxFs;
use crate::tools::{ExecResult, ExecutionEngine};

use super::{fs_failure, invalid_params};

/// Engine for recursive name search.
pub struct SearchFilesEngine {
    fs: Arc<SandboxFs>,
}

impl SearchFilesEngine {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    path: String,
    pattern: String,
    #[serde(default, alias = "excludePatterns")]
    exclude_patterns: Vec<String>,
}

#[async_trait]
impl ExecutionEngine for SearchFilesEngine {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Recursively find files and directories whose names contain a pattern (case-insensitive)"
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to search from"
                },
                "pattern": {
                    "type": "string",
                    "description": "Substring to look for in entry names"
                },
                "exclude_patterns": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Names or glob patterns to skip, e.g. node_modules or *.log"
                }
            },
            "required": ["path", "pattern"]
        }))
    }

    #[tracing::instrument(skip(self, params), name = "engine.search_files")]
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult> {
        let p: SearchParams = match serde_json::from_str(params) {
            Ok(v) => v,
            Err(e) => return Ok(invalid_params(e)),
        };

        let outcome = match self
            .fs
            .search_files(&p.path, &p.pattern, &p.exclude_patterns)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Ok(fs_failure(self.name(), e)),
        };

        let mut out = if outcome.matches.is_empty() {
            "No matches found".to_string()
        } else {
            outcome
                .matches
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n")
        };
        if outcome.timed_out {
            out.push_str("\n(search timed out; results are partial)");
        } else if outcome.truncated {
            out.push_str(&format!(
                "\n(stopped after {} results)",
                outcome.matches.len()
            ));
        }
        Ok(ExecResult::success(out))
    }
}
