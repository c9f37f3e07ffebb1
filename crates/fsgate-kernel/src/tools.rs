//! Tool registry and execution engines.
//!
//! Each filesystem operation is exposed as an engine that takes JSON
//! parameters and produces an [`ExecResult`]. Hosts look engines up by tool
//! name in a [`ToolRegistry`].

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Information about a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Tool category (e.g., "read", "write", "search").
    pub category: String,
}

impl ToolInfo {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Result of running a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    /// Output for the caller.
    pub stdout: String,
    /// User-safe failure message.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
    pub success: bool,
}

impl ExecResult {
    /// Create a successful result.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }

    /// Successful result carrying pretty-printed JSON.
    pub fn json<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::success(serde_json::to_string_pretty(value)?))
    }
}

/// Trait for execution engines.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Get the engine name.
    fn name(&self) -> &str;

    /// Get the engine description.
    fn description(&self) -> &str;

    /// Run with JSON-encoded parameters.
    async fn execute(&self, params: &str) -> anyhow::Result<ExecResult>;

    /// Check if this engine is available/ready.
    async fn is_available(&self) -> bool {
        true
    }

    /// JSON Schema for the engine's parameters.
    fn schema(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Registry of tools and their engines, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolInfo>,
    engines: IndexMap<String, Arc<dyn ExecutionEngine>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with its execution engine.
    pub fn register_with_engine(&mut self, info: ToolInfo, engine: Arc<dyn ExecutionEngine>) {
        let name = info.name.clone();
        self.tools.insert(name.clone(), info);
        self.engines.insert(name, engine);
    }

    /// Get the engine registered for a tool.
    pub fn get_engine(&self, name: &str) -> Option<Arc<dyn ExecutionEngine>> {
        self.engines.get(name).cloned()
    }

    /// List all tools in registration order.
    pub fn list(&self) -> Vec<&ToolInfo> {
        self.tools.values().collect()
    }

    /// Tools whose engines report ready, in registration order.
    pub async fn list_available(&self) -> Vec<&ToolInfo> {
        let mut out = Vec::with_capacity(self.tools.len());
        for (name, info) in &self.tools {
            if let Some(engine) = self.engines.get(name) {
                if engine.is_available().await {
                    out.push(info);
                }
            }
        }
        out
    }

    /// Run `tool` with JSON `params`.
    pub async fn execute(&self, tool: &str, params: &str) -> anyhow::Result<ExecResult> {
        let Some(engine) = self.get_engine(tool) else {
            return Ok(ExecResult::failure(127, format!("unknown tool: {tool}")));
        };
        if !engine.is_available().await {
            return Ok(ExecResult::failure(126, format!("tool unavailable: {tool}")));
        }
        engine.execute(params).await
    }
}
