//! Filesystem tools.
//!
//! One engine per [`SandboxFs`] operation. Engines parse JSON params, call
//! into the shared `SandboxFs`, and turn failures into user-safe messages
//! while logging the detailed form.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Host (JSON lines, MCP)         │
//! └────────────────────┬────────────────────┘
//!                      │ tool name + JSON params
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         File Tool Engines               │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  SandboxFs (PathGuard, FileCache, ...)  │
//! └─────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use crate::error::FsError;
use crate::fs::SandboxFs;
use crate::tools::{ExecResult, ExecutionEngine, ToolInfo, ToolRegistry};

pub mod edit;
pub mod info;
pub mod list;
pub mod read;
pub mod search;
pub mod write;

pub use edit::EditFileEngine;
pub use info::{CacheStatsEngine, GetFileInfoEngine, ListAllowedDirectoriesEngine};
pub use list::{DirectoryTreeEngine, ListDirectoryEngine, ListDirectoryWithSizesEngine};
pub use read::{ReadMediaFileEngine, ReadMultipleFilesEngine, ReadTextFileEngine};
pub use search::SearchFilesEngine;
pub use write::{CreateDirectoryEngine, MoveFileEngine, WriteFileEngine};

/// Register every filesystem tool against a shared [`SandboxFs`].
pub fn register_file_tools(registry: &mut ToolRegistry, fs: Arc<SandboxFs>) {
    let engines: [(&str, Arc<dyn ExecutionEngine>); 14] = [
        ("read", Arc::new(ReadTextFileEngine::new(fs.clone()))),
        ("read", Arc::new(ReadMediaFileEngine::new(fs.clone()))),
        ("read", Arc::new(ReadMultipleFilesEngine::new(fs.clone()))),
        ("write", Arc::new(WriteFileEngine::new(fs.clone()))),
        ("write", Arc::new(EditFileEngine::new(fs.clone()))),
        ("write", Arc::new(CreateDirectoryEngine::new(fs.clone()))),
        ("list", Arc::new(ListDirectoryEngine::new(fs.clone()))),
        ("list", Arc::new(ListDirectoryWithSizesEngine::new(fs.clone()))),
        ("list", Arc::new(DirectoryTreeEngine::new(fs.clone()))),
        ("write", Arc::new(MoveFileEngine::new(fs.clone()))),
        ("search", Arc::new(SearchFilesEngine::new(fs.clone()))),
        ("info", Arc::new(GetFileInfoEngine::new(fs.clone()))),
        ("info", Arc::new(ListAllowedDirectoriesEngine::new(fs.clone()))),
        ("info", Arc::new(CacheStatsEngine::new(fs))),
    ];

    for (category, engine) in engines {
        let info = ToolInfo::new(engine.name(), engine.description(), category);
        registry.register_with_engine(info, engine);
    }
}

/// Log the detailed error and hand back only the user-safe message.
pub(crate) fn fs_failure(tool: &str, err: FsError) -> ExecResult {
    tracing::warn!(tool, kind = ?err.kind(), error = %err.log_message(), "tool failed");
    ExecResult::failure(1, err.user_message())
}

pub(crate) fn invalid_params(err: serde_json::Error) -> ExecResult {
    ExecResult::failure(1, format!("Invalid params: {}", err))
}
