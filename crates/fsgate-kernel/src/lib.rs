//! # fsgate-kernel
//!
//! Sandboxed, cached filesystem access.
//!
//! Every operation goes through a [`PathGuard`] that confines paths to a fixed
//! set of root directories, checked both lexically and after symlink
//! resolution. Whole-file reads are fronted by an LRU + TTL [`FileCache`]
//! that is invalidated by every mutation and by on-disk mtime changes.
//!
//! - [`SandboxFs`] is the operation surface (read, write, edit, list,
//!   search, tree, move, info).
//! - [`file_tools`] wraps each operation as an [`ExecutionEngine`] taking
//!   JSON params, registered into a [`ToolRegistry`].

pub mod atomic;
pub mod cache;
pub mod config;
pub mod error;
pub mod file_tools;
pub mod fs;
pub mod guard;
pub mod patch;
pub mod search;
pub mod stream;
pub mod tools;
pub mod tree;
pub mod types;

pub use cache::{CacheMetadata, CacheStats, FileCache};
pub use config::{CacheConfig, ConfigError, FsConfig, SearchConfig};
pub use error::{ErrorKind, FsError, FsResult};
pub use file_tools::register_file_tools;
pub use fs::SandboxFs;
pub use guard::{PathGuard, ResolvedPath, RootSet};
pub use patch::{EditMatch, PatchEdit, PatchEngine, PatchOutcome};
pub use search::{ExcludeSet, SearchOutcome, SearchQuery, Searcher};
pub use tools::{ExecResult, ExecutionEngine, ToolInfo, ToolRegistry};
pub use types::{
    DirEntry, FileInfo, FileType, MediaFile, MediaKind, SizedEntry, SortBy, TreeKind, TreeNode,
};
