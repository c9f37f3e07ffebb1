//! The sandboxed filesystem facade.
//!
//! [`SandboxFs`] is what tool engines talk to. Every operation resolves its
//! paths through the [`PathGuard`] first, reads go through the
//! [`FileCache`], and every mutation invalidates the paths it touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::atomic::write_atomic;
use crate::cache::{CacheStats, FileCache};
use crate::config::{CacheConfig, FsConfig, SearchConfig};
use crate::error::{FsError, FsResult};
use crate::guard::{PathGuard, ResolvedPath, RootSet};
use crate::patch::{PatchEdit, PatchEngine, PatchOutcome};
use crate::search::{SearchOutcome, SearchQuery, Searcher};
use crate::stream;
use crate::tree;
use crate::types::{
    mime_for_extension, DirEntry, FileInfo, FileType, MediaFile, SizedEntry, SortBy, TreeNode,
};

/// Sandboxed, cached filesystem access.
#[derive(Debug)]
pub struct SandboxFs {
    guard: PathGuard,
    cache: FileCache,
    patcher: PatchEngine,
    search: SearchConfig,
}

impl SandboxFs {
    pub fn new(guard: PathGuard, cache: CacheConfig, search: SearchConfig) -> Self {
        Self {
            guard,
            cache: FileCache::new(cache),
            patcher: PatchEngine::new(),
            search,
        }
    }

    /// Build from a loaded config, resolving relative roots against
    /// `working_dir`.
    pub fn from_config(config: &FsConfig, working_dir: &Path) -> FsResult<Self> {
        let roots = RootSet::new(&config.roots, working_dir)?;
        if roots.is_empty() {
            tracing::warn!("no allowed directories configured; every path will be denied");
        }
        let guard = PathGuard::new(roots, working_dir);
        Ok(Self::new(guard, config.cache.clone(), config.search.clone()))
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Read a file as text, optionally only its first or last `n` lines.
    ///
    /// Whole-file reads are served from the cache when possible; head and
    /// tail reads stream from disk and never touch it.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn read_text_file(
        &self,
        path: &str,
        head: Option<usize>,
        tail: Option<usize>,
    ) -> FsResult<String> {
        if head.is_some() && tail.is_some() {
            return Err(FsError::invalid_argument(
                "cannot specify both head and tail",
            ));
        }
        let resolved = self.guard.resolve(path).await?;

        if let Some(n) = head {
            return stream::head_lines(resolved.as_path(), n)
                .await
                .map_err(|e| FsError::io(path, e));
        }
        if let Some(n) = tail {
            return stream::tail_lines(resolved.as_path(), n)
                .await
                .map_err(|e| FsError::io(path, e));
        }

        let bytes = self.read_cached(path, &resolved).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a file as a base64 payload with a MIME type guessed from its
    /// extension.
    pub async fn read_media_file(&self, path: &str) -> FsResult<MediaFile> {
        let resolved = self.guard.resolve(path).await?;
        let bytes = self.read_cached(path, &resolved).await?;
        let ext = resolved
            .as_path()
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (mime_type, kind) = mime_for_extension(&ext);
        Ok(MediaFile {
            kind,
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        })
    }

    /// Read several files concurrently. One failure does not affect the
    /// others; results keep the input order.
    pub async fn read_multiple_files(&self, paths: &[String]) -> Vec<(String, FsResult<String>)> {
        let reads = paths.iter().map(|path| async move {
            let result = self.read_text_file(path, None, None).await;
            (path.clone(), result)
        });
        futures::future::join_all(reads).await
    }

    /// Create or overwrite a file, returning the number of bytes written.
    ///
    /// New files are created exclusively so an attacker-planted link is
    /// never followed; existing files are replaced by rename.
    #[tracing::instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn write_file(&self, path: &str, content: &str) -> FsResult<usize> {
        let resolved = self.guard.resolve(path).await?;
        let target = resolved.as_path();

        let result = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .await
        {
            Ok(mut file) => {
                let written = file.write_all(content.as_bytes()).await;
                match written {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                write_atomic(target, content.as_bytes()).await
            }
            Err(e) => Err(e),
        };
        self.cache.invalidate(target);
        result.map_err(|e| FsError::io(path, e))?;
        Ok(content.len())
    }

    /// Apply a batch of edits; see [`PatchEngine::apply`].
    pub async fn edit_file(
        &self,
        path: &str,
        edits: &[PatchEdit],
        dry_run: bool,
    ) -> FsResult<PatchOutcome> {
        let resolved = self.guard.resolve(path).await?;
        let outcome = self.patcher.apply(&resolved, path, edits, dry_run).await;
        if !dry_run {
            self.cache.invalidate(resolved.as_path());
        }
        outcome
    }

    /// Create a directory and any missing parents. Succeeds if it exists.
    pub async fn create_directory(&self, path: &str) -> FsResult<()> {
        let resolved = self.guard.resolve_creatable(path).await?;
        fs::create_dir_all(resolved.as_path())
            .await
            .map_err(|e| FsError::io(path, e))
    }

    /// List a directory, sorted by name.
    pub async fn list_directory(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let resolved = self.guard.resolve(path).await?;
        let mut entries = fs::read_dir(resolved.as_path())
            .await
            .map_err(|e| FsError::io(path, e))?;

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::io(path, e))?
        {
            let kind = entry
                .file_type()
                .await
                .map(FileType::from)
                .unwrap_or(FileType::File);
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// List a directory with file sizes.
    ///
    /// Symlinks report the size of their target only when the target is
    /// inside the sandbox; otherwise 0. Each stat refreshes the metadata
    /// cache.
    pub async fn list_directory_with_sizes(
        &self,
        path: &str,
        sort_by: SortBy,
    ) -> FsResult<Vec<SizedEntry>> {
        let resolved = self.guard.resolve(path).await?;
        let mut entries = fs::read_dir(resolved.as_path())
            .await
            .map_err(|e| FsError::io(path, e))?;

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::io(path, e))?
        {
            let kind = entry
                .file_type()
                .await
                .map(FileType::from)
                .unwrap_or(FileType::File);
            let size_bytes = if kind.is_dir() {
                0
            } else {
                self.entry_size(&entry, kind).await
            };
            out.push(SizedEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size_bytes,
            });
        }

        match sort_by {
            SortBy::Name => out.sort_by(|a, b| a.name.cmp(&b.name)),
            SortBy::Size => out.sort_by(|a, b| {
                b.size_bytes
                    .cmp(&a.size_bytes)
                    .then_with(|| a.name.cmp(&b.name))
            }),
        }
        Ok(out)
    }

    /// Recursive tree of `path`, without entries matching `exclude`.
    ///
    /// Bounded by the configured search timeout and depth.
    pub async fn directory_tree(&self, path: &str, exclude: &[String]) -> FsResult<Vec<TreeNode>> {
        let resolved = self.guard.resolve(path).await?;
        tree::directory_tree(
            &self.guard,
            path,
            &resolved,
            exclude,
            self.search.timeout(),
            self.search.max_depth,
        )
        .await
    }

    /// Move or rename. Fails if the destination exists.
    #[tracing::instrument(skip(self))]
    pub async fn move_file(&self, source: &str, destination: &str) -> FsResult<()> {
        let from = self.guard.resolve(source).await?;
        let to = self.guard.resolve(destination).await?;

        if fs::symlink_metadata(to.as_path()).await.is_ok() {
            return Err(FsError::already_exists(destination));
        }
        let result = fs::rename(from.as_path(), to.as_path())
            .await
            .map_err(|e| FsError::io(source, e));

        self.cache.invalidate(from.as_path());
        self.cache.invalidate(to.as_path());
        result
    }

    /// Find entries below `path` whose names contain `pattern`
    /// (case-insensitive).
    pub async fn search_files(
        &self,
        path: &str,
        pattern: &str,
        exclude_patterns: &[String],
    ) -> FsResult<SearchOutcome> {
        let root = self.guard.resolve(path).await?;
        let query = SearchQuery {
            root,
            pattern: pattern.to_string(),
            exclude_patterns: exclude_patterns.to_vec(),
            max_results: self.search.max_results,
            timeout: self.search.timeout(),
            max_depth: self.search.max_depth,
        };
        Searcher::new(&self.guard).search(&query).await
    }

    /// Metadata for a file or directory.
    pub async fn get_file_info(&self, path: &str) -> FsResult<FileInfo> {
        let resolved = self.guard.resolve(path).await?;
        let meta = fs::metadata(resolved.as_path())
            .await
            .map_err(|e| FsError::io(path, e))?;
        if meta.is_file() {
            self.cache.record_metadata(resolved.as_path(), &meta);
        }
        Ok(FileInfo::from_metadata(&meta))
    }

    /// Real paths of every allowed root.
    pub fn list_allowed_directories(&self) -> Vec<PathBuf> {
        self.guard.roots().paths().map(Path::to_path_buf).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn read_cached(&self, requested: &str, resolved: &ResolvedPath) -> FsResult<Arc<[u8]>> {
        if let Some(hit) = self.cache.get(resolved.as_path()).await {
            return Ok(hit);
        }
        let bytes: Arc<[u8]> = fs::read(resolved.as_path())
            .await
            .map_err(|e| FsError::io(requested, e))?
            .into();
        self.cache.set(resolved.as_path(), Arc::clone(&bytes)).await;
        Ok(bytes)
    }

    async fn entry_size(&self, entry: &fs::DirEntry, kind: FileType) -> u64 {
        let path = if kind.is_symlink() {
            match self.guard.resolve_path(&entry.path()).await {
                Ok(real) => real.into_path_buf(),
                Err(_) => return 0,
            }
        } else {
            entry.path()
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                self.cache.record_metadata(&path, &meta);
                meta.len()
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (SandboxFs, TempDir) {
        setup_with(CacheConfig::default())
    }

    fn setup_with(cache: CacheConfig) -> (SandboxFs, TempDir) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let config = FsConfig {
            roots: vec![root.to_string_lossy().into_owned()],
            cache,
            search: SearchConfig::default(),
        };
        (SandboxFs::from_config(&config, &root).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_read_write_roundtrip_uses_cache() {
        let (fs, _dir) = setup();
        assert_eq!(fs.write_file("notes.txt", "one\ntwo\n").await.unwrap(), 8);

        assert_eq!(fs.read_text_file("notes.txt", None, None).await.unwrap(), "one\ntwo\n");
        assert_eq!(fs.read_text_file("notes.txt", None, None).await.unwrap(), "one\ntwo\n");
        let stats = fs.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_write_invalidates_cache() {
        let (fs, _dir) = setup();
        fs.write_file("a.txt", "first").await.unwrap();
        fs.read_text_file("a.txt", None, None).await.unwrap();

        fs.write_file("a.txt", "second").await.unwrap();
        assert_eq!(fs.read_text_file("a.txt", None, None).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_head_and_tail() {
        let (fs, _dir) = setup();
        fs.write_file("lines.txt", "1\n2\n3\n4\n").await.unwrap();

        assert_eq!(fs.read_text_file("lines.txt", Some(2), None).await.unwrap(), "1\n2\n");
        assert_eq!(fs.read_text_file("lines.txt", None, Some(1)).await.unwrap(), "4\n");
        let err = fs
            .read_text_file("lines.txt", Some(1), Some(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        // Streaming reads bypass the cache.
        assert_eq!(fs.cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_read_multiple_isolates_failures() {
        let (fs, _dir) = setup();
        fs.write_file("a.txt", "A").await.unwrap();
        fs.write_file("b.txt", "B").await.unwrap();

        let paths = vec!["a.txt".to_string(), "missing.txt".to_string(), "b.txt".to_string()];
        let results = fs.read_multiple_files(&paths).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1.as_deref().unwrap(), "A");
        assert_eq!(results[1].1.as_ref().unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(results[2].1.as_deref().unwrap(), "B");
    }

    #[tokio::test]
    async fn test_read_media_file() {
        let (fs, dir) = setup();
        std::fs::write(dir.path().join("root/pixel.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let media = fs.read_media_file("pixel.png").await.unwrap();
        assert_eq!(media.mime_type, "image/png");
        assert_eq!(media.kind, crate::types::MediaKind::Image);
        assert_eq!(media.data, "iVBORw==");
    }

    #[tokio::test]
    async fn test_write_outside_denied() {
        let (fs, dir) = setup();
        let outside = dir.path().join("evil.txt");
        let err = fs
            .write_file(&outside.to_string_lossy(), "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
        assert!(!outside.exists());
    }

    #[tokio::test]
    async fn test_edit_then_read_sees_new_content() {
        let (fs, _dir) = setup();
        fs.write_file("code.rs", "fn main() {}\n").await.unwrap();
        fs.read_text_file("code.rs", None, None).await.unwrap();

        let edits = [PatchEdit::new("main", "start")];
        let preview = fs.edit_file("code.rs", &edits, true).await.unwrap();
        assert!(!preview.written);
        assert_eq!(
            fs.read_text_file("code.rs", None, None).await.unwrap(),
            "fn main() {}\n"
        );

        let outcome = fs.edit_file("code.rs", &edits, false).await.unwrap();
        assert!(outcome.written);
        assert!(outcome.diff.contains("+fn start() {}"));
        assert_eq!(
            fs.read_text_file("code.rs", None, None).await.unwrap(),
            "fn start() {}\n"
        );
    }

    #[tokio::test]
    async fn test_create_directory_nested_and_idempotent() {
        let (fs, dir) = setup();
        fs.create_directory("a/b/c").await.unwrap();
        fs.create_directory("a/b/c").await.unwrap();
        assert!(dir.path().join("root/a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_list_directory_sorted() {
        let (fs, dir) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir(root.join("zeta")).unwrap();
        std::fs::write(root.join("alpha.txt"), "").unwrap();

        let lines: Vec<String> = fs
            .list_directory(".")
            .await
            .unwrap()
            .iter()
            .map(DirEntry::listing_line)
            .collect();
        assert_eq!(lines, vec!["[FILE] alpha.txt", "[DIR] zeta"]);
    }

    #[tokio::test]
    async fn test_list_with_sizes_by_size() {
        let (fs, dir) = setup();
        let root = dir.path().join("root");
        std::fs::write(root.join("small"), "x").unwrap();
        std::fs::write(root.join("big"), "xxxxxxxx").unwrap();
        std::fs::create_dir(root.join("dir")).unwrap();

        let entries = fs.list_directory_with_sizes(".", SortBy::Size).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["big", "small", "dir"]);
        assert_eq!(entries[0].size_bytes, 8);
        assert_eq!(entries[2].size_bytes, 0);
    }

    #[tokio::test]
    async fn test_move_file() {
        let (fs, dir) = setup();
        fs.write_file("from.txt", "data").await.unwrap();
        fs.write_file("taken.txt", "other").await.unwrap();
        fs.read_text_file("from.txt", None, None).await.unwrap();

        let err = fs.move_file("from.txt", "taken.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        fs.move_file("from.txt", "to.txt").await.unwrap();
        assert!(!dir.path().join("root/from.txt").exists());
        assert_eq!(fs.read_text_file("to.txt", None, None).await.unwrap(), "data");
        let err = fs.read_text_file("from.txt", None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_get_file_info() {
        let (fs, _dir) = setup();
        fs.write_file("info.txt", "12345").await.unwrap();

        let info = fs.get_file_info("info.txt").await.unwrap();
        assert_eq!(info.size_bytes, 5);
        assert!(info.is_file);
        assert!(!info.is_directory);

        let info = fs.get_file_info(".").await.unwrap();
        assert!(info.is_directory);
    }

    #[tokio::test]
    async fn test_symlink_escape_read_denied() {
        let (fs, dir) = setup();
        std::fs::write(dir.path().join("secret"), "s").unwrap();
        symlink(dir.path().join("secret"), dir.path().join("root/link")).unwrap();

        let err = fs.read_text_file("link", None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
    }

    #[tokio::test]
    async fn test_list_sizes_ignores_escaping_link_target() {
        let (fs, dir) = setup();
        let root = dir.path().join("root");
        std::fs::write(dir.path().join("secret"), vec![b'x'; 12345]).unwrap();
        symlink(dir.path().join("secret"), root.join("link")).unwrap();
        std::fs::write(root.join("inside"), "abc").unwrap();
        symlink(root.join("inside"), root.join("inside-link")).unwrap();

        let entries = fs.list_directory_with_sizes(".", SortBy::Name).await.unwrap();
        let sizes: Vec<(&str, u64)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.size_bytes))
            .collect();
        assert_eq!(sizes, vec![("inside", 3), ("inside-link", 3), ("link", 0)]);
        assert!(fs.cache().metadata(&dir.path().join("secret")).is_none());
    }

    #[tokio::test]
    async fn test_list_sizes_sees_external_rewrite() {
        let (fs, dir) = setup();
        let file = dir.path().join("root/grow.txt");
        std::fs::write(&file, "1").unwrap();

        let first = fs.list_directory_with_sizes(".", SortBy::Name).await.unwrap();
        assert_eq!(first[0].size_bytes, 1);

        std::fs::write(&file, "1234567890").unwrap();
        let second = fs.list_directory_with_sizes(".", SortBy::Name).await.unwrap();
        assert_eq!(second[0].size_bytes, 10);
    }

    #[tokio::test]
    async fn test_disabled_cache_still_reads() {
        let (fs, _dir) = setup_with(CacheConfig::disabled());
        fs.write_file("a.txt", "A").await.unwrap();
        assert_eq!(fs.read_text_file("a.txt", None, None).await.unwrap(), "A");
        assert_eq!(fs.cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_list_allowed_directories() {
        let (fs, dir) = setup();
        let roots = fs.list_allowed_directories();
        assert_eq!(roots, vec![dunce::canonicalize(dir.path().join("root")).unwrap()]);
    }
}
