//! Recursive name search.
//!
//! The walk uses an explicit stack, a visited set of real directory paths,
//! and a depth limit, so neither deep trees nor symlink cycles can exhaust
//! the task stack. Every entry passes through the [`PathGuard`] before it is
//! matched or descended into.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tokio::fs;
use tokio::time::Instant;

use crate::error::{FsError, FsResult};
use crate::guard::{PathGuard, ResolvedPath};

/// Compiled exclusion patterns, matched against paths relative to the walk
/// root.
///
/// A bare name (`node_modules`) excludes that name at any depth along with
/// everything beneath it. A pattern with glob syntax is used as written;
/// when it has no `/` it also applies at any depth.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    set: Option<GlobSet>,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> FsResult<Self> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            for expanded in expand_pattern(pattern) {
                let glob = GlobBuilder::new(&expanded)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| {
                        FsError::invalid_argument(format!("invalid exclude pattern {pattern}: {e}"))
                    })?;
                builder.add(glob);
            }
        }
        let set = builder
            .build()
            .map_err(|e| FsError::invalid_argument(format!("invalid exclude patterns: {e}")))?;
        Ok(Self { set: Some(set) })
    }

    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(relative))
    }
}

fn expand_pattern(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim_end_matches('/');
    if pattern.contains(['*', '?', '[', '{']) {
        if pattern.contains('/') {
            vec![pattern.to_string()]
        } else {
            vec![pattern.to_string(), format!("**/{pattern}")]
        }
    } else {
        vec![format!("**/{pattern}"), format!("**/{pattern}/**")]
    }
}

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Directory the walk starts from.
    pub root: ResolvedPath,
    /// Case-insensitive substring matched against entry names.
    pub pattern: String,
    pub exclude_patterns: Vec<String>,
    pub max_results: usize,
    pub timeout: Duration,
    pub max_depth: usize,
}

/// Search results.
///
/// `truncated` is set when the walk stopped with entries left unvisited;
/// `timed_out` says the time budget was the reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub matches: Vec<PathBuf>,
    pub truncated: bool,
    pub timed_out: bool,
}

/// Walks a sandboxed directory tree looking for names.
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    guard: &'a PathGuard,
}

impl<'a> Searcher<'a> {
    pub fn new(guard: &'a PathGuard) -> Self {
        Self { guard }
    }

    /// Run a search. Only malformed exclude patterns produce an error;
    /// unreadable or out-of-sandbox entries are skipped.
    #[tracing::instrument(skip(self, query), fields(root = %query.root.as_path().display(), pattern = %query.pattern))]
    pub async fn search(&self, query: &SearchQuery) -> FsResult<SearchOutcome> {
        let excludes = ExcludeSet::new(&query.exclude_patterns)?;
        let needle = query.pattern.to_lowercase();
        let deadline = Instant::now() + query.timeout;
        let root = query.root.as_path();

        let mut outcome = SearchOutcome::default();
        let mut visited = HashSet::from([root.to_path_buf()]);
        let mut stack = vec![(root.to_path_buf(), 0usize)];

        'walk: while let Some((dir, depth)) = stack.pop() {
            if Instant::now() >= deadline {
                outcome.timed_out = true;
                outcome.truncated = true;
                break;
            }

            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::trace!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::trace!(dir = %dir.display(), error = %e, "directory read failed");
                        break;
                    }
                };
                // The cap only truncates when there is still something to look at.
                if outcome.matches.len() >= query.max_results {
                    outcome.truncated = true;
                    break 'walk;
                }
                let path = entry.path();
                let relative = path.strip_prefix(root).unwrap_or(&path);

                if !excludes.is_excluded(relative) {
                    if let Ok(real) = self.guard.resolve_path(&path).await {
                        let name = entry.file_name().to_string_lossy().to_lowercase();
                        if name.contains(&needle) {
                            outcome.matches.push(path.clone());
                        }
                        if depth < query.max_depth
                            && is_dir(&entry, &real).await
                            && visited.insert(real.into_path_buf())
                        {
                            stack.push((path, depth + 1));
                        }
                    }
                }

                if Instant::now() >= deadline {
                    outcome.timed_out = true;
                    outcome.truncated = true;
                    break 'walk;
                }
            }
        }

        tracing::debug!(
            matches = outcome.matches.len(),
            truncated = outcome.truncated,
            timed_out = outcome.timed_out,
            "search finished"
        );
        Ok(outcome)
    }
}

/// Directory check that follows symlinks via the already-resolved target.
pub(crate) async fn is_dir(entry: &fs::DirEntry, real: &ResolvedPath) -> bool {
    match entry.file_type().await {
        Ok(ft) if ft.is_dir() => true,
        Ok(ft) if ft.is_symlink() => fs::metadata(real.as_path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::RootSet;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (PathGuard, TempDir) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let roots = RootSet::new([root.to_string_lossy()], dir.path()).unwrap();
        (PathGuard::new(roots, &root), dir)
    }

    async fn query(guard: &PathGuard, pattern: &str, exclude: &[&str]) -> SearchQuery {
        SearchQuery {
            root: guard.resolve(".").await.unwrap(),
            pattern: pattern.to_string(),
            exclude_patterns: exclude.iter().map(|s| s.to_string()).collect(),
            max_results: 100,
            timeout: Duration::from_secs(10),
            max_depth: 64,
        }
    }

    fn names(outcome: &SearchOutcome) -> Vec<String> {
        let mut names: Vec<String> = outcome
            .matches
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_exclude_bare_name_any_depth() {
        let set = ExcludeSet::new(&["node_modules".to_string()]).unwrap();
        assert!(set.is_excluded(Path::new("node_modules")));
        assert!(set.is_excluded(Path::new("pkg/node_modules")));
        assert!(set.is_excluded(Path::new("pkg/node_modules/x/index.js")));
        assert!(!set.is_excluded(Path::new("pkg/node_modules_extra")));
    }

    #[test]
    fn test_exclude_glob() {
        let set = ExcludeSet::new(&["*.log".to_string(), "build/*".to_string()]).unwrap();
        assert!(set.is_excluded(Path::new("app.log")));
        assert!(set.is_excluded(Path::new("deep/dir/app.log")));
        assert!(set.is_excluded(Path::new("build/out.o")));
        assert!(!set.is_excluded(Path::new("build/nested/out.o")));
        assert!(!set.is_excluded(Path::new("app.txt")));
    }

    #[test]
    fn test_invalid_exclude() {
        let err = ExcludeSet::new(&["a[".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_case_insensitive_match() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::write(root.join("README.md"), "").unwrap();
        std::fs::write(root.join("src/readme.txt"), "").unwrap();
        std::fs::write(root.join("src/nested/ReadMe"), "").unwrap();
        std::fs::write(root.join("src/other.rs"), "").unwrap();

        let q = query(&guard, "readme", &[]).await;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(names(&outcome), vec!["README.md", "ReadMe", "readme.txt"]);
        assert!(!outcome.truncated);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_reports_literal_paths() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/hit.txt"), "").unwrap();

        let q = query(&guard, "hit", &[]).await;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(outcome.matches, vec![q.root.as_path().join("sub/hit.txt")]);
    }

    #[tokio::test]
    async fn test_exclusion_prunes_subtree() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        std::fs::write(root.join("index.js"), "").unwrap();

        let q = query(&guard, "index", &["node_modules"]).await;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(outcome.matches, vec![q.root.as_path().join("index.js")]);
    }

    #[tokio::test]
    async fn test_max_results_truncates() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        for i in 0..10 {
            std::fs::write(root.join(format!("file{i}.txt")), "").unwrap();
        }

        let mut q = query(&guard, "file", &[]).await;
        q.max_results = 3;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(outcome.matches.len(), 3);
        assert!(outcome.truncated);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_exact_cap_is_not_truncated() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        for i in 0..3 {
            std::fs::write(root.join(format!("file{i}.txt")), "").unwrap();
        }

        let mut q = query(&guard, "file", &[]).await;
        q.max_results = 3;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(outcome.matches.len(), 3);
        assert!(!outcome.truncated);

        std::fs::write(root.join("file3.txt"), "").unwrap();
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(outcome.matches.len(), 3);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_zero_max_results() {
        let (guard, dir) = setup();
        let mut q = query(&guard, "a", &[]).await;
        q.max_results = 0;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert!(!outcome.truncated);

        std::fs::write(dir.path().join("root/a.txt"), "").unwrap();
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert!(outcome.matches.is_empty());
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_zero_timeout() {
        let (guard, dir) = setup();
        std::fs::write(dir.path().join("root/a.txt"), "").unwrap();

        let mut q = query(&guard, "a", &[]).await;
        q.timeout = Duration::ZERO;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert!(outcome.matches.is_empty());
        assert!(outcome.timed_out);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_symlink_cycle_terminates() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir(root.join("a")).unwrap();
        std::fs::write(root.join("a/needle.txt"), "").unwrap();
        symlink(&root, root.join("a/loop")).unwrap();

        let q = query(&guard, "needle", &[]).await;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(outcome.matches.len(), 1);
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_escaping_symlink_skipped() {
        let (guard, dir) = setup();
        let outside = dir.path().join("outside");
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), "").unwrap();
        symlink(&outside, dir.path().join("root/escape")).unwrap();
        symlink(outside.join("secret.txt"), dir.path().join("root/secret-link")).unwrap();

        let q = query(&guard, "secret", &[]).await;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert!(outcome.matches.is_empty());
    }

    #[tokio::test]
    async fn test_max_depth() {
        let (guard, dir) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("one/two")).unwrap();
        std::fs::write(root.join("one/hit-1"), "").unwrap();
        std::fs::write(root.join("one/two/hit-2"), "").unwrap();

        let mut q = query(&guard, "hit", &[]).await;
        q.max_depth = 1;
        let outcome = Searcher::new(&guard).search(&q).await.unwrap();
        assert_eq!(names(&outcome), vec!["hit-1"]);
    }
}
