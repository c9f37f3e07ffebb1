//! Sandbox path resolution.
//!
//! Every caller-supplied path goes through [`PathGuard::resolve`] before any
//! filesystem access. Containment is checked twice: once on the lexically
//! normalized path and once on its real (symlink-resolved) form, so a link
//! inside a root cannot hand out access to something outside it.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::error::{FsError, FsResult};

/// One allowed root in both of its forms.
#[derive(Debug, Clone)]
struct Root {
    /// Absolute, `.`/`..`-normalized path as configured.
    lexical: PathBuf,
    /// The same directory with symlinks resolved.
    real: PathBuf,
}

/// Ordered, de-duplicated set of sandbox roots.
///
/// Built once at startup; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    roots: Vec<Root>,
}

impl RootSet {
    /// Build a root set from configured directory paths.
    ///
    /// Relative entries are resolved against `working_dir` and a leading `~`
    /// is expanded. Every root must exist and be a directory.
    pub fn new<I, S>(roots: I, working_dir: &Path) -> FsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for raw in roots {
            let raw = raw.as_ref();
            let lexical = absolutize(raw, working_dir);
            let real = dunce::canonicalize(&lexical).map_err(|e| FsError::io(raw, e))?;
            if !real.is_dir() {
                return Err(FsError::invalid_argument(format!(
                    "{raw} is not a directory"
                )));
            }
            if set.roots.iter().any(|r| r.real == real) {
                continue;
            }
            tracing::debug!(root = %real.display(), "allowed root");
            set.roots.push(Root { lexical, real });
        }
        Ok(set)
    }

    /// Number of roots.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// True when no root is configured (nothing is accessible).
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Real paths of all roots, in configuration order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|r| r.real.as_path())
    }

    // `Path::starts_with` compares whole components, so `/data` never
    // contains `/data-other`.
    fn contains_lexical(&self, path: &Path) -> bool {
        self.roots
            .iter()
            .any(|r| path.starts_with(&r.lexical) || path.starts_with(&r.real))
    }

    fn contains_real(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| path.starts_with(&r.real))
    }
}

/// An absolute, symlink-resolved path that lay inside the sandbox when it
/// was validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Resolves caller paths against a [`RootSet`].
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: RootSet,
    working_dir: PathBuf,
}

impl PathGuard {
    pub fn new(roots: RootSet, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            roots,
            working_dir: working_dir.into(),
        }
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Resolve a caller-supplied path to a sandboxed real path.
    ///
    /// Paths that do not exist yet (write targets) are admitted when their
    /// parent directory resolves inside a root. A missing parent is
    /// `NotFound`; any containment failure is terminal.
    pub async fn resolve(&self, requested: &str) -> FsResult<ResolvedPath> {
        let normalized = absolutize(requested, &self.working_dir);
        if !self.roots.contains_lexical(&normalized) {
            return Err(violation(
                requested,
                "path outside allowed directories",
                &normalized,
            ));
        }

        match real_path(&normalized).await {
            Ok(real) => self.admit(requested, real, "symlink target outside allowed directories"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.resolve_missing(requested, &normalized).await
            }
            Err(e) => Err(FsError::io(requested, e)),
        }
    }

    /// Resolve an absolute path discovered during a walk.
    pub async fn resolve_path(&self, path: &Path) -> FsResult<ResolvedPath> {
        self.resolve(&path.to_string_lossy()).await
    }

    /// Resolve a path whose missing ancestors will be created.
    ///
    /// The deepest existing ancestor is resolved and checked; the missing
    /// tail is appended to its real path. Missing components cannot be
    /// symlinks, so the result stays inside the sandbox.
    pub async fn resolve_creatable(&self, requested: &str) -> FsResult<ResolvedPath> {
        let normalized = absolutize(requested, &self.working_dir);
        if !self.roots.contains_lexical(&normalized) {
            return Err(violation(
                requested,
                "path outside allowed directories",
                &normalized,
            ));
        }

        let mut existing = normalized.as_path();
        let mut missing = Vec::new();
        let real = loop {
            match real_path(existing).await {
                Ok(real) => break real,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if fs::symlink_metadata(existing).await.is_ok() {
                        return Err(violation(
                            requested,
                            "symlink target outside allowed directories",
                            existing,
                        ));
                    }
                    let (Some(parent), Some(name)) = (existing.parent(), existing.file_name())
                    else {
                        return Err(FsError::not_found(requested, existing.display().to_string()));
                    };
                    missing.push(name);
                    existing = parent;
                }
                Err(e) => return Err(FsError::io(requested, e)),
            }
        };

        let target = missing.iter().rev().fold(real, |acc, name| acc.join(name));
        self.admit(requested, target, "parent directory outside allowed directories")
    }

    async fn resolve_missing(&self, requested: &str, normalized: &Path) -> FsResult<ResolvedPath> {
        // A dangling symlink is judged by where it points.
        let is_link = fs::symlink_metadata(normalized)
            .await
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            let target = fs::read_link(normalized)
                .await
                .map_err(|e| FsError::io(requested, e))?;
            let base = normalized.parent().unwrap_or(normalized);
            let target = normalize_lexical(&base.join(target));
            return self.resolve_via_parent(requested, &target).await;
        }
        self.resolve_via_parent(requested, normalized).await
    }

    async fn resolve_via_parent(&self, requested: &str, path: &Path) -> FsResult<ResolvedPath> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(FsError::not_found(requested, path.display().to_string()));
        };

        let real_parent = match real_path(parent).await {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FsError::not_found(
                    requested,
                    format!("parent directory {} does not exist", parent.display()),
                ));
            }
            Err(e) => return Err(FsError::io(requested, e)),
        };

        let candidate = real_parent.join(name);
        let chained_link = fs::symlink_metadata(&candidate)
            .await
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if chained_link {
            return Err(violation(
                requested,
                "symlink target outside allowed directories",
                &candidate,
            ));
        }

        self.admit(
            requested,
            candidate,
            "parent directory outside allowed directories",
        )
    }

    fn admit(&self, requested: &str, real: PathBuf, reason: &'static str) -> FsResult<ResolvedPath> {
        if self.roots.contains_real(&real) {
            Ok(ResolvedPath(real))
        } else {
            Err(violation(requested, reason, &real))
        }
    }
}

fn violation(requested: &str, reason: &'static str, real: &Path) -> FsError {
    let err = FsError::sandbox(requested, reason, real.display().to_string());
    tracing::warn!(error = %err.log_message(), "sandbox violation");
    err
}

async fn real_path(path: &Path) -> io::Result<PathBuf> {
    let real = fs::canonicalize(path).await?;
    Ok(dunce::simplified(&real).to_path_buf())
}

/// Expand `~`, make absolute against `working_dir`, and normalize.
pub fn absolutize(raw: &str, working_dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        normalize_lexical(path)
    } else {
        normalize_lexical(&working_dir.join(path))
    }
}

/// Remove `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
