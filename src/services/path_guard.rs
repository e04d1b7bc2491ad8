/// PathGuard
/// Single choke point confining client-supplied paths to Root.
/// Every file operation and every one-shot command cwd goes through here.

use crate::error::{IdeError, Result};
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    denied: Vec<String>,
    /// Trees refused regardless of the denylist.
    protected: Vec<PathBuf>,
}

impl PathGuard {
    /// `root` is canonicalized once here and never changes afterwards.
    pub fn new(root: impl AsRef<Path>, denied: Vec<String>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|_| IdeError::InvalidPath)?;
        if !root.is_dir() {
            return Err(IdeError::NotADirectory);
        }
        let denied = denied
            .into_iter()
            .map(|d| d.trim_matches(|c| c == '/' || c == '\\').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        Ok(Self {
            root,
            denied,
            protected: Vec::new(),
        })
    }

    /// Refuse everything under `dir` as well.
    pub fn with_protected(mut self, dir: &Path) -> Self {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.protected.push(dir);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn denied(&self) -> &[String] {
        &self.denied
    }

    fn candidate(&self, requested: &str) -> PathBuf {
        if requested.starts_with('/') || Path::new(requested).is_absolute() {
            PathBuf::from(requested)
        } else {
            self.root.join(requested)
        }
    }

    /// Resolve `requested` against Root and enforce the boundary.
    ///
    /// Relative paths are joined onto Root. Paths that do not exist yet
    /// (create/write targets) resolve through their canonical parent. An
    /// entry that exists but cannot be followed is a dangling or looping
    /// symlink and is refused.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let candidate = self.candidate(requested);

        let resolved = match candidate.canonicalize() {
            Ok(path) => path,
            Err(_) => {
                if fs::symlink_metadata(&candidate).is_ok() {
                    log::warn!("[PathGuard] Denied {}: broken symlink", candidate.display());
                    return Err(IdeError::AccessDenied("broken symbolic link"));
                }
                let name = candidate.file_name().ok_or(IdeError::InvalidPath)?;
                let parent = candidate
                    .parent()
                    .ok_or(IdeError::InvalidPath)?
                    .canonicalize()
                    .map_err(|_| IdeError::InvalidPath)?;
                parent.join(name)
            }
        };

        self.validate_resolved(&resolved)?;
        Ok(resolved)
    }

    /// Boundary and denylist checks for a path that is already canonical.
    pub fn validate_resolved(&self, resolved: &Path) -> Result<()> {
        // Component-wise: "/srv/project2" is not under "/srv/project".
        if !resolved.starts_with(&self.root) {
            log::warn!("[PathGuard] Denied {}: outside root", resolved.display());
            return Err(IdeError::AccessDenied("path outside allowed directory"));
        }

        if self.protected.iter().any(|p| resolved.starts_with(p)) {
            log::warn!("[PathGuard] Denied {}: server data", resolved.display());
            return Err(IdeError::AccessDenied("restricted path"));
        }

        if let Some(segment) = self.denied_segment(resolved) {
            log::warn!(
                "[PathGuard] Denied {}: restricted segment {:?}",
                resolved.display(),
                segment
            );
            return Err(IdeError::AccessDenied("restricted path"));
        }

        Ok(())
    }

    /// Location of the symlink `requested` names, without following it.
    /// `None` when the last component is not a symlink.
    pub fn resolve_link(&self, requested: &str) -> Result<Option<PathBuf>> {
        let candidate = self.candidate(requested);
        match fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => {}
            _ => return Ok(None),
        }
        let name = candidate.file_name().ok_or(IdeError::InvalidPath)?;
        let parent = candidate
            .parent()
            .ok_or(IdeError::InvalidPath)?
            .canonicalize()
            .map_err(|_| IdeError::InvalidPath)?;
        let link = parent.join(name);
        self.validate_resolved(&link)?;
        Ok(Some(link))
    }

    /// Same as [`resolve`](Self::resolve); named for call sites that only gate.
    pub fn validate(&self, requested: &str) -> Result<PathBuf> {
        self.resolve(requested)
    }

    /// Denylisted segment found in `path`, matched as a substring that
    /// follows a separator.
    pub fn denied_segment(&self, path: &Path) -> Option<&str> {
        let text = path.to_string_lossy();
        self.denied
            .iter()
            .find(|denied| {
                let needle = format!("{MAIN_SEPARATOR}{denied}");
                text.contains(&needle)
            })
            .map(String::as_str)
    }

    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    /// Root-relative form with a leading separator; empty for Root itself.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => String::new(),
            Ok(rel) => format!("{MAIN_SEPARATOR}{}", rel.display()),
            Err(_) => path.display().to_string(),
        }
    }
}
