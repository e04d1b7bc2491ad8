/// File Service
/// Directory listing and file CRUD under Root. Every operation resolves its
/// path(s) through [`PathGuard`] before touching the filesystem.

use crate::error::{IdeError, Result};
use crate::models::{
    CreatedDirectory, DeleteResult, DirectoryEntry, DirectoryListing, FileContent, RenameResult,
    SearchOptions, SearchResults, WriteResult,
};
use crate::services::history::HistoryStore;
use crate::services::language::detect_language;
use crate::services::path_guard::PathGuard;
use crate::services::search;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::cmp::Ordering;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Bytes scanned for control characters when deciding text vs binary.
const BINARY_SNIFF_LEN: usize = 8192;

#[derive(Debug, Clone)]
pub struct FileOptions {
    pub show_hidden: bool,
    pub max_file_size: u64,
    pub max_editable_size: u64,
}

pub struct FileStore {
    guard: PathGuard,
    options: FileOptions,
    history: Arc<dyn HistoryStore>,
}

impl FileStore {
    pub fn new(guard: PathGuard, options: FileOptions, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            guard,
            options,
            history,
        }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn list(&self, path: &str) -> Result<DirectoryListing> {
        let full = self.guard.validate(path)?;
        if !full.exists() {
            return Err(IdeError::NotFound("Path"));
        }
        if !full.is_dir() {
            return Err(IdeError::NotADirectory);
        }

        let mut items = Vec::new();
        if !self.guard.is_root(&full) {
            if let Some(parent) = full.parent() {
                if let Some(mut entry) = self.entry_for("..", parent) {
                    if entry.relative_path.is_empty() {
                        entry.relative_path = "/".to_string();
                    }
                    items.push(entry);
                }
            }
        }

        for dirent in fs::read_dir(&full)? {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    log::debug!("[Files] Skipping unreadable entry in {}: {}", full.display(), e);
                    continue;
                }
            };
            let name = dirent.file_name().to_string_lossy().into_owned();
            if !self.options.show_hidden && name.starts_with('.') {
                continue;
            }
            if let Some(entry) = self.entry_for(&name, &dirent.path()) {
                items.push(entry);
            }
        }

        items.sort_by(compare_entries);

        let relative_path = match self.guard.relative(&full) {
            rel if rel.is_empty() => "/".to_string(),
            rel => rel,
        };
        Ok(DirectoryListing {
            path: full.display().to_string(),
            relative_path,
            items,
        })
    }

    fn entry_for(&self, name: &str, path: &Path) -> Option<DirectoryEntry> {
        // Dangling symlinks still show up, described by the link itself.
        let meta = fs::metadata(path)
            .or_else(|_| fs::symlink_metadata(path))
            .ok()?;
        let is_dir = meta.is_dir();
        let extension = if is_dir || name == ".." {
            String::new()
        } else {
            Path::new(name)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Some(DirectoryEntry {
            name: name.to_string(),
            path: path.display().to_string(),
            relative_path: self.guard.relative(path),
            is_dir,
            size: if is_dir { 0 } else { meta.len() },
            modified: modified_secs(&meta),
            readable: access::readable(path),
            writable: access::writable(path, &meta),
            extension,
        })
    }

    pub fn read(&self, path: &str) -> Result<FileContent> {
        let full = self.guard.validate(path)?;
        if !full.exists() {
            return Err(IdeError::NotFound("File"));
        }
        if full.is_dir() {
            return Err(IdeError::IsADirectory);
        }
        let meta = fs::metadata(&full)?;
        let size = meta.len();
        if size > self.options.max_file_size {
            return Err(IdeError::TooLarge {
                max_mb: self.options.max_file_size / 1024 / 1024,
            });
        }

        let bytes = fs::read(&full)?;
        let is_binary = is_binary_content(&bytes);
        self.history.record_recent_file(&full);

        // Bytes that are not valid UTF-8 cannot travel as a JSON string.
        let (content, content_base64, is_binary) = if is_binary {
            (None, Some(BASE64.encode(&bytes)), true)
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => (Some(text), None, false),
                Err(e) => (None, Some(BASE64.encode(e.into_bytes())), true),
            }
        };

        Ok(FileContent {
            path: full.display().to_string(),
            relative_path: self.guard.relative(&full),
            content,
            content_base64,
            is_binary,
            size,
            editable: !is_binary && size <= self.options.max_editable_size,
            language: detect_language(&full).to_string(),
            modified: modified_secs(&meta),
        })
    }

    /// Overwrites unconditionally; last writer wins.
    pub fn write(&self, path: &str, content: &str, is_base64: bool) -> Result<WriteResult> {
        let full = self.guard.validate(path).map_err(|e| match e {
            IdeError::InvalidPath => IdeError::ParentMissing,
            other => other,
        })?;

        let bytes = if is_base64 {
            BASE64
                .decode(content.trim())
                .map_err(|e| IdeError::InvalidRequest(format!("invalid base64 content: {e}")))?
        } else {
            content.as_bytes().to_vec()
        };

        match full.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => return Err(IdeError::ParentMissing),
        }

        fs::write(&full, &bytes).map_err(|e| IdeError::WriteFailed(e.to_string()))?;
        let meta = fs::metadata(&full)?;
        log::debug!("[Files] Wrote {} bytes to {}", bytes.len(), full.display());

        Ok(WriteResult {
            path: full.display().to_string(),
            relative_path: self.guard.relative(&full),
            size: bytes.len() as u64,
            modified: modified_secs(&meta),
        })
    }

    /// Creates missing intermediate directories as well.
    pub fn mkdir(&self, path: &str) -> Result<CreatedDirectory> {
        let full = self.resolve_new_tree(path)?;
        if full.exists() {
            return Err(IdeError::AlreadyExists("Path"));
        }
        fs::create_dir_all(&full)?;
        Ok(CreatedDirectory {
            path: full.display().to_string(),
            relative_path: self.guard.relative(&full),
        })
    }

    /// Nested form of the guard's new-file rule: canonicalize the deepest
    /// existing ancestor and re-append the missing plain segments.
    fn resolve_new_tree(&self, path: &str) -> Result<PathBuf> {
        match self.guard.validate(path) {
            Err(IdeError::InvalidPath) => {}
            other => return other,
        }

        let candidate = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.guard.root().join(path)
        };
        let mut existing = candidate.as_path();
        let mut missing = Vec::new();
        // symlink_metadata stops the climb at a dangling link, which the
        // guard then refuses.
        while fs::symlink_metadata(existing).is_err() {
            let name = existing.file_name().ok_or(IdeError::InvalidPath)?;
            missing.push(name.to_os_string());
            existing = existing.parent().ok_or(IdeError::InvalidPath)?;
        }
        // ".." after a missing segment cannot be resolved safely.
        if candidate
            .strip_prefix(existing)
            .map_err(|_| IdeError::InvalidPath)?
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(IdeError::InvalidPath);
        }

        let base = self.guard.validate(&existing.display().to_string())?;
        let full = missing.iter().rev().fold(base, |acc, name| acc.join(name));
        self.guard.validate_resolved(&full)?;
        Ok(full)
    }

    /// A symlink is removed itself; its target is left alone.
    pub fn delete(&self, path: &str) -> Result<DeleteResult> {
        if let Some(link) = self.guard.resolve_link(path)? {
            fs::remove_file(&link)?;
            log::info!("[Files] Deleted link {}", link.display());
            return Ok(DeleteResult {
                deleted: link.display().to_string(),
            });
        }
        let full = self.guard.validate(path)?;
        if fs::symlink_metadata(&full).is_err() {
            return Err(IdeError::NotFound("Path"));
        }
        if self.guard.is_root(&full) {
            return Err(IdeError::Forbidden("Cannot delete base directory"));
        }
        if full.is_dir() {
            fs::remove_dir_all(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        log::info!("[Files] Deleted {}", full.display());
        Ok(DeleteResult {
            deleted: full.display().to_string(),
        })
    }

    /// Renaming a symlink moves the link, not its target.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<RenameResult> {
        let from = match self.guard.resolve_link(old_path)? {
            Some(link) => link,
            None => self.guard.validate(old_path)?,
        };
        let to = self.guard.validate(new_path)?;
        if fs::symlink_metadata(&from).is_err() {
            return Err(IdeError::NotFound("Source path"));
        }
        if to.exists() {
            return Err(IdeError::AlreadyExists("Destination"));
        }
        if self.guard.is_root(&from) {
            return Err(IdeError::Forbidden("Cannot rename base directory"));
        }
        fs::rename(&from, &to)?;
        Ok(RenameResult {
            old_path: from.display().to_string(),
            new_path: to.display().to_string(),
        })
    }

    pub fn search(&self, query: &str, path: &str, options: &SearchOptions) -> Result<SearchResults> {
        let full = self.guard.validate(path)?;
        if !full.is_dir() {
            return Err(IdeError::NotADirectory);
        }
        search::search_tree(&self.guard, self.options.show_hidden, &full, query, options)
    }
}

/// ".." first, then directories, then case-insensitive name.
fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    match (a.name == "..", b.name == "..") {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Control bytes other than tab, newline, and carriage return mark binary.
pub fn is_binary_content(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(BINARY_SNIFF_LEN)
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F))
}

fn modified_secs(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
mod access {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn check(path: &Path, mode: libc::c_int) -> bool {
        match CString::new(path.as_os_str().as_bytes()) {
            Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), mode) == 0 },
            Err(_) => false,
        }
    }

    pub fn readable(path: &Path) -> bool {
        check(path, libc::R_OK)
    }

    pub fn writable(path: &Path, _meta: &std::fs::Metadata) -> bool {
        check(path, libc::W_OK)
    }
}

#[cfg(not(unix))]
mod access {
    use std::path::Path;

    pub fn readable(_path: &Path) -> bool {
        true
    }

    pub fn writable(_path: &Path, meta: &std::fs::Metadata) -> bool {
        !meta.permissions().readonly()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history::{MemoryHistory, Retention};
    use pretty_assertions::assert_eq;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: FileStore,
        history: Arc<MemoryHistory>,
    }

    fn fixture_with(show_hidden: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("Docs")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/app.js"), "let x = 1;\n").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("A.md"), "# a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();

        let guard = PathGuard::new(root, vec![".git".into(), "node_modules".into()]).unwrap();
        let history = Arc::new(MemoryHistory::new(Retention {
            commands: 10,
            recent_files: 10,
        }));
        let store = FileStore::new(
            guard,
            FileOptions {
                show_hidden,
                max_file_size: 1024,
                max_editable_size: 16,
            },
            history.clone(),
        );
        Fixture {
            _dir: dir,
            store,
            history,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(true)
    }

    fn names(listing: &DirectoryListing) -> Vec<&str> {
        listing.items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn root_listing_has_no_parent_entry_and_sorts_dirs_first() {
        let f = fixture();
        let listing = f.store.list(".").unwrap();
        assert_eq!(listing.relative_path, "/");
        assert_eq!(names(&listing), vec![".git", "Docs", "src", ".hidden", "A.md", "b.txt"]);
    }

    #[test]
    fn subdirectory_listing_starts_with_parent_entry() {
        let f = fixture();
        let listing = f.store.list("src").unwrap();
        assert_eq!(listing.relative_path, "/src");
        assert_eq!(names(&listing), vec!["..", "nested", "app.js"]);
        assert!(listing.items[0].is_dir);
        assert_eq!(listing.items[2].extension, "js");
        assert_eq!(listing.items[2].relative_path, "/src/app.js");
        assert!(listing.items[2].readable);
    }

    #[test]
    fn hidden_entries_follow_toggle() {
        let f = fixture_with(false);
        let listing = f.store.list("").unwrap();
        assert_eq!(names(&listing), vec!["Docs", "src", "A.md", "b.txt"]);
    }

    #[test]
    fn list_errors() {
        let f = fixture();
        assert!(matches!(f.store.list("nope"), Err(IdeError::NotFound(_))));
        assert!(matches!(f.store.list("b.txt"), Err(IdeError::NotADirectory)));
        assert!(matches!(f.store.list(".git"), Err(IdeError::AccessDenied(_))));
    }

    #[test]
    fn write_then_read_text() {
        let f = fixture();
        f.store.write("notes.txt", "hello", false).unwrap();
        let file = f.store.read("notes.txt").unwrap();
        assert_eq!(file.content.as_deref(), Some("hello"));
        assert!(!file.is_binary);
        assert!(file.editable);
        assert_eq!(file.language, "plaintext");
        assert_eq!(file.relative_path, "/notes.txt");
        assert_eq!(f.history.recent_files(1), vec![file.path]);
    }

    #[test]
    fn write_then_read_binary() {
        let f = fixture();
        let payload = [0u8, 1, 2, 255, 10, 0x1F];
        f.store
            .write("blob.bin", &BASE64.encode(payload), true)
            .unwrap();
        let file = f.store.read("blob.bin").unwrap();
        assert!(file.is_binary);
        assert!(!file.editable);
        assert!(file.content.is_none());
        let decoded = BASE64.decode(file.content_base64.unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn read_errors_and_limits() {
        let f = fixture();
        assert!(matches!(f.store.read("missing.txt"), Err(IdeError::NotFound(_))));
        assert!(matches!(f.store.read("src"), Err(IdeError::IsADirectory)));

        f.store.write("big.txt", &"x".repeat(2048), false).unwrap();
        assert!(matches!(f.store.read("big.txt"), Err(IdeError::TooLarge { .. })));

        f.store.write("medium.txt", &"x".repeat(64), false).unwrap();
        assert!(!f.store.read("medium.txt").unwrap().editable);
    }

    #[test]
    fn write_into_missing_parent_fails() {
        let f = fixture();
        assert!(matches!(
            f.store.write("no/such/dir.txt", "x", false),
            Err(IdeError::ParentMissing)
        ));
        assert!(matches!(
            f.store.write("b.txt/child", "x", false),
            Err(IdeError::ParentMissing)
        ));
        assert!(matches!(
            f.store.write("x.bin", "%%%", true),
            Err(IdeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn mkdir_creates_intermediates_and_rejects_existing() {
        let f = fixture();
        let created = f.store.mkdir("deep/er/dir").unwrap();
        assert_eq!(created.relative_path, "/deep/er/dir");
        assert!(f.store.guard().root().join("deep/er/dir").is_dir());
        assert!(matches!(
            f.store.mkdir("deep/er/dir"),
            Err(IdeError::AlreadyExists(_))
        ));
        assert!(matches!(
            f.store.mkdir("fresh/../../escape"),
            Err(IdeError::InvalidPath)
        ));
        assert!(matches!(
            f.store.mkdir("../outside"),
            Err(IdeError::AccessDenied(_))
        ));
        assert!(matches!(
            f.store.mkdir("fresh/node_modules/x"),
            Err(IdeError::AccessDenied(_))
        ));
    }

    #[test]
    fn delete_twice_reports_not_found() {
        let f = fixture();
        f.store.write("notes.txt", "hello", false).unwrap();
        f.store.delete("notes.txt").unwrap();
        assert!(matches!(f.store.read("notes.txt"), Err(IdeError::NotFound(_))));
        assert!(matches!(f.store.delete("notes.txt"), Err(IdeError::NotFound(_))));

        f.store.delete("src").unwrap();
        assert!(!f.store.guard().root().join("src").exists());
    }

    #[test]
    fn root_cannot_be_deleted() {
        let f = fixture();
        assert!(matches!(f.store.delete("."), Err(IdeError::Forbidden(_))));
        assert!(matches!(f.store.delete(""), Err(IdeError::Forbidden(_))));
    }

    #[test]
    fn rename_checks_both_ends() {
        let f = fixture();
        let renamed = f.store.rename("b.txt", "c.txt").unwrap();
        assert!(renamed.new_path.ends_with("c.txt"));
        assert!(matches!(
            f.store.rename("b.txt", "d.txt"),
            Err(IdeError::NotFound(_))
        ));
        assert!(matches!(
            f.store.rename("c.txt", "A.md"),
            Err(IdeError::AlreadyExists(_))
        ));
        assert!(matches!(
            f.store.rename("c.txt", "../c.txt"),
            Err(IdeError::AccessDenied(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_links_cannot_be_written_through() {
        let f = fixture();
        let root = f.store.guard().root().to_path_buf();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("pwned.txt");
        std::os::unix::fs::symlink(&target, root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone"), root.join("dirlink")).unwrap();

        assert!(matches!(
            f.store.write("link.txt", "escaped", false),
            Err(IdeError::AccessDenied(_))
        ));
        assert!(matches!(f.store.mkdir("link.txt"), Err(IdeError::AccessDenied(_))));
        assert!(matches!(
            f.store.mkdir("dirlink/sub"),
            Err(IdeError::AccessDenied(_))
        ));
        assert!(matches!(
            f.store.rename("b.txt", "link.txt"),
            Err(IdeError::AccessDenied(_))
        ));
        assert!(!target.exists());
        assert!(!outside.path().join("gone").exists());
        assert_eq!(fs::read_to_string(root.join("b.txt")).unwrap(), "b");
    }

    #[cfg(unix)]
    #[test]
    fn delete_and_rename_act_on_the_link() {
        let f = fixture();
        let root = f.store.guard().root().to_path_buf();
        std::os::unix::fs::symlink(root.join("src"), root.join("shortcut")).unwrap();

        let renamed = f.store.rename("shortcut", "alias").unwrap();
        assert_eq!(renamed.new_path, root.join("alias").display().to_string());
        assert!(fs::symlink_metadata(root.join("alias")).unwrap().file_type().is_symlink());
        assert!(root.join("src/app.js").is_file());

        let deleted = f.store.delete("alias").unwrap();
        assert_eq!(deleted.deleted, root.join("alias").display().to_string());
        assert!(fs::symlink_metadata(root.join("alias")).is_err());
        assert!(root.join("src/app.js").is_file());

        // Dangling links can be cleaned up too.
        std::os::unix::fs::symlink(root.join("nowhere"), root.join("stale")).unwrap();
        f.store.delete("stale").unwrap();
        assert!(fs::symlink_metadata(root.join("stale")).is_err());
    }

    #[test]
    fn every_operation_rejects_escapes() {
        let f = fixture();
        let escape = "../../etc/passwd";
        let denied = |r: Result<()>| matches!(r, Err(IdeError::AccessDenied(_)));
        assert!(denied(f.store.list("..").map(|_| ())));
        assert!(denied(f.store.read(escape).map(|_| ())));
        assert!(denied(f.store.write("../x.txt", "x", false).map(|_| ())));
        assert!(denied(f.store.mkdir("../newdir").map(|_| ())));
        assert!(denied(f.store.delete(escape).map(|_| ())));
        assert!(denied(f.store.rename("b.txt", escape).map(|_| ())));
        assert!(denied(
            f.store
                .search("x", "..", &SearchOptions::default())
                .map(|_| ())
        ));
    }

    #[test]
    fn binary_sniffing() {
        assert!(!is_binary_content(b"plain\ttext\r\nok"));
        assert!(is_binary_content(b"\x00\x01"));
        assert!(is_binary_content(b"esc \x1b[0m"));
        let mut late = vec![b'a'; BINARY_SNIFF_LEN];
        late.push(0);
        assert!(!is_binary_content(&late));
    }
}
