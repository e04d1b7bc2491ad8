/// History Service
/// Command history and recently opened files.
///
/// Constructed explicitly and handed to the services that record into it,
/// so tests can swap in [`MemoryHistory`].

use crate::models::CommandRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait HistoryStore: Send + Sync {
    fn record_command(&self, command: &str, cwd: &Path);
    /// Newest first.
    fn commands(&self, limit: usize) -> Vec<CommandRecord>;
    fn record_recent_file(&self, path: &Path);
    /// Most recently opened first.
    fn recent_files(&self, limit: usize) -> Vec<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct Retention {
    pub commands: usize,
    pub recent_files: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Entries {
    /// Oldest at the front.
    commands: VecDeque<CommandRecord>,
    /// Most recent at the front.
    recent_files: VecDeque<String>,
}

impl Entries {
    fn push_command(&mut self, command: &str, cwd: &Path, keep: usize) {
        self.commands.push_back(CommandRecord {
            command: command.to_string(),
            cwd: cwd.display().to_string(),
            executed_at: now_secs(),
        });
        while self.commands.len() > keep {
            self.commands.pop_front();
        }
    }

    fn push_recent(&mut self, path: &Path, keep: usize) {
        let path = path.display().to_string();
        self.recent_files.retain(|p| *p != path);
        self.recent_files.push_front(path);
        self.recent_files.truncate(keep);
    }

    fn commands(&self, limit: usize) -> Vec<CommandRecord> {
        self.commands.iter().rev().take(limit).cloned().collect()
    }

    fn recent_files(&self, limit: usize) -> Vec<String> {
        self.recent_files.iter().take(limit).cloned().collect()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// In-process store; contents vanish with the process.
pub struct MemoryHistory {
    retention: Retention,
    entries: Mutex<Entries>,
}

impl MemoryHistory {
    pub fn new(retention: Retention) -> Self {
        Self {
            retention,
            entries: Mutex::new(Entries::default()),
        }
    }
}

impl HistoryStore for MemoryHistory {
    fn record_command(&self, command: &str, cwd: &Path) {
        self.entries
            .lock()
            .push_command(command, cwd, self.retention.commands);
    }

    fn commands(&self, limit: usize) -> Vec<CommandRecord> {
        self.entries.lock().commands(limit)
    }

    fn record_recent_file(&self, path: &Path) {
        self.entries
            .lock()
            .push_recent(path, self.retention.recent_files);
    }

    fn recent_files(&self, limit: usize) -> Vec<String> {
        self.entries.lock().recent_files(limit)
    }
}

/// JSON file store, rewritten after every change.
pub struct JsonHistory {
    path: PathBuf,
    retention: Retention,
    entries: Mutex<Entries>,
}

impl JsonHistory {
    /// Opens `path`, starting empty when it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>, retention: Retention) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("[History] Ignoring corrupt {}: {}", path.display(), e);
                Entries::default()
            }),
            Err(_) => Entries::default(),
        };
        Self {
            path,
            retention,
            entries: Mutex::new(entries),
        }
    }

    fn persist(&self, entries: &Entries) {
        if let Err(e) = self.write_atomically(entries) {
            log::warn!("[History] Failed to save {}: {}", self.path.display(), e);
        }
    }

    fn write_atomically(&self, entries: &Entries) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl HistoryStore for JsonHistory {
    fn record_command(&self, command: &str, cwd: &Path) {
        let mut entries = self.entries.lock();
        entries.push_command(command, cwd, self.retention.commands);
        self.persist(&entries);
    }

    fn commands(&self, limit: usize) -> Vec<CommandRecord> {
        self.entries.lock().commands(limit)
    }

    fn record_recent_file(&self, path: &Path) {
        let mut entries = self.entries.lock();
        entries.push_recent(path, self.retention.recent_files);
        self.persist(&entries);
    }

    fn recent_files(&self, limit: usize) -> Vec<String> {
        self.entries.lock().recent_files(limit)
    }
}
