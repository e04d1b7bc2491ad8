/// Models module
/// Data types exchanged with the web client.
/// Everything here is serializable; the HTTP layer flattens results into
/// `{success: true, ...}` and the terminal channel sends envelopes as-is.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One row of a directory listing. Computed fresh on every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    pub relative_path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub modified: u64,
    pub readable: bool,
    pub writable: bool,
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: String,
    pub relative_path: String,
    pub items: Vec<DirectoryEntry>,
}

/// File payload. Exactly one of `content` / `content_base64` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub relative_path: String,
    pub content: Option<String>,
    pub content_base64: Option<String>,
    pub is_binary: bool,
    pub size: u64,
    pub editable: bool,
    pub language: String,
    pub modified: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub path: String,
    pub relative_path: String,
    pub size: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedDirectory {
    pub path: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameResult {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_results: usize,
    pub include_content: bool,
    /// Glob matched against the file name only.
    pub file_pattern: String,
    pub case_sensitive: bool,
    pub is_regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            include_content: true,
            file_pattern: "*".to_string(),
            case_sensitive: false,
            is_regex: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub file: String,
    pub relative_path: String,
    pub line: usize,
    #[serde(rename = "match")]
    pub matched: String,
    /// The whole matching line, trimmed.
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub path: String,
    pub results: Vec<SearchHit>,
    pub total: usize,
}

/// Outcome of one non-interactive command. Returned once, never kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub output: String,
    pub error_output: String,
    pub exit_code: i32,
    pub cwd: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

/// Persisted command-history row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRecord {
    pub command: String,
    pub cwd: String,
    pub executed_at: u64,
}

/// Client -> server terminal envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEnvelope {
    Input {
        data: String,
    },
    Resize {
        #[serde(default)]
        cols: u16,
        #[serde(default)]
        rows: u16,
    },
    Ping,
}

/// Server -> client terminal envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEnvelope {
    Output {
        data: String,
    },
    Exit {
        #[serde(rename = "exitCode")]
        exit_code: i32,
        /// Number of the signal that killed the shell.
        signal: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Pong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
    Failed,
}

/// Snapshot of a live terminal session, for logs and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub pid: Option<u32>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisorStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub port: u16,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub already_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopOutcome {
    pub running: bool,
    /// False when nothing was running.
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitFileStatus {
    pub status: String,
    pub file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitStatus {
    pub branch: String,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub staged: Vec<GitFileStatus>,
    pub unstaged: Vec<GitFileStatus>,
    pub untracked: Vec<String>,
}

/// Output of a mutating version-control command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOutput {
    pub output: String,
}
