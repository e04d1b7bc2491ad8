/// Error types shared by every service.
///
/// Each variant maps to one failure kind the web client knows how to show.
/// Nothing here is fatal to the server: a failure is scoped to the request
/// or terminal session that raised it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdeError {
    #[error("Invalid path")]
    InvalidPath,

    /// Path resolved outside Root or through a denylisted segment.
    #[error("Access denied: {0}")]
    AccessDenied(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not a directory")]
    NotADirectory,

    #[error("Path is a directory")]
    IsADirectory,

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("File too large (max {max_mb}MB)")]
    TooLarge { max_mb: u64 },

    #[error("Parent directory does not exist")]
    ParentMissing,

    #[error("Failed to write file: {0}")]
    WriteFailed(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    #[error("{0} is disabled")]
    FeatureDisabled(&'static str),

    #[error("Failed to start process: {0}")]
    ProcessSpawnFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IdeError {
    /// Stable machine-readable code sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            IdeError::InvalidPath => "invalid_path",
            IdeError::AccessDenied(_) => "access_denied",
            IdeError::NotFound(_) => "not_found",
            IdeError::NotADirectory => "not_a_directory",
            IdeError::IsADirectory => "is_a_directory",
            IdeError::AlreadyExists(_) => "already_exists",
            IdeError::TooLarge { .. } => "too_large",
            IdeError::ParentMissing => "parent_missing",
            IdeError::WriteFailed(_) => "write_failed",
            IdeError::Forbidden(_) => "forbidden",
            IdeError::DependencyMissing(_) => "dependency_missing",
            IdeError::FeatureDisabled(_) => "feature_disabled",
            IdeError::ProcessSpawnFailed(_) => "process_spawn_failed",
            IdeError::CommandFailed(_) => "command_failed",
            IdeError::InvalidRequest(_) => "invalid_request",
            IdeError::Unauthorized => "unauthorized",
            IdeError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, IdeError>;
