/// Commands module
/// Action handlers for the HTTP endpoint.
/// Commands act as the boundary between the web client and the services:
/// each one takes parameters, calls exactly one service and passes the
/// result through.

pub mod files;
pub mod git;
pub mod shell;
pub mod terminal;

use crate::config::Config;
use crate::error::{IdeError, Result};
use crate::services::{
    CommandRunner, FileOptions, FileStore, GitCli, HistoryStore, JsonHistory, PathGuard,
    Retention, SupervisorOptions, TerminalSupervisor, VersionControl,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared state behind every request.
pub struct AppState {
    pub files: FileStore,
    pub runner: CommandRunner,
    pub supervisor: TerminalSupervisor,
    pub git: Box<dyn VersionControl>,
    pub history: Arc<dyn HistoryStore>,
    pub root: PathBuf,
    pub terminal_enabled: bool,
    pub terminal_port: u16,
}

impl AppState {
    /// Wire every service from `config`. `config_path` is handed to the
    /// terminal host so it reads the same file.
    pub fn from_config(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let data_dir = config.data_dir();
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            log::warn!("[Server] Cannot create data dir {}: {}", data_dir.display(), e);
        }
        // Pid, log and history files stay out of reach of file actions.
        let guard = PathGuard::new(&config.root, config.files.denied_paths.clone())?
            .with_protected(&data_dir);
        let history: Arc<dyn HistoryStore> = Arc::new(JsonHistory::open(
            data_dir.join("history.json"),
            Retention {
                commands: config.history.commands,
                recent_files: config.history.recent_files,
            },
        ));

        let mut supervisor = SupervisorOptions::new(
            config.terminal.enabled,
            config.terminal.port,
            config.terminal.shell_program(),
            data_dir,
        );
        supervisor.config_path = config_path;
        supervisor.password = config.password().map(str::to_string);

        Ok(Self::new(guard, config, history, TerminalSupervisor::new(supervisor)))
    }

    pub fn new(
        guard: PathGuard,
        config: &Config,
        history: Arc<dyn HistoryStore>,
        supervisor: TerminalSupervisor,
    ) -> Self {
        let files = FileStore::new(
            guard.clone(),
            FileOptions {
                show_hidden: config.files.show_hidden,
                max_file_size: config.files.max_file_size,
                max_editable_size: config.files.max_editable_size,
            },
            history.clone(),
        );
        let runner = CommandRunner::new(guard.clone(), history.clone(), config.exec_timeout());
        Self {
            root: guard.root().to_path_buf(),
            files,
            runner,
            supervisor,
            git: Box::new(GitCli::new(guard)),
            history,
            terminal_enabled: config.terminal.enabled,
            terminal_port: config.terminal.port,
        }
    }
}

fn default_dot() -> String {
    ".".to_string()
}

/// One request to the action endpoint, selected by its `action` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    List {
        #[serde(default = "default_dot")]
        path: String,
    },
    Read {
        path: String,
    },
    Write {
        path: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        base64: bool,
    },
    Mkdir {
        path: String,
    },
    Delete {
        path: String,
    },
    Rename {
        old_path: String,
        new_path: String,
    },
    Search {
        query: String,
        #[serde(default = "default_dot")]
        path: String,
        #[serde(default)]
        max_results: Option<usize>,
        #[serde(default)]
        include_content: Option<bool>,
        #[serde(default)]
        file_pattern: Option<String>,
        #[serde(default)]
        case_sensitive: Option<bool>,
        #[serde(default)]
        is_regex: Option<bool>,
    },
    Exec {
        command: String,
        #[serde(default)]
        cwd: Option<String>,
    },
    History {
        #[serde(default)]
        limit: Option<usize>,
    },
    RecentFiles {
        #[serde(default)]
        limit: Option<usize>,
    },
    Info,
    TerminalStatus,
    TerminalStart,
    TerminalStop,
    GitStatus,
    GitStage {
        #[serde(default)]
        files: Vec<String>,
    },
    GitUnstage {
        #[serde(default)]
        files: Vec<String>,
    },
    GitCommit {
        message: String,
    },
    GitPush,
    GitPull,
    GitDiff {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        staged: bool,
    },
}

impl ActionRequest {
    pub fn parse(body: Value) -> Result<Self> {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        serde_json::from_value(body).map_err(|e| {
            if action.is_empty() {
                IdeError::InvalidRequest("missing action".into())
            } else if e.to_string().starts_with("unknown variant") {
                IdeError::InvalidRequest(format!("Unknown action: {action}"))
            } else {
                IdeError::InvalidRequest(e.to_string())
            }
        })
    }
}

pub(crate) fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| IdeError::Io(e.into()))
}

/// Run one action to completion. Synchronous; the HTTP layer calls it on a
/// blocking worker.
pub fn dispatch(state: &AppState, request: ActionRequest) -> Result<Value> {
    use ActionRequest::*;
    match request {
        List { path } => files::list(state, &path),
        Read { path } => files::read(state, &path),
        Write {
            path,
            content,
            base64,
        } => files::write(state, &path, &content, base64),
        Mkdir { path } => files::mkdir(state, &path),
        Delete { path } => files::delete(state, &path),
        Rename { old_path, new_path } => files::rename(state, &old_path, &new_path),
        Search {
            query,
            path,
            max_results,
            include_content,
            file_pattern,
            case_sensitive,
            is_regex,
        } => {
            let mut options = crate::models::SearchOptions::default();
            if let Some(max) = max_results {
                options.max_results = max;
            }
            if let Some(include) = include_content {
                options.include_content = include;
            }
            if let Some(pattern) = file_pattern.filter(|p| !p.is_empty()) {
                options.file_pattern = pattern;
            }
            options.case_sensitive = case_sensitive.unwrap_or(false);
            options.is_regex = is_regex.unwrap_or(false);
            files::search(state, &query, &path, &options)
        }
        Exec { command, cwd } => shell::exec(state, &command, cwd.as_deref()),
        History { limit } => shell::history(state, limit.unwrap_or(100)),
        RecentFiles { limit } => files::recent_files(state, limit.unwrap_or(20)),
        Info => Ok(serde_json::json!({
            "root": state.root.display().to_string(),
            "version": env!("CARGO_PKG_VERSION"),
            "terminal_enabled": state.terminal_enabled,
            "terminal_port": state.terminal_port,
        })),
        TerminalStatus => terminal::status(state),
        TerminalStart => terminal::start(state),
        TerminalStop => terminal::stop(state),
        GitStatus => git::status(state),
        GitStage { files } => git::stage(state, &files),
        GitUnstage { files } => git::unstage(state, &files),
        GitCommit { message } => git::commit(state, &message),
        GitPush => git::push(state),
        GitPull => git::pull(state),
        GitDiff { file, staged } => git::diff(state, file.as_deref(), staged),
    }
}
