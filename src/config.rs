/// Configuration
/// Loaded once at startup from a TOML file, then overridden by CLI flags.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "codeden.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory every file and one-shot command is confined to.
    pub root: PathBuf,
    pub listen: SocketAddr,
    /// Empty means no password.
    pub password: String,
    /// Defaults to `<root>/.codeden` when unset.
    pub data_dir: Option<PathBuf>,
    pub files: FilesConfig,
    pub history: HistoryConfig,
    pub terminal: TerminalConfig,
    pub exec: ExecConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    pub show_hidden: bool,
    pub denied_paths: Vec<String>,
    pub max_file_size: u64,
    pub max_editable_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    pub commands: usize,
    pub recent_files: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerminalConfig {
    /// The interactive shell is not confined to root, so it is opt-in.
    pub enabled: bool,
    pub port: u16,
    pub bind: String,
    pub shell: Option<String>,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            password: String::new(),
            data_dir: None,
            files: FilesConfig::default(),
            history: HistoryConfig::default(),
            terminal: TerminalConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            show_hidden: true,
            denied_paths: [".git", "node_modules", "vendor", ".env", ".codeden"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_size: 10 * 1024 * 1024,
            max_editable_size: 5 * 1024 * 1024,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            commands: 1000,
            recent_files: 50,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 3456,
            bind: "127.0.0.1".to_string(),
            shell: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Read `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::info!("[Config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.root.join(".codeden"))
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec.timeout_secs.map(Duration::from_secs)
    }

    pub fn password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }
}

impl TerminalConfig {
    /// Configured shell, else `$SHELL`, else bash.
    pub fn shell_program(&self) -> String {
        self.shell
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "/bin/bash".to_string())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
