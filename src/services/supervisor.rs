/// Terminal Supervisor
/// Starts, stops and reports on the detached terminal-host process.
///
/// State lives on disk (`terminal.pid`, `terminal.log` under the data
/// directory) so a restarted server still finds a host it launched earlier.

use crate::error::{IdeError, Result};
use crate::models::{StopOutcome, SupervisorStatus};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const LOG_TAIL_LINES: usize = 20;

/// Environment variable the host reads its access token from.
pub const PASSWORD_ENV: &str = "CODEDEN_PASSWORD";

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub enabled: bool,
    pub port: u16,
    pub shell: String,
    pub data_dir: PathBuf,
    /// Passed to the host as `--config`.
    pub config_path: Option<PathBuf>,
    pub password: Option<String>,
    /// Host executable; the running binary when unset.
    pub program: Option<PathBuf>,
    pub start_grace: Duration,
    pub stop_grace: Duration,
}

impl SupervisorOptions {
    pub fn new(enabled: bool, port: u16, shell: impl Into<String>, data_dir: PathBuf) -> Self {
        Self {
            enabled,
            port,
            shell: shell.into(),
            data_dir,
            config_path: None,
            password: None,
            program: None,
            start_grace: Duration::from_millis(500),
            stop_grace: Duration::from_secs(1),
        }
    }
}

pub struct TerminalSupervisor {
    options: SupervisorOptions,
    /// The host this supervisor launched, kept so it can be reaped.
    child: Mutex<Option<Child>>,
}

impl TerminalSupervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            child: Mutex::new(None),
        }
    }

    pub fn pid_file(&self) -> PathBuf {
        self.options.data_dir.join("terminal.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.options.data_dir.join("terminal.log")
    }

    pub fn status(&self) -> SupervisorStatus {
        let pid = self.live_pid();
        SupervisorStatus {
            running: pid.is_some(),
            pid,
            port: self.options.port,
            enabled: self.options.enabled,
            already_running: false,
        }
    }

    /// Blocks for the start grace period.
    pub fn start(&self) -> Result<SupervisorStatus> {
        if !self.options.enabled {
            return Err(IdeError::FeatureDisabled("Interactive terminal"));
        }
        if let Some(pid) = self.live_pid() {
            log::info!("[Supervisor] Terminal host already running (pid {})", pid);
            return Ok(SupervisorStatus {
                already_running: true,
                ..self.status()
            });
        }

        let program = self.host_program()?;
        which::which(&self.options.shell).map_err(|_| {
            IdeError::DependencyMissing(format!("shell {} not found", self.options.shell))
        })?;

        fs::create_dir_all(&self.options.data_dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file())?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&program);
        cmd.arg("terminal-host")
            .arg("--port")
            .arg(self.options.port.to_string())
            .arg("--shell")
            .arg(&self.options.shell)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(config) = &self.options.config_path {
            cmd.arg("--config").arg(config);
        }
        if let Some(password) = &self.options.password {
            cmd.env(PASSWORD_ENV, password);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            IdeError::ProcessSpawnFailed(format!("Failed to launch {}: {}", program.display(), e))
        })?;
        let pid = child.id();
        log::info!("[Supervisor] Launched terminal host (pid {}) on port {}", pid, self.options.port);

        thread::sleep(self.options.start_grace);
        if let Ok(Some(status)) = child.try_wait() {
            log::warn!("[Supervisor] Terminal host exited early: {}", status);
            return Err(IdeError::ProcessSpawnFailed(self.log_tail()));
        }

        fs::write(self.pid_file(), pid.to_string())?;
        *self.child.lock() = Some(child);

        Ok(SupervisorStatus {
            running: true,
            pid: Some(pid),
            port: self.options.port,
            enabled: true,
            already_running: false,
        })
    }

    /// Blocks for up to the stop grace period.
    pub fn stop(&self) -> Result<StopOutcome> {
        let Some(pid) = self.live_pid() else {
            return Ok(StopOutcome {
                running: false,
                stopped: false,
            });
        };

        log::info!("[Supervisor] Stopping terminal host (pid {})", pid);
        signal(pid, Signal::Terminate);
        let deadline = Instant::now() + self.options.stop_grace;
        while Instant::now() < deadline && self.is_alive(pid) {
            thread::sleep(Duration::from_millis(50));
        }
        if self.is_alive(pid) {
            log::warn!("[Supervisor] Terminal host ignored SIGTERM, killing");
            signal(pid, Signal::Kill);
        }
        if let Some(mut child) = self.child.lock().take() {
            if child.id() == pid {
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        self.clear_pid_file();
        Ok(StopOutcome {
            running: false,
            stopped: true,
        })
    }

    fn host_program(&self) -> Result<PathBuf> {
        let program = match &self.options.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()
                .map_err(|e| IdeError::DependencyMissing(format!("terminal host binary: {}", e)))?,
        };
        if !program.is_file() {
            return Err(IdeError::DependencyMissing(format!(
                "terminal host binary {} not found",
                program.display()
            )));
        }
        Ok(program)
    }

    fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
    }

    /// Recorded pid if that process still exists; a stale file is removed.
    fn live_pid(&self) -> Option<u32> {
        let pid = self.read_pid()?;
        if self.is_alive(pid) {
            Some(pid)
        } else {
            log::info!("[Supervisor] Clearing stale pid {}", pid);
            self.clear_pid_file();
            None
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut retained = self.child.lock();
        if let Some(child) = retained.as_mut() {
            if child.id() == pid {
                return match child.try_wait() {
                    Ok(None) => true,
                    _ => {
                        *retained = None;
                        false
                    }
                };
            }
        }
        process_exists(pid)
    }

    fn clear_pid_file(&self) {
        let _ = fs::remove_file(self.pid_file());
    }

    fn log_tail(&self) -> String {
        let log = fs::read_to_string(self.log_file()).unwrap_or_default();
        let lines: Vec<&str> = log.lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL_LINES);
        let tail = lines[start..].join("\n");
        if tail.is_empty() {
            "terminal host exited during startup".to_string()
        } else {
            tail
        }
    }
}

enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal(pid: u32, signal: Signal) {
    // The host leads its own process group; the forceful kill takes the group.
    let (target, sig) = match signal {
        Signal::Terminate => (pid as i32, libc::SIGTERM),
        Signal::Kill => (-(pid as i32), libc::SIGKILL),
    };
    unsafe {
        libc::kill(target, sig);
    }
}

#[cfg(not(unix))]
fn signal(_pid: u32, _signal: Signal) {}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_exists(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn options(dir: &tempfile::TempDir, program: Option<PathBuf>) -> SupervisorOptions {
        let mut options = SupervisorOptions::new(true, 3999, "/bin/sh", dir.path().join("data"));
        options.program = program;
        options.start_grace = Duration::from_millis(300);
        options.stop_grace = Duration::from_millis(500);
        options
    }

    #[test]
    fn disabled_feature_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(&dir, None);
        options.enabled = false;
        let supervisor = TerminalSupervisor::new(options);
        assert!(matches!(supervisor.start(), Err(IdeError::FeatureDisabled(_))));
        let status = supervisor.status();
        assert!(!status.running);
        assert!(!status.enabled);
    }

    #[test]
    fn missing_dependencies_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor =
            TerminalSupervisor::new(options(&dir, Some(dir.path().join("no-such-binary"))));
        assert!(matches!(supervisor.start(), Err(IdeError::DependencyMissing(_))));

        let host = script(dir.path(), "host", "exec sleep 30");
        let mut opts = options(&dir, Some(host));
        opts.shell = "definitely-not-a-shell-xyz".into();
        let supervisor = TerminalSupervisor::new(opts);
        assert!(matches!(supervisor.start(), Err(IdeError::DependencyMissing(_))));
    }

    #[test]
    fn start_status_stop_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let host = script(dir.path(), "host", "echo host up\nexec sleep 30");
        let supervisor = TerminalSupervisor::new(options(&dir, Some(host)));

        let started = supervisor.start().unwrap();
        assert!(started.running);
        assert!(!started.already_running);
        let pid = started.pid.unwrap();
        assert_eq!(fs::read_to_string(supervisor.pid_file()).unwrap(), pid.to_string());

        let again = supervisor.start().unwrap();
        assert!(again.already_running);
        assert_eq!(again.pid, Some(pid));

        assert_eq!(
            supervisor.stop().unwrap(),
            StopOutcome {
                running: false,
                stopped: true
            }
        );
        assert!(!supervisor.status().running);
        assert!(!supervisor.pid_file().exists());
        assert!(fs::read_to_string(supervisor.log_file()).unwrap().contains("host up"));

        // Idempotent.
        assert!(!supervisor.stop().unwrap().stopped);
    }

    #[test]
    fn early_exit_surfaces_log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let host = script(dir.path(), "host", "echo port already in use >&2\nexit 1");
        let supervisor = TerminalSupervisor::new(options(&dir, Some(host)));
        match supervisor.start() {
            Err(IdeError::ProcessSpawnFailed(detail)) => {
                assert!(detail.contains("port already in use"), "{detail}")
            }
            other => panic!("expected spawn failure, got {other:?}"),
        }
        assert!(!supervisor.pid_file().exists());
    }

    #[test]
    fn stale_pid_file_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = TerminalSupervisor::new(options(&dir, None));
        fs::create_dir_all(dir.path().join("data")).unwrap();

        let mut gone = Command::new("true").spawn().unwrap();
        let pid = gone.id();
        gone.wait().unwrap();
        fs::write(supervisor.pid_file(), pid.to_string()).unwrap();

        let status = supervisor.status();
        assert!(!status.running);
        assert_eq!(status.pid, None);
        assert!(!supervisor.pid_file().exists());
    }

    #[test]
    fn stubborn_host_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let host = script(dir.path(), "host", "trap '' TERM\nwhile true; do sleep 1; done");
        let supervisor = TerminalSupervisor::new(options(&dir, Some(host)));
        supervisor.start().unwrap();
        assert!(supervisor.stop().unwrap().stopped);
        assert!(!supervisor.status().running);
    }
}
