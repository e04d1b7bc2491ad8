/// Command Service
/// One-shot, non-interactive commands confined to Root.
///
/// Output is fully buffered and returned once the process exits. Long-running
/// or interactive programs belong in a terminal session instead.

use crate::error::{IdeError, Result};
use crate::models::CommandExecution;
use crate::services::history::HistoryStore;
use crate::services::path_guard::PathGuard;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const FIXED_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

pub struct CommandRunner {
    guard: PathGuard,
    history: Arc<dyn HistoryStore>,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// `timeout: None` waits for the command however long it runs.
    pub fn new(guard: PathGuard, history: Arc<dyn HistoryStore>, timeout: Option<Duration>) -> Self {
        Self {
            guard,
            history,
            timeout,
        }
    }

    /// Working directory for `cwd`: validated when given, Root otherwise.
    /// A directory that no longer exists falls back to Root.
    pub fn working_dir(&self, cwd: Option<&str>) -> Result<PathBuf> {
        let dir = match cwd.map(str::trim).filter(|c| !c.is_empty()) {
            Some(cwd) => self.guard.validate(cwd)?,
            None => self.guard.root().to_path_buf(),
        };
        if dir.is_dir() {
            Ok(dir)
        } else {
            log::debug!("[Exec] {} is not a directory, using root", dir.display());
            Ok(self.guard.root().to_path_buf())
        }
    }

    /// Blocks until the command exits (or the configured timeout fires).
    pub fn exec(&self, command: &str, cwd: Option<&str>) -> Result<CommandExecution> {
        if command.trim().is_empty() {
            return Err(IdeError::InvalidRequest("no command".into()));
        }
        let working_dir = self.working_dir(cwd)?;
        self.history.record_command(command, &working_dir);
        log::info!("[Exec] {:?} in {}", command, working_dir.display());

        let mut child = shell_command(command, &working_dir)
            .spawn()
            .map_err(|e| IdeError::ProcessSpawnFailed(e.to_string()))?;

        let stdout = collect(child.stdout.take());
        let stderr = collect(child.stderr.take());
        let (status, timed_out) = wait(&mut child, self.timeout)?;
        let output = stdout.join().unwrap_or_default();
        let error_output = stderr.join().unwrap_or_default();

        let exit_code = if timed_out { -1 } else { status.code().unwrap_or(-1) };
        if timed_out {
            log::warn!("[Exec] {:?} timed out and was killed", command);
        }

        Ok(CommandExecution {
            command: command.to_string(),
            success: exit_code == 0,
            output: String::from_utf8_lossy(&output).into_owned(),
            error_output: String::from_utf8_lossy(&error_output).into_owned(),
            exit_code,
            cwd: working_dir.display().to_string(),
            timed_out,
        })
    }
}

/// Shell invocation with a small explicit environment; nothing is inherited
/// beyond HOME and USER.
fn shell_command(command: &str, cwd: &Path) -> Command {
    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    cmd.current_dir(cwd)
        .env_clear()
        .env("PATH", FIXED_PATH)
        .env(
            "HOME",
            std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()),
        )
        .env(
            "USER",
            std::env::var("USER").unwrap_or_else(|_| "www-data".to_string()),
        )
        .env("TERM", "xterm-256color")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group, so a timeout can take down everything it started.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

fn collect<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<(std::process::ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait()?, false));
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            kill_tree(child);
            return Ok((child.wait()?, true));
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    unsafe {
        libc::kill(-(child.id() as i32), libc::SIGKILL);
    }
    let _ = child.kill();
}
