/// PTY Service
/// Spawns an interactive shell on a pseudo-terminal and exposes its byte
/// streams as bounded channels.
///
/// Reads and writes run on dedicated threads because the PTY file
/// descriptors are blocking. The channels are bounded, so a slow consumer
/// stalls the producer instead of losing bytes.

use crate::error::{IdeError, Result};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtyPair, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// Chunks buffered between the PTY threads and the async side.
const CHANNEL_DEPTH: usize = 64;

/// How the shell ended. A shell killed by a signal reports exit code 0 and
/// the signal number.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitInfo {
    pub exit_code: i32,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn failed() -> Self {
        Self {
            exit_code: -1,
            signal: None,
        }
    }
}

/// Async ends of the PTY byte streams.
pub struct PtyStreams {
    /// Closed once the shell side of the PTY is gone.
    pub output: mpsc::Receiver<Vec<u8>>,
    pub input: mpsc::Sender<Vec<u8>>,
}

/// A live shell process attached to a PTY master.
pub struct PtyProcess {
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    exit: Mutex<Option<ExitInfo>>,
    pid: Option<u32>,
}

impl PtyProcess {
    /// Spawn `shell` in `cwd` with the given size and the inherited
    /// environment plus color-capable terminal variables.
    pub fn spawn(shell: &str, cwd: &Path, cols: u16, rows: u16) -> Result<(Self, PtyStreams)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| IdeError::ProcessSpawnFailed(format!("Failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(cwd);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let PtyPair { master, slave } = pair;
        let child = slave
            .spawn_command(cmd)
            .map_err(|e| IdeError::ProcessSpawnFailed(format!("Failed to spawn shell: {}", e)))?;
        // Our copy of the slave would keep the reader from ever seeing EOF.
        drop(slave);

        let reader = master
            .try_clone_reader()
            .map_err(|e| IdeError::ProcessSpawnFailed(format!("Failed to get PTY reader: {}", e)))?;
        let writer = master
            .take_writer()
            .map_err(|e| IdeError::ProcessSpawnFailed(format!("Failed to get PTY writer: {}", e)))?;

        let output = spawn_reader(reader)?;
        let input = spawn_writer(writer)?;

        let pid = child.process_id();
        let killer = child.clone_killer();
        log::info!(
            "[PTY] Spawned {} (pid {:?}) in {} at {}x{}",
            shell,
            pid,
            cwd.display(),
            cols,
            rows
        );

        Ok((
            Self {
                master: Mutex::new(master),
                child: Mutex::new(child),
                killer: Mutex::new(killer),
                exit: Mutex::new(None),
                pid,
            },
            PtyStreams { output, input },
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .lock()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| IdeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }

    pub fn has_exited(&self) -> bool {
        self.exit.lock().is_some()
    }

    /// Block until the shell exits and return its status. Repeated calls
    /// return the recorded status.
    pub fn wait(&self) -> ExitInfo {
        let mut child = self.child.lock();
        if let Some(info) = self.exit.lock().clone() {
            return info;
        }
        let info = match self.pid {
            #[cfg(unix)]
            Some(pid) => wait_pid(pid),
            _ => child
                .wait()
                .map(|status| ExitInfo {
                    exit_code: status.exit_code() as i32,
                    signal: None,
                }),
        }
        .unwrap_or_else(|e| {
            log::warn!("[PTY] Failed to wait for pid {:?}: {}", self.pid, e);
            ExitInfo::failed()
        });
        *self.exit.lock() = Some(info.clone());
        info
    }

    /// Kill the shell and everything in its process group. Blocks briefly
    /// between the polite and the forceful signal.
    pub fn terminate(&self) {
        if self.has_exited() {
            return;
        }
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                unsafe {
                    // Send SIGHUP/SIGTERM first for graceful shutdown
                    libc::kill(-(pid as i32), libc::SIGHUP);
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
                thread::sleep(Duration::from_millis(100));
                if self.has_exited() {
                    return;
                }
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
        }
        let _ = self.killer.lock().kill();
    }
}

/// Reap `pid` directly; the portable-pty status does not expose the
/// terminating signal.
#[cfg(unix)]
fn wait_pid(pid: u32) -> std::io::Result<ExitInfo> {
    let mut status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, 0) };
        if rc != -1 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(if libc::WIFSIGNALED(status) {
        ExitInfo {
            exit_code: 0,
            signal: Some(libc::WTERMSIG(status)),
        }
    } else {
        ExitInfo {
            exit_code: libc::WEXITSTATUS(status),
            signal: None,
        }
    })
}

fn spawn_reader(mut reader: Box<dyn Read + Send>) -> Result<mpsc::Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);
    thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        // Blocks while the channel is full.
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // EIO once the shell side closes on Linux.
                    Err(_) => break,
                }
            }
        })
        .map_err(|e| IdeError::ProcessSpawnFailed(format!("Failed to start PTY reader: {}", e)))?;
    Ok(rx)
}

fn spawn_writer(mut writer: Box<dyn Write + Send>) -> Result<mpsc::Sender<Vec<u8>>> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);
    thread::Builder::new()
        .name("pty-writer".to_string())
        .spawn(move || {
            while let Some(data) = rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    log::debug!("[PTY] Write failed, stopping input relay: {}", e);
                    break;
                }
            }
        })
        .map_err(|e| IdeError::ProcessSpawnFailed(format!("Failed to start PTY writer: {}", e)))?;
    Ok(tx)
}

/// Incremental UTF-8 decoding across read boundaries.
///
/// A multi-byte character split between two reads is held back until the
/// rest arrives; genuinely invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Stream {
    pending: Vec<u8>,
}

impl Utf8Stream {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end; wait for more.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
