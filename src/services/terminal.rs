/// Terminal Service
/// One interactive shell per WebSocket connection.
///
/// Lifecycle: `Connecting -> Active -> Closed`, or `Connecting -> Failed`
/// when the shell cannot be spawned. The shell is NOT confined to Root; the
/// whole feature is gated behind `terminal.enabled`.

use crate::models::{ClientEnvelope, ServerEnvelope, SessionInfo, SessionState};
use crate::services::pty::{ExitInfo, PtyProcess, PtyStreams, Utf8Stream};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Once the shell has exited, output still in flight is forwarded until the
/// PTY goes quiet for `EXIT_DRAIN_IDLE`, but never for longer than
/// `EXIT_DRAIN_LIMIT`. A background job can keep the PTY open indefinitely.
const EXIT_DRAIN_IDLE: Duration = Duration::from_millis(50);
const EXIT_DRAIN_LIMIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct TerminalOptions {
    pub shell: String,
    pub cols: u16,
    pub rows: u16,
}

impl TerminalOptions {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

struct SessionInner {
    cols: u16,
    rows: u16,
    state: SessionState,
    process: Option<Arc<PtyProcess>>,
}

pub struct TerminalSession {
    id: Uuid,
    cwd: PathBuf,
    inner: Mutex<SessionInner>,
}

impl TerminalSession {
    fn new(cwd: PathBuf, cols: u16, rows: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            cwd,
            inner: Mutex::new(SessionInner {
                cols,
                rows,
                state: SessionState::Connecting,
                process: None,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn activate(&self, process: Arc<PtyProcess>) {
        let mut inner = self.inner.lock();
        inner.process = Some(process);
        inner.state = SessionState::Active;
    }

    fn set_state(&self, state: SessionState) {
        self.inner.lock().state = state;
    }

    fn resize(&self, cols: u16, rows: u16) {
        let mut inner = self.inner.lock();
        let Some(process) = inner.process.clone() else {
            return;
        };
        match process.resize(cols, rows) {
            Ok(()) => {
                inner.cols = cols;
                inner.rows = rows;
            }
            Err(e) => log::warn!("[Terminal] Resize of {} failed: {}", self.id, e),
        }
    }

    fn process(&self) -> Option<Arc<PtyProcess>> {
        self.inner.lock().process.clone()
    }

    pub fn info(&self) -> SessionInfo {
        let inner = self.inner.lock();
        SessionInfo {
            id: self.id.to_string(),
            cwd: self.cwd.clone(),
            cols: inner.cols,
            rows: inner.rows,
            pid: inner.process.as_ref().and_then(|p| p.pid()),
            state: inner.state,
        }
    }
}

/// Process-wide table of live sessions, keyed by connection.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<TerminalSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, session: Arc<TerminalSession>) {
        self.sessions.lock().insert(session.id, session);
    }

    fn remove(&self, id: Uuid) -> Option<Arc<TerminalSession>> {
        self.sessions.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.sessions.lock().values().map(|s| s.info()).collect()
    }

    /// Kill every live shell. Blocking; used on shutdown.
    pub fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        if !sessions.is_empty() {
            log::info!("[Terminal] Closing {} session(s)", sessions.len());
        }
        for session in sessions {
            if let Some(process) = session.process() {
                process.terminate();
                process.wait();
            }
            session.set_state(SessionState::Closed);
        }
    }
}

/// Working directory for a new session: the requested one, else the user's
/// home, else the temp directory.
pub fn session_cwd(requested: Option<&str>) -> PathBuf {
    requested
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir)
}

async fn send_envelope(
    sink: &mut SplitSink<WebSocket, Message>,
    envelope: &ServerEnvelope,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(envelope) {
        Ok(text) => text,
        Err(e) => {
            log::error!("[Terminal] Failed to encode envelope: {}", e);
            return Ok(());
        }
    };
    sink.send(Message::Text(text)).await
}

fn exit_envelope(exit: ExitInfo, message: Option<String>) -> ServerEnvelope {
    ServerEnvelope::Exit {
        exit_code: exit.exit_code,
        signal: exit.signal,
        message,
    }
}

/// Decode `chunk` and queue it for the client; false once the client is gone.
async fn forward(
    out: &mpsc::Sender<ServerEnvelope>,
    decoder: &mut Utf8Stream,
    chunk: &[u8],
) -> bool {
    let data = decoder.push(chunk);
    data.is_empty() || out.send(ServerEnvelope::Output { data }).await.is_ok()
}

/// Drive one connection from upgrade to teardown.
pub async fn run_session(
    socket: WebSocket,
    cwd: PathBuf,
    options: TerminalOptions,
    registry: Arc<SessionRegistry>,
) {
    let session = Arc::new(TerminalSession::new(cwd.clone(), options.cols, options.rows));
    let id = session.id();
    registry.insert(session.clone());
    log::info!("[Terminal] Session {} connecting in {}", id, cwd.display());

    let (mut ws_tx, mut ws_rx) = socket.split();

    let (process, streams) = match PtyProcess::spawn(&options.shell, &cwd, options.cols, options.rows) {
        Ok((process, streams)) => (Arc::new(process), streams),
        Err(e) => {
            log::error!("[Terminal] Session {} failed: {}", id, e);
            session.set_state(SessionState::Failed);
            let exit = exit_envelope(ExitInfo::failed(), Some(e.to_string()));
            let _ = send_envelope(&mut ws_tx, &exit).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            registry.remove(id);
            return;
        }
    };
    session.activate(process.clone());
    let PtyStreams { mut output, input } = streams;

    let (out_tx, mut out_rx) = mpsc::channel::<ServerEnvelope>(64);

    // The sink is owned here; everything else talks to it through out_tx.
    let mut writer = tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let is_exit = matches!(envelope, ServerEnvelope::Exit { .. });
            if send_envelope(&mut ws_tx, &envelope).await.is_err() {
                break;
            }
            if is_exit {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // PTY -> client until the shell exits, then the exit status.
    let relay_tx = out_tx.clone();
    let relay_process = process.clone();
    let relay = tokio::spawn(async move {
        let mut decoder = Utf8Stream::default();
        let mut waiter = tokio::task::spawn_blocking(move || relay_process.wait());
        let mut output_open = true;
        let exit = loop {
            tokio::select! {
                biased;
                chunk = output.recv(), if output_open => match chunk {
                    Some(chunk) => {
                        if !forward(&relay_tx, &mut decoder, &chunk).await {
                            return;
                        }
                    }
                    None => output_open = false,
                },
                exit = &mut waiter => break exit.unwrap_or_else(|_| ExitInfo::failed()),
            }
        };

        if output_open {
            let limit = Instant::now() + EXIT_DRAIN_LIMIT;
            loop {
                let idle = (Instant::now() + EXIT_DRAIN_IDLE).min(limit);
                match timeout_at(idle, output.recv()).await {
                    Ok(Some(chunk)) => {
                        if !forward(&relay_tx, &mut decoder, &chunk).await {
                            return;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
        let data = decoder.finish();
        if !data.is_empty() {
            let _ = relay_tx.send(ServerEnvelope::Output { data }).await;
        }

        log::info!(
            "[Terminal] Session {} shell exited with {} {:?}",
            id,
            exit.exit_code,
            exit.signal
        );
        let _ = relay_tx.send(exit_envelope(exit, None)).await;
    });

    // client -> PTY
    let inbound = async {
        while let Some(Ok(message)) = ws_rx.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Message::Close(_) => break,
                _ => continue,
            };
            match serde_json::from_str::<ClientEnvelope>(&text) {
                Ok(ClientEnvelope::Input { data }) => {
                    // Waits while the shell is not consuming input.
                    if input.send(data.into_bytes()).await.is_err() {
                        break;
                    }
                }
                Ok(ClientEnvelope::Resize { cols, rows }) => {
                    if cols > 0 && rows > 0 {
                        session.resize(cols, rows);
                    }
                }
                Ok(ClientEnvelope::Ping) => {
                    if out_tx.send(ServerEnvelope::Pong).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::debug!("[Terminal] Session {} ignored message: {}", id, e),
            }
        }
    };

    let client_closed = tokio::select! {
        _ = inbound => true,
        _ = &mut writer => false,
    };

    if client_closed {
        log::info!("[Terminal] Session {} client disconnected", id);
        writer.abort();
        relay.abort();
    }

    let reaper = process.clone();
    let _ = tokio::task::spawn_blocking(move || {
        reaper.terminate();
        reaper.wait();
    })
    .await;

    session.set_state(SessionState::Closed);
    registry.remove(id);
    log::info!("[Terminal] Session {} closed", id);
}
