//! In-process command runtime
//!
//! Listens for `AGENT_EXEC_CMD`, runs allow-listed commands as child
//! processes, streams their output line by line as `RUNTIME_OUTPUT`, and
//! finishes every accepted request with exactly one `RUNTIME_EXIT`.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::constants::exit_codes;
use crate::events::{
    AgentEvent, EventChannel, EventKind, OutputStream, Subscription, WeakEventChannel,
};

const EVENT_SOURCE: &str = "local_runtime";

struct ExecRequest {
    session_id: Uuid,
    command: String,
    args: Vec<String>,
}

/// Runs commands requested over an event channel
///
/// Dropping the runtime (or calling [`shutdown`](Self::shutdown)) stops
/// accepting requests and kills in-flight children.
pub struct LocalCommandRuntime {
    subscription: Subscription,
    cancel: CancellationToken,
}

impl LocalCommandRuntime {
    /// Attach to `events` and start the dispatcher
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(events: &EventChannel, config: RuntimeConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = events.subscribe(EventKind::AgentExecCmd, move |envelope| {
            if let AgentEvent::AgentExecCmd {
                session_id,
                command,
                args,
                ..
            } = &envelope.event
            {
                let _ = tx.send(ExecRequest {
                    session_id: *session_id,
                    command: command.clone(),
                    args: args.clone(),
                });
            }
        });

        let cancel = CancellationToken::new();
        tokio::spawn(dispatch(
            events.downgrade(),
            Arc::new(config),
            rx,
            cancel.clone(),
        ));
        info!("Local command runtime started");

        Self {
            subscription,
            cancel,
        }
    }

    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Local command runtime shutting down");
        }
        self.subscription.unsubscribe();
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for LocalCommandRuntime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch(
    events: WeakEventChannel,
    config: Arc<RuntimeConfig>,
    mut rx: mpsc::UnboundedReceiver<ExecRequest>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => {
                    let session = Session {
                        events: events.clone(),
                        session_id: request.session_id,
                    };
                    tokio::spawn(run(session, config.clone(), request, cancel.child_token()));
                }
                None => break,
            },
        }
    }
    debug!("Runtime dispatcher stopped");
}

/// Emits events for one command session
#[derive(Clone)]
struct Session {
    events: WeakEventChannel,
    session_id: Uuid,
}

impl Session {
    fn output(&self, stream: OutputStream, data: String) {
        if let Some(events) = self.events.upgrade() {
            events.emit(
                AgentEvent::output(self.session_id, stream, data),
                Some(EVENT_SOURCE),
            );
        }
    }

    fn exit(&self, exit_code: i32) {
        if let Some(events) = self.events.upgrade() {
            events.emit(
                AgentEvent::exit(self.session_id, exit_code),
                Some(EVENT_SOURCE),
            );
        }
    }

    fn refuse(&self, message: String, exit_code: i32) {
        self.output(OutputStream::Stderr, message);
        self.exit(exit_code);
    }
}

async fn run(
    session: Session,
    config: Arc<RuntimeConfig>,
    request: ExecRequest,
    cancel: CancellationToken,
) {
    let ExecRequest { command, args, .. } = request;

    if !config.is_allowed(&command) {
        warn!(session_id = %session.session_id, command = %command, "Command not allowed");
        session.refuse(
            format!("parley: command not allowed: {}\n", command),
            exit_codes::NOT_ALLOWED,
        );
        return;
    }

    let mut cmd = Command::new(&command);
    cmd.args(&args)
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(session_id = %session.session_id, command = %command, "Failed to spawn: {}", e);
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                exit_codes::NOT_FOUND
            } else {
                exit_codes::NOT_ALLOWED
            };
            session.refuse(format!("parley: {}: {}\n", command, e), code);
            return;
        }
    };
    info!(session_id = %session.session_id, command = %command, "Command started");

    let budget = Arc::new(OutputBudget::new(config.max_output_bytes));
    let stdout_handle = child.stdout.take().map(|out| {
        tokio::spawn(forward_lines(
            out,
            OutputStream::Stdout,
            session.clone(),
            budget.clone(),
        ))
    });
    let stderr_handle = child.stderr.take().map(|err| {
        tokio::spawn(forward_lines(
            err,
            OutputStream::Stderr,
            session.clone(),
            budget.clone(),
        ))
    });

    let deadline = config.command_timeout();
    let exit_code = tokio::select! {
        waited = timeout(deadline, child.wait()) => match waited {
            Ok(Ok(status)) => exit_code_of(status),
            Ok(Err(e)) => {
                warn!(session_id = %session.session_id, "Process wait error: {}", e);
                exit_codes::TIMED_OUT
            }
            Err(_) => {
                let _ = child.kill().await;
                warn!(session_id = %session.session_id, command = %command, "Command exceeded deadline, killed");
                session.output(
                    OutputStream::Stderr,
                    format!(
                        "parley: {} killed after {} seconds\n",
                        command,
                        deadline.as_secs_f64()
                    ),
                );
                exit_codes::TIMED_OUT
            }
        },
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            debug!(session_id = %session.session_id, "Command killed on shutdown");
            exit_codes::TIMED_OUT
        }
    };

    // All output goes out before the exit event
    for handle in [stdout_handle, stderr_handle].into_iter().flatten() {
        let _ = handle.await;
    }

    info!(session_id = %session.session_id, exit_code, "Command exited");
    session.exit(exit_code);
}

/// Byte cap shared by a command's stdout and stderr
struct OutputBudget {
    max: usize,
    used: AtomicUsize,
    truncated: AtomicBool,
}

impl OutputBudget {
    fn new(max: usize) -> Self {
        Self {
            max,
            used: AtomicUsize::new(0),
            truncated: AtomicBool::new(false),
        }
    }

    /// `Ok` if `len` more bytes fit; `Err(true)` on the first overflow only
    fn take(&self, len: usize) -> Result<(), bool> {
        let before = self.used.fetch_add(len, Ordering::Relaxed);
        if before + len <= self.max {
            Ok(())
        } else {
            Err(!self.truncated.swap(true, Ordering::Relaxed))
        }
    }
}

async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    session: Session,
    budget: Arc<OutputBudget>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session_id = %session.session_id, "Output read error: {}", e);
                break;
            }
        }
        // Invalid UTF-8 is replaced, never allowed to end the stream
        let line = String::from_utf8_lossy(&buf);
        let line = line.strip_suffix('\n').unwrap_or(&line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let chunk = format!("{}\n", line);
        match budget.take(chunk.len()) {
            Ok(()) => session.output(stream, chunk),
            Err(true) => session.output(
                OutputStream::Stderr,
                "[output truncated: exceeded size limit]\n".to_string(),
            ),
            // Keep draining so the child never blocks on a full pipe
            Err(false) => {}
        }
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            debug!("Process killed by signal {}", sig);
            return 128 + sig;
        }
    }
    exit_codes::TIMED_OUT
}
