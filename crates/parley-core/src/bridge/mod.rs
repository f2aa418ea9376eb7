//! Command bridge between the orchestration graph and the command runtime
//!
//! One call to [`CommandBridge::run`] is one command session:
//! 1. Subscribe to output and exit events for a fresh session id
//! 2. Emit `AGENT_EXEC_CMD`
//! 3. Race the exit event against the timeout
//!
//! Both subscriptions are released on every path out of the session,
//! including the timeout path.

mod extract;

pub use extract::{extract_command, ExtractedCommand};

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::{exit_codes, timeouts};
use crate::error::CommandError;
use crate::events::{AgentEvent, EventChannel, EventKind, OutputStream, Subscription};

/// Source tag on events emitted by the bridge
const EVENT_SOURCE: &str = "command_bridge";

/// Captured result of one command session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Outcome of the tool execution step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Option<CommandOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    /// Failure before anything ran (no data)
    pub fn failure(error: &CommandError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    fn from_exit(output: CommandOutput) -> Self {
        let success = output.exit_code == 0;
        let error = (!success).then(|| CommandError::NonZeroExit(output.exit_code).to_string());
        Self {
            success,
            data: Some(output),
            error,
        }
    }

    fn interrupted(output: CommandOutput, error: &CommandError) -> Self {
        Self {
            success: false,
            data: Some(output),
            error: Some(error.to_string()),
        }
    }
}

/// What the session's subscriptions forward to the waiting future
enum SessionSignal {
    Output(OutputStream, String),
    Exit(i32),
}

/// Dispatches commands over the event channel and waits for their exit
#[derive(Debug, Clone)]
pub struct CommandBridge {
    events: EventChannel,
    timeout: Duration,
}

impl CommandBridge {
    pub fn new(events: EventChannel) -> Self {
        Self {
            events,
            timeout: timeouts::COMMAND,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extract a command from `text` and run it
    ///
    /// Returns a "could not extract command" failure without emitting
    /// anything when no command is found.
    pub async fn execute(&self, text: &str) -> ToolOutput {
        match extract_command(text) {
            Some(command) => self.run(command).await,
            None => {
                warn!(text, "No command found in message");
                ToolOutput::failure(&CommandError::NoCommand)
            }
        }
    }

    /// Run one command session to completion or timeout
    pub async fn run(&self, command: ExtractedCommand) -> ToolOutput {
        let session_id = Uuid::new_v4();
        let command_line = command.to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Subscribe before emitting: a runtime may answer synchronously
        let output_sub = self.forward(EventKind::RuntimeOutput, session_id, tx.clone());
        let exit_sub = self.forward(EventKind::RuntimeExit, session_id, tx);

        info!(session_id = %session_id, command = %command_line, "Dispatching command");
        self.events.emit(
            AgentEvent::AgentExecCmd {
                session_id,
                command: command.command,
                args: command.args,
                timestamp: Utc::now(),
            },
            Some(EVENT_SOURCE),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                // Drain queued output before looking at the clock
                biased;
                signal = rx.recv() => match signal {
                    Some(SessionSignal::Output(OutputStream::Stdout, data)) => stdout.push_str(&data),
                    Some(SessionSignal::Output(OutputStream::Stderr, data)) => stderr.push_str(&data),
                    Some(SessionSignal::Exit(code)) => break Ok(code),
                    None => break Err(CommandError::RuntimeDisconnected),
                },
                _ = &mut deadline => break Err(CommandError::Timeout(self.timeout)),
            }
        };

        output_sub.unsubscribe();
        exit_sub.unsubscribe();

        match outcome {
            Ok(exit_code) => {
                info!(session_id = %session_id, exit_code, "Command finished");
                ToolOutput::from_exit(CommandOutput {
                    command: command_line,
                    stdout,
                    stderr,
                    exit_code,
                })
            }
            Err(error) => {
                warn!(session_id = %session_id, command = %command_line, "Command session ended: {}", error);
                ToolOutput::interrupted(
                    CommandOutput {
                        command: command_line,
                        stdout,
                        stderr,
                        exit_code: exit_codes::TIMED_OUT,
                    },
                    &error,
                )
            }
        }
    }

    fn forward(
        &self,
        kind: EventKind,
        session_id: Uuid,
        tx: mpsc::UnboundedSender<SessionSignal>,
    ) -> Subscription {
        self.events.subscribe(kind, move |envelope| {
            let signal = match &envelope.event {
                AgentEvent::RuntimeOutput {
                    session_id: sid,
                    stream,
                    data,
                } if *sid == session_id => SessionSignal::Output(*stream, data.clone()),
                AgentEvent::RuntimeExit {
                    session_id: sid,
                    exit_code,
                } if *sid == session_id => SessionSignal::Exit(*exit_code),
                _ => return,
            };
            // Receiver is gone once the session resolved; late events are dropped
            let _ = tx.send(signal);
        })
    }
}
