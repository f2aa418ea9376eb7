//! Event payloads and envelopes carried by the event channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription key for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Orchestrator asks the command runtime to run something
    AgentExecCmd,
    /// Runtime streamed a chunk of stdout/stderr
    RuntimeOutput,
    /// Runtime reports the command exited
    RuntimeExit,
    /// Orchestrator progress for UIs
    AgentThinking,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::AgentExecCmd,
            EventKind::RuntimeOutput,
            EventKind::RuntimeExit,
            EventKind::AgentThinking,
        ]
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentExecCmd => "AGENT_EXEC_CMD",
            EventKind::RuntimeOutput => "RUNTIME_OUTPUT",
            EventKind::RuntimeExit => "RUNTIME_EXIT",
            EventKind::AgentThinking => "AGENT_THINKING",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingStage {
    Started,
    Processing,
    Completed,
}

/// Typed event payload
///
/// Every event in a command session carries the `session_id` minted by the
/// command bridge, so overlapping sessions on one channel never see each
/// other's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum AgentEvent {
    AgentExecCmd {
        session_id: Uuid,
        command: String,
        args: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    RuntimeOutput {
        session_id: Uuid,
        stream: OutputStream,
        data: String,
    },
    RuntimeExit {
        session_id: Uuid,
        exit_code: i32,
    },
    AgentThinking {
        stage: ThinkingStage,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::AgentExecCmd { .. } => EventKind::AgentExecCmd,
            AgentEvent::RuntimeOutput { .. } => EventKind::RuntimeOutput,
            AgentEvent::RuntimeExit { .. } => EventKind::RuntimeExit,
            AgentEvent::AgentThinking { .. } => EventKind::AgentThinking,
        }
    }

    /// Correlation id for command-session events
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            AgentEvent::AgentExecCmd { session_id, .. }
            | AgentEvent::RuntimeOutput { session_id, .. }
            | AgentEvent::RuntimeExit { session_id, .. } => Some(*session_id),
            AgentEvent::AgentThinking { .. } => None,
        }
    }

    pub fn thinking(stage: ThinkingStage, message: impl Into<String>) -> Self {
        AgentEvent::AgentThinking {
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn output(session_id: Uuid, stream: OutputStream, data: impl Into<String>) -> Self {
        AgentEvent::RuntimeOutput {
            session_id,
            stream,
            data: data.into(),
        }
    }

    pub fn exit(session_id: Uuid, exit_code: i32) -> Self {
        AgentEvent::RuntimeExit {
            session_id,
            exit_code,
        }
    }
}

/// An emitted event as recorded in the channel history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: AgentEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: AgentEvent, source: Option<&str>) -> Self {
        Self {
            event,
            source: source.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}
