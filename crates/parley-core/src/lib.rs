//! Parley Core - turn orchestration for a voice-and-screen code assistant
//!
//! This crate decides how to answer one incoming user message:
//! - Intent classification and context gathering
//! - Routing between a canned reply and a grounded reasoning call
//! - Command dispatch over an event channel, with a hard timeout
//! - Dual-track answers (a spoken line plus a markdown screen payload)

pub mod bridge;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod graph;
pub mod paths;
pub mod reasoning;
pub mod runtime;
pub mod synthesis;

// Re-exports for convenience
pub use bridge::{CommandBridge, CommandOutput, ToolOutput};
pub use collaborators::{
    DisabledReasoner, FileContentProvider, GroundedAnswer, GroundedReasoner, GroundingRequest,
    StaticFiles, WorkspaceFiles,
};
pub use config::ParleyConfig;
pub use error::{CommandError, ConfigError, ReasoningError};
pub use events::{AgentEvent, EventChannel, EventEnvelope, EventKind, Subscription};
pub use graph::{
    Classification, ConversationMessage, Orchestrator, ReasoningMode, ResponsePlan, TurnState,
    UserIntent,
};
pub use runtime::LocalCommandRuntime;
