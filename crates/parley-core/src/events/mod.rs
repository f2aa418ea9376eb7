//! Event channel and event types
//!
//! - `EventChannel` - synchronous typed publish/subscribe with history
//! - `AgentEvent` / `EventEnvelope` - payloads and recorded emissions
//! - `Subscription` - idempotent, drop-scoped registration handle

mod channel;
mod types;

pub use channel::{EventChannel, Subscription, WeakEventChannel};
pub use types::{AgentEvent, EventEnvelope, EventKind, OutputStream, ThinkingStage};
