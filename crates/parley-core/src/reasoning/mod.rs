//! Grounded reasoning client
//!
//! - `anthropic` - messages API implementation of `GroundedReasoner`
//! - `retry` - backoff shared by reasoning calls

mod anthropic;
pub mod retry;

pub use anthropic::{build_prompt, parse_answer, AnthropicReasoner};
