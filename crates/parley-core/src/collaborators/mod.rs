//! External collaborators the orchestrator depends on
//!
//! - `FileContentProvider` - active file lookup (`WorkspaceFiles`, `StaticFiles`)
//! - `GroundedReasoner` - the language-model call (`AnthropicReasoner`, `DisabledReasoner`)
//!
//! Both are passed to the orchestrator as trait objects, so tests and
//! embedders can swap in their own.

mod files;

pub use files::{CacheStats, StaticFiles, WorkspaceFiles};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ReasoningError;
use crate::graph::ConversationMessage;

/// Looks up file content for context selection
#[async_trait]
pub trait FileContentProvider: Send + Sync {
    /// Content of `path`, or `None` if it is unknown or unreadable
    async fn active_file_content(&self, path: &str) -> Option<String>;

    /// Other files worth mentioning alongside `path`
    async fn relevant_files(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Grounding material attached to a reasoning request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grounding {
    pub file_path: String,
    pub file_content: String,
    pub pr_title: String,
    pub pr_description: String,
    pub requirements: Vec<String>,
}

/// Everything the reasoning collaborator gets for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingRequest {
    pub user_text: String,
    pub history: Vec<ConversationMessage>,
    pub grounding: Grounding,
}

/// A grounded answer in both output channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedAnswer {
    /// Short spoken-style summary
    pub voice: String,
    /// Markdown for the screen
    pub screen: String,
}

/// The grounded-reasoning call
///
/// `Ok(None)` means no grounded answer is available; the orchestrator
/// treats it the same as an error.
#[async_trait]
pub trait GroundedReasoner: Send + Sync {
    async fn generate_grounded_response(
        &self,
        request: GroundingRequest,
    ) -> Result<Option<GroundedAnswer>, ReasoningError>;
}

/// Reasoner that never answers (offline mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledReasoner;

#[async_trait]
impl GroundedReasoner for DisabledReasoner {
    async fn generate_grounded_response(
        &self,
        _request: GroundingRequest,
    ) -> Result<Option<GroundedAnswer>, ReasoningError> {
        Ok(None)
    }
}
