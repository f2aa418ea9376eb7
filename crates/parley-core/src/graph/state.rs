//! Turn state threaded through the orchestration graph
//!
//! Nodes never mutate the state directly. Each returns a [`TurnUpdate`]
//! that the driver merges in: `history` appends, every other field is
//! last-write-wins.

use serde::{Deserialize, Serialize};

use super::classify::Classification;
use crate::bridge::ToolOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior conversational message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Editor context attached to a typed message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,
}

/// What the user asked for this turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserIntent {
    /// Typed message, optionally with the file the user has open
    UserMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<IntentContext>,
    },
    /// Utterance from speech-to-text
    VoiceTranscript { transcript: String },
}

impl UserIntent {
    pub fn message(text: impl Into<String>) -> Self {
        UserIntent::UserMessage {
            text: text.into(),
            context: None,
        }
    }

    pub fn message_with_file(text: impl Into<String>, active_file: impl Into<String>) -> Self {
        UserIntent::UserMessage {
            text: text.into(),
            context: Some(IntentContext {
                active_file: Some(active_file.into()),
            }),
        }
    }

    pub fn voice(transcript: impl Into<String>) -> Self {
        UserIntent::VoiceTranscript {
            transcript: transcript.into(),
        }
    }

    /// Text of a typed message; voice transcripts are not text-bearing
    pub fn text(&self) -> Option<&str> {
        match self {
            UserIntent::UserMessage { text, .. } => Some(text),
            UserIntent::VoiceTranscript { .. } => None,
        }
    }

    /// Whatever the user said, typed or spoken
    pub fn utterance(&self) -> &str {
        match self {
            UserIntent::UserMessage { text, .. } => text,
            UserIntent::VoiceTranscript { transcript } => transcript,
        }
    }

    pub fn active_file(&self) -> Option<&str> {
        match self {
            UserIntent::UserMessage {
                context: Some(context),
                ..
            } => context.active_file.as_deref(),
            _ => None,
        }
    }
}

/// Grounding snapshot built once per turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    pub active_file: String,
    pub active_file_content: String,
    pub relevant_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningMode {
    Standard,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenAction {
    None,
    MarkdownResponse,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub action: ScreenAction,
    pub payload: String,
}

/// Dual-track answer: a line to speak and a payload to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePlan {
    pub voice: String,
    pub screen: Screen,
}

impl ResponsePlan {
    pub fn new(voice: impl Into<String>, action: ScreenAction, payload: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            screen: Screen {
                action,
                payload: payload.into(),
            },
        }
    }

    pub fn markdown(voice: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self::new(voice, ScreenAction::MarkdownResponse, markdown)
    }

    /// Fixed low-cost reply used when no grounded reasoning is warranted
    pub fn standard() -> Self {
        Self::new(
            "I'm not sure what you need yet. Ask me about the open file, or tell me a command to run.",
            ScreenAction::None,
            "",
        )
    }

    /// Canned small-talk reply
    pub fn greeting() -> Self {
        Self::new(
            "Hi! Ask me about the code, or tell me a command to run.",
            ScreenAction::None,
            "",
        )
    }

    /// Shown when the reasoning collaborator has nothing for us
    pub fn apology() -> Self {
        Self::new(
            "Sorry, I couldn't find a grounded answer to that right now.",
            ScreenAction::Error,
            "The reasoning service did not return an answer. Please try again.",
        )
    }
}

/// How a field combines with an incoming partial update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Incoming value overwrites the current one
    Replace,
    /// Incoming items are concatenated after the current ones
    Append,
}

impl MergeStrategy {
    pub fn merge_list<T>(self, current: &mut Vec<T>, incoming: Vec<T>) {
        match self {
            MergeStrategy::Replace => {
                if !incoming.is_empty() {
                    *current = incoming;
                }
            }
            MergeStrategy::Append => current.extend(incoming),
        }
    }

    /// Single values have nothing to append to, so both strategies replace
    pub fn merge_value<T>(self, current: &mut Option<T>, incoming: Option<T>) {
        if let Some(value) = incoming {
            *current = Some(value);
        }
    }
}

/// Merge strategy per state field
pub const FIELD_STRATEGIES: &[(&str, MergeStrategy)] = &[
    ("history", MergeStrategy::Append),
    ("classification", MergeStrategy::Replace),
    ("context", MergeStrategy::Replace),
    ("reasoningMode", MergeStrategy::Replace),
    ("toolOutput", MergeStrategy::Replace),
    ("responsePlan", MergeStrategy::Replace),
];

/// Look up the merge strategy for a field; unknown fields replace
pub fn strategy_for(field: &str) -> MergeStrategy {
    FIELD_STRATEGIES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, strategy)| *strategy)
        .unwrap_or(MergeStrategy::Replace)
}

/// The single record threaded through one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnState {
    pub history: Vec<ConversationMessage>,
    pub user_intent: UserIntent,
    pub classification: Option<Classification>,
    pub context: Option<TurnContext>,
    pub reasoning_mode: Option<ReasoningMode>,
    pub tool_output: Option<ToolOutput>,
    pub response_plan: Option<ResponsePlan>,
}

impl TurnState {
    pub fn new(user_intent: UserIntent) -> Self {
        Self {
            history: Vec::new(),
            user_intent,
            classification: None,
            context: None,
            reasoning_mode: None,
            tool_output: None,
            response_plan: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// Merge a node's partial update into the state
    pub fn apply(&mut self, update: TurnUpdate) {
        strategy_for("history").merge_list(&mut self.history, update.history);
        strategy_for("classification").merge_value(&mut self.classification, update.classification);
        strategy_for("context").merge_value(&mut self.context, update.context);
        strategy_for("reasoningMode").merge_value(&mut self.reasoning_mode, update.reasoning_mode);
        strategy_for("toolOutput").merge_value(&mut self.tool_output, update.tool_output);
        strategy_for("responsePlan").merge_value(&mut self.response_plan, update.response_plan);
    }
}

/// Partial state produced by one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnUpdate {
    pub history: Vec<ConversationMessage>,
    pub classification: Option<Classification>,
    pub context: Option<TurnContext>,
    pub reasoning_mode: Option<ReasoningMode>,
    pub tool_output: Option<ToolOutput>,
    pub response_plan: Option<ResponsePlan>,
}

impl TurnUpdate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn history(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.history = messages;
        self
    }

    pub fn classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn context(mut self, context: TurnContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn reasoning_mode(mut self, mode: ReasoningMode) -> Self {
        self.reasoning_mode = Some(mode);
        self
    }

    pub fn tool_output(mut self, output: ToolOutput) -> Self {
        self.tool_output = Some(output);
        self
    }

    pub fn response_plan(mut self, plan: ResponsePlan) -> Self {
        self.response_plan = Some(plan);
        self
    }
}
