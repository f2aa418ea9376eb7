//! Graph nodes
//!
//! Each node reads the turn state and returns a partial update. Nodes
//! never fail: collaborator errors are folded into the update.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::classify::{classify, Classification};
use super::state::{
    ConversationMessage, ReasoningMode, ResponsePlan, TurnContext, TurnState, TurnUpdate,
};
use crate::bridge::CommandBridge;
use crate::collaborators::{FileContentProvider, Grounding, GroundedReasoner, GroundingRequest};
use crate::config::PullRequestInfo;
use crate::error::ReasoningError;
use crate::events::{AgentEvent, EventChannel, ThinkingStage};
use crate::synthesis::synthesize;

/// Source tag on progress events emitted by nodes
const EVENT_SOURCE: &str = "orchestrator";

/// Node identifiers, one per state in the turn machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    IntentClassification,
    ContextSelection,
    PrecisionRouter,
    StandardReasoning,
    DeepReasoning,
    ToolExecution,
    ResponseSynthesis,
}

impl NodeId {
    pub fn name(&self) -> &'static str {
        match self {
            NodeId::IntentClassification => "intent_classification",
            NodeId::ContextSelection => "context_selection",
            NodeId::PrecisionRouter => "precision_router",
            NodeId::StandardReasoning => "standard_reasoning",
            NodeId::DeepReasoning => "deep_reasoning",
            NodeId::ToolExecution => "tool_execution",
            NodeId::ResponseSynthesis => "response_synthesis",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dependencies shared by every node of one orchestrator
pub struct NodeContext {
    pub events: EventChannel,
    pub files: Arc<dyn FileContentProvider>,
    pub reasoner: Arc<dyn GroundedReasoner>,
    pub bridge: CommandBridge,
    /// Upper bound on one grounded reasoning call
    pub reasoning_timeout: Duration,
    pub pull_request: PullRequestInfo,
}

impl NodeContext {
    fn thinking(&self, stage: ThinkingStage, message: &str) {
        self.events
            .emit(AgentEvent::thinking(stage, message), Some(EVENT_SOURCE));
    }
}

/// One state of the turn machine
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(&self, state: &TurnState, ctx: &NodeContext) -> TurnUpdate;
}

pub struct IntentClassification;

#[async_trait]
impl Node for IntentClassification {
    fn id(&self) -> NodeId {
        NodeId::IntentClassification
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext) -> TurnUpdate {
        ctx.thinking(ThinkingStage::Started, "Analyzing your request...");
        let classification = classify(&state.user_intent);
        info!(classification = %classification, "Intent classified");
        TurnUpdate::none().classification(classification)
    }
}

pub struct ContextSelection;

#[async_trait]
impl Node for ContextSelection {
    fn id(&self) -> NodeId {
        NodeId::ContextSelection
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext) -> TurnUpdate {
        ctx.thinking(ThinkingStage::Processing, "Gathering context...");

        let Some(active_file) = state.user_intent.active_file() else {
            debug!("No active file, using empty context");
            return TurnUpdate::none().context(TurnContext::default());
        };

        let content = ctx.files.active_file_content(active_file).await;
        if content.is_none() {
            debug!(path = active_file, "Active file content unavailable");
        }
        let relevant_files = ctx.files.relevant_files(active_file).await;

        TurnUpdate::none().context(TurnContext {
            active_file: active_file.to_string(),
            active_file_content: content.unwrap_or_default(),
            relevant_files,
        })
    }
}

pub struct PrecisionRouter;

#[async_trait]
impl Node for PrecisionRouter {
    fn id(&self) -> NodeId {
        NodeId::PrecisionRouter
    }

    async fn run(&self, state: &TurnState, _ctx: &NodeContext) -> TurnUpdate {
        let mode = match state.classification {
            Some(Classification::CodeQuery) => ReasoningMode::Deep,
            _ => ReasoningMode::Standard,
        };
        debug!(mode = ?mode, "Reasoning mode selected");
        TurnUpdate::none().reasoning_mode(mode)
    }
}

pub struct StandardReasoning;

#[async_trait]
impl Node for StandardReasoning {
    fn id(&self) -> NodeId {
        NodeId::StandardReasoning
    }

    async fn run(&self, _state: &TurnState, _ctx: &NodeContext) -> TurnUpdate {
        TurnUpdate::none().response_plan(ResponsePlan::standard())
    }
}

pub struct DeepReasoning;

impl DeepReasoning {
    fn request(state: &TurnState, ctx: &NodeContext) -> GroundingRequest {
        let context = state.context.clone().unwrap_or_default();
        GroundingRequest {
            user_text: state.user_intent.utterance().to_string(),
            history: state.history.clone(),
            grounding: Grounding {
                file_path: context.active_file,
                file_content: context.active_file_content,
                pr_title: ctx.pull_request.title.clone(),
                pr_description: ctx.pull_request.description.clone(),
                requirements: ctx.pull_request.requirements.clone(),
            },
        }
    }
}

#[async_trait]
impl Node for DeepReasoning {
    fn id(&self) -> NodeId {
        NodeId::DeepReasoning
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext) -> TurnUpdate {
        ctx.thinking(ThinkingStage::Processing, "Reasoning over your code...");

        let request = Self::request(state, ctx);
        let call = ctx.reasoner.generate_grounded_response(request);
        let result = tokio::time::timeout(ctx.reasoning_timeout, call)
            .await
            .unwrap_or(Err(ReasoningError::Timeout(ctx.reasoning_timeout)));

        let plan = match result {
            Ok(Some(answer)) => ResponsePlan::markdown(answer.voice, answer.screen),
            Ok(None) => {
                warn!("Reasoner returned no grounded answer");
                ResponsePlan::apology()
            }
            Err(e) => {
                warn!("Grounded reasoning failed: {}", e);
                ResponsePlan::apology()
            }
        };
        TurnUpdate::none().response_plan(plan)
    }
}

pub struct ToolExecution;

#[async_trait]
impl Node for ToolExecution {
    fn id(&self) -> NodeId {
        NodeId::ToolExecution
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext) -> TurnUpdate {
        if state.classification != Some(Classification::Command) {
            return TurnUpdate::none();
        }
        ctx.thinking(ThinkingStage::Processing, "Running command...");

        let text = state.user_intent.utterance();
        TurnUpdate::none().tool_output(ctx.bridge.execute(text).await)
    }
}

pub struct ResponseSynthesis;

#[async_trait]
impl Node for ResponseSynthesis {
    fn id(&self) -> NodeId {
        NodeId::ResponseSynthesis
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext) -> TurnUpdate {
        let plan = synthesize(state.classification, state.tool_output.as_ref())
            .or_else(|| state.response_plan.clone())
            .unwrap_or_else(ResponsePlan::greeting);

        ctx.thinking(ThinkingStage::Completed, "Done");

        let history = vec![
            ConversationMessage::user(state.user_intent.utterance()),
            ConversationMessage::assistant(plan.voice.clone()),
        ];
        TurnUpdate::none().response_plan(plan).history(history)
    }
}

/// The fixed node set, in table order
pub fn all_nodes() -> Vec<Arc<dyn Node>> {
    vec![
        Arc::new(IntentClassification),
        Arc::new(ContextSelection),
        Arc::new(PrecisionRouter),
        Arc::new(StandardReasoning),
        Arc::new(DeepReasoning),
        Arc::new(ToolExecution),
        Arc::new(ResponseSynthesis),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DisabledReasoner, GroundedAnswer, StaticFiles};
    use crate::events::EventKind;
    use crate::graph::{ScreenAction, UserIntent};
    use parking_lot::Mutex;

    struct RecordingReasoner {
        seen: Mutex<Option<GroundingRequest>>,
    }

    #[async_trait]
    impl GroundedReasoner for RecordingReasoner {
        async fn generate_grounded_response(
            &self,
            request: GroundingRequest,
        ) -> Result<Option<GroundedAnswer>, ReasoningError> {
            *self.seen.lock() = Some(request);
            Ok(Some(GroundedAnswer {
                voice: "ok".into(),
                screen: "## ok".into(),
            }))
        }
    }

    fn context_with(reasoner: Arc<dyn GroundedReasoner>) -> NodeContext {
        let events = EventChannel::new();
        NodeContext {
            bridge: CommandBridge::new(events.clone()),
            events,
            files: Arc::new(StaticFiles::new().with_file("src/auth.ts", "jwt()")),
            reasoner,
            reasoning_timeout: Duration::from_secs(60),
            pull_request: PullRequestInfo {
                title: "Add auth".into(),
                description: "JWT sessions".into(),
                requirements: vec!["Tokens expire".into()],
            },
        }
    }

    #[tokio::test]
    async fn test_context_selection_without_file_is_empty() {
        let ctx = context_with(Arc::new(DisabledReasoner));
        let state = TurnState::new(UserIntent::message("How does this work?"));

        let update = ContextSelection.run(&state, &ctx).await;

        assert_eq!(update.context, Some(TurnContext::default()));
    }

    #[tokio::test]
    async fn test_context_selection_unknown_file_keeps_path() {
        let ctx = context_with(Arc::new(DisabledReasoner));
        let state = TurnState::new(UserIntent::message_with_file("what is this", "src/nope.ts"));

        let context = ContextSelection.run(&state, &ctx).await.context.unwrap();

        assert_eq!(context.active_file, "src/nope.ts");
        assert_eq!(context.active_file_content, "");
        assert_eq!(context.relevant_files, vec!["src/auth.ts"]);
    }

    #[tokio::test]
    async fn test_precision_router() {
        let ctx = context_with(Arc::new(DisabledReasoner));
        let mut state = TurnState::new(UserIntent::message("x"));

        for (classification, mode) in [
            (Classification::CodeQuery, ReasoningMode::Deep),
            (Classification::Command, ReasoningMode::Standard),
            (Classification::Ambiguous, ReasoningMode::Standard),
        ] {
            state.classification = Some(classification);
            let update = PrecisionRouter.run(&state, &ctx).await;
            assert_eq!(update.reasoning_mode, Some(mode));
        }
    }

    #[tokio::test]
    async fn test_deep_reasoning_sends_grounding() {
        let reasoner = Arc::new(RecordingReasoner {
            seen: Mutex::new(None),
        });
        let ctx = context_with(reasoner.clone());
        let mut state = TurnState::new(UserIntent::message_with_file("How?", "src/auth.ts"))
            .with_history(vec![ConversationMessage::user("earlier")]);
        state.context = Some(TurnContext {
            active_file: "src/auth.ts".into(),
            active_file_content: "jwt()".into(),
            relevant_files: vec![],
        });

        let plan = DeepReasoning.run(&state, &ctx).await.response_plan.unwrap();

        assert_eq!(plan, ResponsePlan::markdown("ok", "## ok"));
        let request = reasoner.seen.lock().clone().unwrap();
        assert_eq!(request.user_text, "How?");
        assert_eq!(request.history, vec![ConversationMessage::user("earlier")]);
        assert_eq!(request.grounding.file_content, "jwt()");
        assert_eq!(request.grounding.pr_title, "Add auth");
        assert_eq!(request.grounding.requirements, vec!["Tokens expire"]);
    }

    #[tokio::test]
    async fn test_tool_execution_skips_non_commands() {
        let ctx = context_with(Arc::new(DisabledReasoner));
        let mut state = TurnState::new(UserIntent::message("How does auth work?"));
        state.classification = Some(Classification::CodeQuery);

        let update = ToolExecution.run(&state, &ctx).await;

        assert_eq!(update, TurnUpdate::none());
        assert!(ctx.events.history().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_defaults_to_greeting() {
        let ctx = context_with(Arc::new(DisabledReasoner));
        let mut state = TurnState::new(UserIntent::message("hello there"));
        state.classification = Some(Classification::Chitchat);

        let update = ResponseSynthesis.run(&state, &ctx).await;

        let plan = update.response_plan.unwrap();
        assert_eq!(plan, ResponsePlan::greeting());
        assert_eq!(plan.screen.action, ScreenAction::None);
        assert_eq!(
            update.history,
            vec![
                ConversationMessage::user("hello there"),
                ConversationMessage::assistant(plan.voice.clone()),
            ]
        );
        let last = ctx.events.history().pop().unwrap();
        assert_eq!(last.kind(), EventKind::AgentThinking);
    }

    #[test]
    fn test_node_table_is_complete() {
        let ids: Vec<NodeId> = all_nodes().iter().map(|n| n.id()).collect();
        assert_eq!(ids.len(), 7);
        assert_eq!(ids[0], NodeId::IntentClassification);
        assert_eq!(ids[6], NodeId::ResponseSynthesis);
    }
}
