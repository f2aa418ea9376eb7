//! Turn orchestration graph
//!
//! A fixed-topology state machine that answers one user message:
//!
//! - IntentClassification -> ResponseSynthesis (chitchat) | ContextSelection
//! - ContextSelection -> PrecisionRouter
//! - PrecisionRouter -> DeepReasoning (code query) | StandardReasoning
//! - StandardReasoning, DeepReasoning -> ToolExecution -> ResponseSynthesis
//!
//! Every path ends at `ResponseSynthesis` exactly once. The orchestrator
//! owns its event channel and collaborators; nothing is process-global.

mod classify;
mod driver;
mod nodes;
mod state;

#[cfg(test)]
mod scenario_tests;

pub use classify::{classify, classify_text, Classification};
pub use driver::{route_after_classification, route_by_reasoning_mode, Graph, TurnOutcome};
pub use nodes::{Node, NodeContext, NodeId};
pub use state::{
    ConversationMessage, IntentContext, MergeStrategy, ReasoningMode, ResponsePlan, Role, Screen,
    ScreenAction, TurnContext, TurnState, TurnUpdate, UserIntent,
};

use std::sync::Arc;

use crate::bridge::CommandBridge;
use crate::collaborators::{DisabledReasoner, FileContentProvider, GroundedReasoner, StaticFiles};
use crate::config::{OrchestratorConfig, PullRequestInfo};
use crate::events::EventChannel;

/// Runs turns through the graph with one set of collaborators
pub struct Orchestrator {
    graph: Graph,
    ctx: NodeContext,
}

impl Orchestrator {
    pub fn builder(events: EventChannel) -> OrchestratorBuilder {
        OrchestratorBuilder::new(events)
    }

    /// Run one turn and return the final state
    ///
    /// Never fails: every collaborator error ends up in `response_plan`.
    pub async fn invoke(&self, state: TurnState) -> TurnState {
        self.invoke_traced(state).await.state
    }

    /// Like [`invoke`](Self::invoke), also reporting the nodes visited
    pub async fn invoke_traced(&self, state: TurnState) -> TurnOutcome {
        let mut outcome = self.graph.run(state, &self.ctx).await;
        if outcome.state.response_plan.is_none() {
            tracing::error!(path = ?outcome.path, "Turn ended without a response plan");
            outcome.state.response_plan = Some(ResponsePlan::apology());
        }
        outcome
    }

    /// Convenience for a single message with prior history
    pub async fn respond(
        &self,
        intent: UserIntent,
        history: Vec<ConversationMessage>,
    ) -> ResponsePlan {
        let state = self
            .invoke(TurnState::new(intent).with_history(history))
            .await;
        state.response_plan.unwrap_or_else(ResponsePlan::apology)
    }

    pub fn events(&self) -> &EventChannel {
        &self.ctx.events
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    events: EventChannel,
    files: Arc<dyn FileContentProvider>,
    reasoner: Arc<dyn GroundedReasoner>,
    config: OrchestratorConfig,
    pull_request: PullRequestInfo,
}

impl OrchestratorBuilder {
    pub fn new(events: EventChannel) -> Self {
        Self {
            events,
            files: Arc::new(StaticFiles::new()),
            reasoner: Arc::new(DisabledReasoner),
            config: OrchestratorConfig::default(),
            pull_request: PullRequestInfo::default(),
        }
    }

    pub fn with_files(mut self, files: Arc<dyn FileContentProvider>) -> Self {
        self.files = files;
        self
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn GroundedReasoner>) -> Self {
        self.reasoner = reasoner;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pull_request(mut self, pull_request: PullRequestInfo) -> Self {
        self.pull_request = pull_request;
        self
    }

    pub fn build(self) -> Orchestrator {
        let bridge =
            CommandBridge::new(self.events.clone()).with_timeout(self.config.command_timeout());
        Orchestrator {
            graph: Graph::new(),
            ctx: NodeContext {
                events: self.events,
                files: self.files,
                reasoner: self.reasoner,
                bridge,
                reasoning_timeout: self.config.reasoning_timeout(),
                pull_request: self.pull_request,
            },
        }
    }
}
