//! End-to-end turns through the full graph with scripted collaborators

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::collaborators::{GroundedAnswer, GroundingRequest};
use crate::error::ReasoningError;
use crate::events::{AgentEvent, EventKind, OutputStream, Subscription, ThinkingStage};

/// Reasoner double with a fixed reply
enum ScriptedReasoner {
    Answer(&'static str, &'static str),
    Nothing,
    Fails,
    Hangs,
}

#[async_trait]
impl GroundedReasoner for ScriptedReasoner {
    async fn generate_grounded_response(
        &self,
        _request: GroundingRequest,
    ) -> Result<Option<GroundedAnswer>, ReasoningError> {
        match self {
            ScriptedReasoner::Answer(voice, screen) => Ok(Some(GroundedAnswer {
                voice: voice.to_string(),
                screen: screen.to_string(),
            })),
            ScriptedReasoner::Nothing => Ok(None),
            ScriptedReasoner::Fails => Err(ReasoningError::Parse("garbage".into())),
            ScriptedReasoner::Hangs => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Runtime double: answers each exec request with `output` then `exit`
fn fake_runtime(
    events: &EventChannel,
    output: Vec<(OutputStream, &'static str)>,
    exit_code: Option<i32>,
) -> Subscription {
    let weak = events.downgrade();
    events.subscribe(EventKind::AgentExecCmd, move |envelope| {
        let (Some(events), Some(session_id)) = (weak.upgrade(), envelope.event.session_id())
        else {
            return;
        };
        for (stream, data) in &output {
            events.emit(AgentEvent::output(session_id, *stream, *data), Some("runtime"));
        }
        if let Some(code) = exit_code {
            events.emit(AgentEvent::exit(session_id, code), Some("runtime"));
        }
    })
}

fn orchestrator(events: &EventChannel, reasoner: ScriptedReasoner) -> Orchestrator {
    Orchestrator::builder(events.clone())
        .with_files(Arc::new(
            StaticFiles::new().with_file("auth.ts", "export function login() { return jwt(); }"),
        ))
        .with_reasoner(Arc::new(reasoner))
        .build()
}

fn thinking_stages(events: &EventChannel) -> Vec<ThinkingStage> {
    events
        .history()
        .into_iter()
        .filter_map(|e| match e.event {
            AgentEvent::AgentThinking { stage, .. } => Some(stage),
            _ => None,
        })
        .collect()
}

fn exec_requests(events: &EventChannel) -> usize {
    events
        .history()
        .iter()
        .filter(|e| e.kind() == EventKind::AgentExecCmd)
        .count()
}

#[tokio::test]
async fn test_code_query_uses_grounded_answer() {
    let events = EventChannel::new();
    let orchestrator = orchestrator(
        &events,
        ScriptedReasoner::Answer("The auth uses JWT.", "## Auth Details"),
    );
    let intent: UserIntent = serde_json::from_str(
        r#"{"type":"USER_MESSAGE","text":"How does the auth work?","context":{"activeFile":"auth.ts"}}"#,
    )
    .unwrap();

    let outcome = orchestrator.invoke_traced(TurnState::new(intent)).await;
    let state = outcome.state;

    assert_eq!(state.classification, Some(Classification::CodeQuery));
    assert_eq!(state.reasoning_mode, Some(ReasoningMode::Deep));
    let plan = state.response_plan.unwrap();
    assert_eq!(plan.voice, "The auth uses JWT.");
    assert_eq!(plan.screen.action, ScreenAction::MarkdownResponse);
    assert_eq!(plan.screen.payload, "## Auth Details");
    assert!(state.tool_output.is_none());

    let context = state.context.unwrap();
    assert_eq!(context.active_file, "auth.ts");
    assert!(context.active_file_content.contains("jwt()"));

    assert_eq!(
        outcome.path,
        vec![
            NodeId::IntentClassification,
            NodeId::ContextSelection,
            NodeId::PrecisionRouter,
            NodeId::DeepReasoning,
            NodeId::ToolExecution,
            NodeId::ResponseSynthesis,
        ]
    );
    assert_eq!(
        thinking_stages(&events),
        vec![
            ThinkingStage::Started,
            ThinkingStage::Processing,
            ThinkingStage::Processing,
            ThinkingStage::Completed,
        ]
    );
}

#[tokio::test]
async fn test_chitchat_bypasses_context_and_tools() {
    for text in ["hello there", "hi you", "yo"] {
        let events = EventChannel::new();
        let orchestrator = orchestrator(&events, ScriptedReasoner::Fails);

        let outcome = orchestrator
            .invoke_traced(TurnState::new(UserIntent::message(text)))
            .await;

        assert_eq!(outcome.state.classification, Some(Classification::Chitchat), "{text}");
        assert_eq!(
            outcome.path,
            vec![NodeId::IntentClassification, NodeId::ResponseSynthesis]
        );
        assert!(!outcome.visited(NodeId::ContextSelection));
        assert!(!outcome.visited(NodeId::ToolExecution));
        assert!(outcome.state.context.is_none());
        assert_eq!(outcome.state.response_plan, Some(ResponsePlan::greeting()));
        assert_eq!(exec_requests(&events), 0);
    }
}

#[tokio::test]
async fn test_command_success_is_summarized() {
    let events = EventChannel::new();
    let _runtime = fake_runtime(
        &events,
        vec![(OutputStream::Stdout, "Test Passed!\n")],
        Some(0),
    );
    let orchestrator = orchestrator(&events, ScriptedReasoner::Fails);

    let state = orchestrator
        .invoke(TurnState::new(UserIntent::message("please run npm test")))
        .await;

    assert_eq!(state.classification, Some(Classification::Command));
    assert_eq!(state.reasoning_mode, Some(ReasoningMode::Standard));
    let output = state.tool_output.unwrap();
    assert!(output.success);
    assert_eq!(output.data.unwrap().exit_code, 0);

    let plan = state.response_plan.unwrap();
    assert!(plan.voice.contains("finished successfully"));
    assert!(plan.screen.payload.contains("Test Passed!"));
    assert_eq!(exec_requests(&events), 1);
}

#[tokio::test]
async fn test_command_without_token_reports_extraction_failure() {
    let events = EventChannel::new();
    let _runtime = fake_runtime(&events, vec![], Some(0));
    let orchestrator = orchestrator(&events, ScriptedReasoner::Fails);

    let state = orchestrator
        .invoke(TurnState::new(UserIntent::message("run the thing for me")))
        .await;

    assert_eq!(
        state.tool_output,
        Some(crate::bridge::ToolOutput {
            success: false,
            data: None,
            error: Some("Could not extract command".to_string()),
        })
    );
    assert_eq!(exec_requests(&events), 0);
    let plan = state.response_plan.unwrap();
    assert_eq!(plan.voice, "Command failed: Could not extract command.");
    assert_eq!(plan.screen.action, ScreenAction::Error);
}

#[tokio::test(start_paused = true)]
async fn test_command_timeout_still_resolves() {
    let events = EventChannel::new();
    let _runtime = fake_runtime(&events, vec![(OutputStream::Stdout, "starting\n")], None);
    let orchestrator = orchestrator(&events, ScriptedReasoner::Fails);

    let started = tokio::time::Instant::now();
    let state = orchestrator
        .invoke(TurnState::new(UserIntent::message("run ls -la")))
        .await;

    assert!(started.elapsed() >= Duration::from_secs(30));
    let output = state.tool_output.unwrap();
    assert!(!output.success);
    assert!(output.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(output.data.unwrap().exit_code, -1);
    assert_eq!(events.subscriber_count(EventKind::RuntimeOutput), 0);
    assert_eq!(events.subscriber_count(EventKind::RuntimeExit), 0);

    let plan = state.response_plan.unwrap();
    assert!(plan.voice.starts_with("Command failed: Command timed out"));
}

#[tokio::test]
async fn test_reasoner_failure_becomes_apology() {
    for reasoner in [ScriptedReasoner::Nothing, ScriptedReasoner::Fails] {
        let events = EventChannel::new();
        let orchestrator = orchestrator(&events, reasoner);

        let plan = orchestrator
            .respond(UserIntent::message("Explain the session model"), vec![])
            .await;

        assert_eq!(plan, ResponsePlan::apology());
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_reasoner_times_out_to_apology() {
    let events = EventChannel::new();
    let orchestrator = Orchestrator::builder(events.clone())
        .with_reasoner(Arc::new(ScriptedReasoner::Hangs))
        .with_config(crate::config::OrchestratorConfig {
            command_timeout_secs: 30,
            reasoning_timeout_secs: 5,
        })
        .build();

    let plan = orchestrator
        .respond(UserIntent::message("Explain the session model"), vec![])
        .await;

    assert_eq!(plan, ResponsePlan::apology());
}

#[tokio::test]
async fn test_voice_transcript_takes_standard_path() {
    let events = EventChannel::new();
    let _runtime = fake_runtime(&events, vec![], Some(0));
    let orchestrator = orchestrator(&events, ScriptedReasoner::Fails);

    let outcome = orchestrator
        .invoke_traced(TurnState::new(UserIntent::voice("run the tests")))
        .await;

    assert_eq!(outcome.state.classification, Some(Classification::Ambiguous));
    assert!(outcome.visited(NodeId::ContextSelection));
    assert!(outcome.visited(NodeId::StandardReasoning));
    assert!(outcome.state.tool_output.is_none());
    assert_eq!(outcome.state.response_plan, Some(ResponsePlan::standard()));
    assert_eq!(exec_requests(&events), 0);
}

#[tokio::test]
async fn test_history_is_appended_not_replaced() {
    let events = EventChannel::new();
    let orchestrator = orchestrator(&events, ScriptedReasoner::Fails);
    let prior = vec![
        ConversationMessage::user("m1"),
        ConversationMessage::assistant("m2"),
    ];

    let state = orchestrator
        .invoke(TurnState::new(UserIntent::message("hello there")).with_history(prior.clone()))
        .await;

    assert_eq!(state.history.len(), 4);
    assert_eq!(&state.history[..2], &prior[..]);
    assert_eq!(state.history[2], ConversationMessage::user("hello there"));
    assert_eq!(state.history[3].role, Role::Assistant);
}

#[tokio::test]
async fn test_overlapping_turns_keep_outputs_apart() {
    let events = EventChannel::new();
    let weak = events.downgrade();
    // Echo the command name back as output so each turn can be checked
    let _runtime = events.subscribe(EventKind::AgentExecCmd, move |envelope| {
        let Some(events) = weak.upgrade() else {
            return;
        };
        if let AgentEvent::AgentExecCmd {
            session_id,
            command,
            ..
        } = &envelope.event
        {
            events.emit(
                AgentEvent::output(*session_id, OutputStream::Stdout, command.clone()),
                None,
            );
            events.emit(AgentEvent::exit(*session_id, 0), None);
        }
    });
    let orchestrator = Arc::new(orchestrator(&events, ScriptedReasoner::Fails));

    let a = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .invoke(TurnState::new(UserIntent::message("run ls")))
                .await
        }
    });
    let b = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .invoke(TurnState::new(UserIntent::message("run node app.js")))
                .await
        }
    });

    let a = a.await.unwrap().tool_output.unwrap().data.unwrap();
    let b = b.await.unwrap().tool_output.unwrap().data.unwrap();
    assert_eq!(a.stdout, "ls");
    assert_eq!(b.stdout, "node");
}
