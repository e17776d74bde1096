//! Unit tests for `StreamDispatcher`
//!
//! Tests event routing, tool-result dispatchers and the terminal handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;

use kodegen_agent_session::dispatch::terminal::ABORT_NOTIFICATION;
use kodegen_agent_session::transport::{EventStream, FinalResponse, ResponseHandle};
use kodegen_agent_session::{
    ApprovalMode, ChannelSink, ChatEvent, ContentBlock, DispatchServices, ExecutionContext,
    MessageId, ModelMessage, NoopLanguageServer, ProjectId, ReviewStaging, ScratchWorkspaces,
    SessionBridge, SessionOptions, SessionView, StreamContext, StreamDispatcher, StreamEvent,
    StreamSignal, TelemetryEvent, TerminalReason, ToolName, ToolResultDispatcher, UiEvent,
};

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Default)]
struct RecordingBridge {
    events: Mutex<Vec<ChatEvent>>,
}

impl RecordingBridge {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ChatEvent::name).collect()
    }
}

impl SessionBridge for RecordingBridge {
    fn post(&self, event: ChatEvent) {
        self.events.lock().push(event);
    }

    fn view(&self) -> SessionView {
        SessionView {
            project_id: ProjectId::new("project"),
            approval_mode: ApprovalMode::Manual,
        }
    }
}

struct Fixture {
    _dir: TempDir,
    project: PathBuf,
    scratch: PathBuf,
    bridge: Arc<RecordingBridge>,
    telemetry: Arc<Mutex<Vec<TelemetryEvent>>>,
    review: Arc<ReviewStaging>,
    dispatcher: StreamDispatcher,
    ui: mpsc::UnboundedReceiver<UiEvent>,
    ctx: StreamContext,
}

fn fixture(options: SessionOptions) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let root = dir.path().join("scratch");
    let scratch = root.join("generation");
    std::fs::create_dir_all(&scratch).unwrap();

    let options = Arc::new(SessionOptions {
        scratch_root: root,
        ..options
    });
    let workspaces = ScratchWorkspaces::new(Arc::clone(&options));
    let review = Arc::new(ReviewStaging::new(workspaces.clone(), options.review_ttl));
    let bridge = Arc::new(RecordingBridge::default());
    let telemetry: Arc<Mutex<Vec<TelemetryEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&telemetry);

    let services = DispatchServices {
        workspaces,
        language_server: Arc::new(NoopLanguageServer),
        telemetry: Arc::new(move |event: &TelemetryEvent| recorder.lock().push(event.clone())),
        review: Arc::clone(&review),
        session: Arc::clone(&bridge) as Arc<dyn SessionBridge>,
        options,
    };

    let (sink, ui) = ChannelSink::new();
    let ctx = StreamContext::new(
        Arc::new(sink),
        &scratch,
        ExecutionContext::project(&project),
        MessageId::new("message-1"),
    );

    Fixture {
        _dir: dir,
        project,
        scratch,
        bridge,
        telemetry,
        review,
        dispatcher: StreamDispatcher::new(services),
        ui,
        ctx,
    }
}

fn feed(events: Vec<StreamEvent>) -> EventStream {
    Box::pin(stream::iter(events))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn tool_call(id: &str, name: &str, input: Value) -> StreamEvent {
    StreamEvent::ToolCall {
        tool_call_id: id.to_string(),
        tool_name: ToolName::new(name),
        input,
    }
}

fn tool_result(id: &str, name: &str, output: Value) -> StreamEvent {
    StreamEvent::ToolResult {
        tool_call_id: id.to_string(),
        tool_name: ToolName::new(name),
        input: json!({}),
        output,
    }
}

fn finish() -> StreamEvent {
    StreamEvent::Finish { finish_reason: None }
}

fn tool_outputs(events: &[UiEvent]) -> Vec<(String, Option<Value>)> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::ToolResult {
                tool_name,
                tool_output,
            } => Some((tool_name.to_string(), tool_output.clone())),
            _ => None,
        })
        .collect()
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

// ============================================================================
// TERMINAL EXCLUSIVITY
// ============================================================================

#[tokio::test]
async fn test_no_event_processed_after_finish() {
    let mut f = fixture(SessionOptions::default());
    let events = feed(vec![
        tool_call("c1", "file_read", json!({"file_path": "a.rs"})),
        tool_result("c1", "file_read", json!({"success": true})),
        finish(),
        tool_result("c2", "file_read", json!({"success": true})),
    ]);

    let termination = f.dispatcher.run(events, &mut f.ctx).await.unwrap();

    assert_eq!(termination.reason, TerminalReason::Finished);
    assert_eq!(termination.scratch_path, f.scratch);
    assert_eq!(f.ctx.events_processed, 3);

    let ui = drain(&mut f.ui);
    assert_eq!(tool_outputs(&ui).len(), 1);
    assert!(matches!(ui.last(), Some(UiEvent::Stop)));
    assert_eq!(
        f.bridge.names(),
        ["SHOW_REVIEW_ACTIONS", "UPDATE_CHAT_MESSAGE", "FINISH_EXECUTION"]
    );
}

#[tokio::test]
async fn test_finish_stages_review_and_integrates() {
    let mut f = fixture(SessionOptions::default());
    write(&f.scratch, "src/lib.rs", "pub fn answer() -> u32 { 42 }\n");
    f.ctx.modified_files.insert("src/lib.rs");

    let events = feed(vec![
        StreamEvent::TextDelta {
            text: "Added ".to_string(),
        },
        StreamEvent::TextDelta {
            text: "answer()".to_string(),
        },
        finish(),
    ]);
    f.dispatcher.run(events, &mut f.ctx).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(f.project.join("src/lib.rs")).unwrap(),
        "pub fn answer() -> u32 { 42 }\n"
    );

    let review = f.review.get().unwrap();
    assert_eq!(review.scratch_path, f.scratch);
    assert_eq!(review.modified_files, vec!["src/lib.rs".to_string()]);
    assert_eq!(review.message_id, MessageId::new("message-1"));
    assert!(f.scratch.exists());

    let events = f.bridge.events.lock().clone();
    let Some(ChatEvent::UpdateChatMessage {
        ui_response,
        model_messages,
        ..
    }) = events.iter().find(|e| e.name() == "UPDATE_CHAT_MESSAGE")
    else {
        panic!("missing chat update");
    };
    assert_eq!(ui_response.as_deref(), Some("Added answer()"));
    assert_eq!(model_messages.len(), 1);

    let telemetry = f.telemetry.lock();
    assert!(matches!(
        telemetry.as_slice(),
        [TelemetryEvent::GenerationCompleted {
            modified_files_count: 1,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_finish_under_test_isolation_does_not_integrate() {
    let mut f = fixture(SessionOptions::builder().test_isolation(true).build());
    write(&f.scratch, "new.txt", "hello\n");
    f.ctx.modified_files.insert("new.txt");
    f.ctx.should_cleanup = false;

    f.dispatcher.run(feed(vec![finish()]), &mut f.ctx).await.unwrap();

    assert!(!f.project.join("new.txt").exists());
    assert!(f.review.get().is_some());
}

#[tokio::test]
async fn test_finish_uses_final_response() {
    let mut f = fixture(SessionOptions::default());
    let (tx, response) = ResponseHandle::channel();
    tx.send(Ok(FinalResponse {
        messages: vec![ModelMessage::assistant(vec![ContentBlock::Text {
            text: "From the model".to_string(),
        }])],
        usage: None,
    }))
    .unwrap();
    f.ctx.response = Some(response);

    f.dispatcher.run(feed(vec![finish()]), &mut f.ctx).await.unwrap();

    let events = f.bridge.events.lock().clone();
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::UpdateChatMessage { ui_response: Some(text), .. } if text == "From the model"
    )));
}

#[tokio::test]
async fn test_error_event_terminates_and_releases_scratch() {
    let mut f = fixture(SessionOptions::default());
    let events = feed(vec![
        StreamEvent::TextDelta {
            text: "Working".to_string(),
        },
        StreamEvent::Error {
            error: "rate limited".to_string(),
        },
        finish(),
    ]);

    let termination = f.dispatcher.run(events, &mut f.ctx).await.unwrap();

    assert_eq!(termination.reason, TerminalReason::Failed);
    assert_eq!(f.ctx.events_processed, 2);
    assert!(!f.scratch.exists());
    assert!(f.review.get().is_none());

    let ui = drain(&mut f.ui);
    assert_eq!(
        ui,
        vec![UiEvent::Error {
            content: "rate limited".to_string()
        }]
    );
    assert!(matches!(
        f.bridge.events.lock().as_slice(),
        [ChatEvent::Error { message }] if message == "rate limited"
    ));
    assert!(matches!(
        f.telemetry.lock().as_slice(),
        [TelemetryEvent::GenerationFailed { .. }]
    ));
}

#[tokio::test]
async fn test_feed_ending_without_terminal_event_fails() {
    let mut f = fixture(SessionOptions::default());
    let events = feed(vec![StreamEvent::TextDelta {
        text: "partial".to_string(),
    }]);

    let termination = f.dispatcher.run(events, &mut f.ctx).await.unwrap();

    assert_eq!(termination.reason, TerminalReason::Failed);
    assert_eq!(f.bridge.names(), ["ERROR"]);
}

#[tokio::test]
async fn test_abort_keeps_partial_transcript() {
    let mut f = fixture(SessionOptions::builder().abort_response_timeout(Duration::from_millis(50)).build());
    let (_tx, response) = ResponseHandle::channel();
    f.ctx.response = Some(response);
    f.ctx.modified_files.insert("a.txt");

    let events = feed(vec![
        StreamEvent::TextDelta {
            text: "Halfway".to_string(),
        },
        StreamEvent::Abort,
    ]);
    let termination = f.dispatcher.run(events, &mut f.ctx).await.unwrap();

    assert_eq!(termination.reason, TerminalReason::Aborted);
    assert!(!f.scratch.exists());
    assert!(f.review.get().is_none());

    let events = f.bridge.events.lock().clone();
    assert_eq!(events.len(), 2);
    let ChatEvent::UpdateChatMessage {
        model_messages,
        ui_response,
        ..
    } = &events[0]
    else {
        panic!("expected a chat update, got {:?}", events[0]);
    };
    assert_eq!(ui_response.as_deref(), Some("Halfway"));
    assert_eq!(model_messages.len(), 2);
    assert_eq!(model_messages[1].text(), ABORT_NOTIFICATION);
    assert_eq!(events[1], ChatEvent::FinishExecution);

    assert_eq!(drain(&mut f.ui), vec![UiEvent::Abort]);
    assert!(matches!(
        f.telemetry.lock().as_slice(),
        [TelemetryEvent::GenerationAborted {
            modified_files_count: 1,
            ..
        }]
    ));
}

// ============================================================================
// TOOL-RESULT DISPATCHERS
// ============================================================================

#[tokio::test]
async fn test_unknown_tool_uses_default_dispatcher() {
    let mut f = fixture(SessionOptions::default());
    assert!(f.dispatcher.dispatcher_for("mystery_tool").supported_tools().is_empty());

    let signal = f
        .dispatcher
        .handle(tool_result("c1", "mystery_tool", json!({"anything": 1})), &mut f.ctx)
        .await
        .unwrap();

    assert_eq!(signal, StreamSignal::Continue);
    assert_eq!(
        drain(&mut f.ui),
        vec![UiEvent::ToolResult {
            tool_name: ToolName::new("mystery_tool"),
            tool_output: None,
        }]
    );
}

#[tokio::test]
async fn test_tool_result_recorded_in_transcript() {
    let mut f = fixture(SessionOptions::default());
    let events = [
        StreamEvent::TextDelta {
            text: "Reading".to_string(),
        },
        tool_call("c1", "file_read", json!({"file_path": "a.rs"})),
        tool_result("c1", "file_read", json!({"success": true, "content": ""})),
    ];
    for event in events {
        f.dispatcher.handle(event, &mut f.ctx).await.unwrap();
    }

    assert!(f.ctx.current_assistant_content.is_empty());
    assert_eq!(f.ctx.accumulated_messages.len(), 2);
    assert_eq!(f.ctx.accumulated_messages[0].content.len(), 2);
    assert!(matches!(
        &f.ctx.accumulated_messages[1].content[0],
        ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "c1"
    ));
}

#[tokio::test]
async fn test_diagnostics_results_update_statistics() {
    let mut f = fixture(SessionOptions::default());
    let output = json!({
        "success": true,
        "diagnostics": [
            {"code": "E0308", "message": "mismatched types"},
            {"code": "E0308", "message": "mismatched types"},
            {"code": "E0425", "message": "unresolved name"}
        ]
    });

    f.dispatcher
        .handle(tool_result("c1", "diagnostics", output.clone()), &mut f.ctx)
        .await
        .unwrap();
    f.dispatcher
        .handle(tool_result("c2", "diagnostics", json!({"success": true, "diagnostics": []})), &mut f.ctx)
        .await
        .unwrap();

    assert_eq!(f.ctx.diagnostic_check_count, 2);
    assert_eq!(f.ctx.total_compilation_errors, 3);
    assert_eq!(f.ctx.error_codes.len(), 2);
    assert_eq!(f.ctx.error_code_frequency.get("E0308"), Some(&2));
    assert_eq!(f.ctx.error_code_frequency.get("E0425"), Some(&1));

    let outputs = tool_outputs(&drain(&mut f.ui));
    assert_eq!(outputs[0].1, Some(output));
}

#[tokio::test]
async fn test_library_results_filtered_by_selection() {
    let mut f = fixture(SessionOptions::default());
    let catalogue = json!([
        {"name": "http", "description": "HTTP client"},
        {"name": "json", "description": "JSON codec"}
    ]);

    for event in [
        tool_call("c1", "library_provider", json!({"library_names": ["http"]})),
        tool_result("c1", "library_provider", catalogue.clone()),
        tool_result("c2", "healthcare_library_provider", catalogue),
    ] {
        f.dispatcher.handle(event, &mut f.ctx).await.unwrap();
    }

    assert_eq!(f.ctx.selected_libraries, vec!["http".to_string()]);
    let outputs = tool_outputs(&drain(&mut f.ui));
    assert_eq!(outputs[0].1, Some(json!(["http"])));
    assert_eq!(outputs[1].1, Some(json!(["http", "json"])));
}

#[tokio::test]
async fn test_file_results_report_action() {
    let mut f = fixture(SessionOptions::default());
    for event in [
        tool_result(
            "c1",
            "file_write",
            json!({"success": true, "message": "Successfully created file src/a.rs"}),
        ),
        tool_result(
            "c2",
            "file_write",
            json!({"success": true, "message": "Successfully updated file src/a.rs"}),
        ),
        tool_result("c3", "file_edit", json!({"success": false, "message": "not found"})),
    ] {
        f.dispatcher.handle(event, &mut f.ctx).await.unwrap();
    }

    let outputs = tool_outputs(&drain(&mut f.ui));
    assert_eq!(outputs[0].1, Some(json!({"success": true, "action": "created"})));
    assert_eq!(outputs[1].1, Some(json!({"success": true, "action": "updated"})));
    assert_eq!(outputs[2].1, Some(json!({"success": false})));
}

#[tokio::test]
async fn test_task_write_results_forward_task_list() {
    let mut f = fixture(SessionOptions::default());
    let tasks = json!([{"description": "Add route", "status": "in_progress"}]);

    f.dispatcher
        .handle(
            tool_result(
                "c1",
                "task_write",
                json!({"success": true, "message": "Task list updated.", "tasks": tasks}),
            ),
            &mut f.ctx,
        )
        .await
        .unwrap();
    f.dispatcher
        .handle(tool_result("c2", "task_write", Value::Null), &mut f.ctx)
        .await
        .unwrap();

    let outputs = tool_outputs(&drain(&mut f.ui));
    assert_eq!(outputs.len(), 1);
    assert_eq!(
        outputs[0].1,
        Some(json!({"success": true, "message": "Task list updated.", "allTasks": tasks}))
    );
}

struct EchoDispatcher;

impl ToolResultDispatcher for EchoDispatcher {
    fn supported_tools(&self) -> &[&'static str] {
        &["echo", "file_write"]
    }

    fn dispatch(&self, tool_name: &ToolName, output: &Value, ctx: &mut StreamContext) {
        ctx.emit(UiEvent::ToolResult {
            tool_name: tool_name.clone(),
            tool_output: Some(json!({"echo": output})),
        });
    }
}

#[tokio::test]
async fn test_custom_dispatcher_after_builtins() {
    let f = fixture(SessionOptions::default());
    let dispatcher = f.dispatcher.with_dispatcher(Box::new(EchoDispatcher));

    assert_eq!(dispatcher.dispatcher_for("echo").supported_tools(), ["echo", "file_write"]);
    assert_eq!(
        dispatcher.dispatcher_for("file_write").supported_tools(),
        ["file_write", "file_edit", "file_multi_edit"]
    );
}
