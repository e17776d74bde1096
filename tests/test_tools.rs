//! Unit tests for the per-generation tool table

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use kodegen_agent_session::tools::{
    AutoApproveGate, ConnectorDecision, Decision, SessionGate, ToolBindings, ToolFuture,
};
use kodegen_agent_session::{
    AgentError, ConnectorGenerator, Diagnostic, GeneratedFile, LanguageServer, Library,
    ModifiedFiles, NoopLanguageServer, Plan, ProjectSource, RequestId, Result, Severity,
    StaticLibraryProvider, ToolDefinition, ToolRegistry,
};

// ============================================================================
// FIXTURES
// ============================================================================

struct FixedDiagnostics(Vec<Diagnostic>);

#[async_trait]
impl LanguageServer for FixedDiagnostics {
    async fn did_open(&self, _: &Path, _: &Path, _: &[ProjectSource]) -> Result<()> {
        Ok(())
    }

    async fn did_close(&self, _: &Path, _: &[ProjectSource]) -> Result<()> {
        Ok(())
    }

    async fn diagnostics(&self, _: &Path) -> Result<Vec<Diagnostic>> {
        Ok(self.0.clone())
    }
}

struct FailingLanguageServer;

#[async_trait]
impl LanguageServer for FailingLanguageServer {
    async fn did_open(&self, _: &Path, _: &Path, _: &[ProjectSource]) -> Result<()> {
        Ok(())
    }

    async fn did_close(&self, _: &Path, _: &[ProjectSource]) -> Result<()> {
        Ok(())
    }

    async fn diagnostics(&self, _: &Path) -> Result<Vec<Diagnostic>> {
        Err(AgentError::language_server("server crashed"))
    }
}

struct StubConnector;

#[async_trait]
impl ConnectorGenerator for StubConnector {
    async fn generate(
        &self,
        _scratch: &Path,
        connector_name: &str,
        spec: &Value,
    ) -> Result<Vec<GeneratedFile>> {
        Ok(vec![GeneratedFile {
            path: format!("connectors/{connector_name}.json"),
            content: spec.to_string(),
        }])
    }
}

#[derive(Default)]
struct RecordingGate {
    plans: Mutex<Vec<Plan>>,
    task_reviews: Mutex<usize>,
    started: Mutex<usize>,
    reject_tasks: bool,
    connector: Option<Value>,
}

#[async_trait]
impl SessionGate for RecordingGate {
    async fn plan_ready(&self, plan: Plan) -> Decision {
        self.plans.lock().push(plan);
        Decision::Approved {
            comment: Some("looks good".to_string()),
        }
    }

    async fn task_ready(&self) -> Decision {
        *self.task_reviews.lock() += 1;
        if self.reject_tasks {
            Decision::Rejected {
                comment: Some("use a constant".to_string()),
            }
        } else {
            Decision::Approved { comment: None }
        }
    }

    fn task_started(&self) {
        *self.started.lock() += 1;
    }

    async fn connector_spec(&self, _request_id: RequestId) -> ConnectorDecision {
        match &self.connector {
            Some(spec) => ConnectorDecision::Provided(spec.clone()),
            None => ConnectorDecision::Skipped(Some("not now".to_string())),
        }
    }
}

struct Fixture {
    _dir: TempDir,
    scratch: PathBuf,
    modified: ModifiedFiles,
    cancel: CancellationToken,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(scratch.join("src")).unwrap();
        std::fs::write(scratch.join("src/lib.rs"), "fn one() {}\nfn two() {}\nfn three() {}\n")
            .unwrap();
        Self {
            _dir: dir,
            scratch,
            modified: ModifiedFiles::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn bindings(&self) -> ToolBindings {
        ToolBindings {
            scratch: self.scratch.clone(),
            modified_files: self.modified.clone(),
            language_server: Arc::new(NoopLanguageServer),
            libraries: Arc::new(StaticLibraryProvider::new(
                vec![
                    Library::new("http", "HTTP client"),
                    Library::new("json", "JSON codec"),
                ],
                vec![Library::new("fhir", "FHIR resources")],
            )),
            connectors: None,
            gate: Arc::new(AutoApproveGate),
            cancel: self.cancel.clone(),
        }
    }

    async fn registry(&self) -> ToolRegistry {
        ToolRegistry::for_generation(self.bindings()).await
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.scratch.join(relative)).unwrap()
    }
}

fn task_list(statuses: &[&str]) -> Value {
    let names = ["Add route", "Add handler", "Add test"];
    json!({
        "tasks": statuses
            .iter()
            .zip(names)
            .map(|(status, description)| json!({"description": description, "status": status}))
            .collect::<Vec<_>>()
    })
}

// ============================================================================
// REGISTRY
// ============================================================================

#[tokio::test]
async fn test_generation_registry_exposes_every_tool() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let names: Vec<&str> = registry.names().iter().map(|n| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "task_write",
            "library_provider",
            "healthcare_library_provider",
            "connector_generator",
            "file_read",
            "file_write",
            "file_edit",
            "file_multi_edit",
            "diagnostics",
        ]
    );
    assert!(registry.definitions().iter().all(|t| !t.description.is_empty()));

    let library = registry.get("library_provider").unwrap();
    assert!(library.description.contains("http, json"));
}

#[tokio::test]
async fn test_unknown_tool_is_an_error() {
    let registry = ToolRegistry::new();
    let err = registry.execute("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, AgentError::UnknownTool(_)));
}

#[tokio::test]
async fn test_register_replaces_same_name() {
    let mut registry = ToolRegistry::new();
    for answer in [1, 2] {
        registry.register(ToolDefinition::new(
            "answer",
            "Returns a number",
            json!({"type": "object"}),
            Arc::new(move |_: Value| -> ToolFuture { Box::pin(async move { json!(answer) }) }),
        ));
    }

    assert_eq!(registry.names().len(), 1);
    assert_eq!(registry.execute("answer", json!({})).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_invalid_input_reports_failure() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let output = registry
        .execute("file_write", json!({"file_path": 42}))
        .await
        .unwrap();
    assert_eq!(output["success"], false);
    assert!(output["message"].as_str().unwrap().contains("file_write"));
}

// ============================================================================
// FILE TOOLS
// ============================================================================

#[tokio::test]
async fn test_file_write_creates_then_updates() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let created = registry
        .execute("file_write", json!({"file_path": "src/new.rs", "content": "// v1\n"}))
        .await
        .unwrap();
    assert_eq!(created["success"], true);
    assert_eq!(created["message"], "Successfully created file src/new.rs");

    let updated = registry
        .execute("file_write", json!({"file_path": "./src/new.rs", "content": "// v2\n"}))
        .await
        .unwrap();
    assert_eq!(updated["message"], "Successfully updated file src/new.rs");

    assert_eq!(f.read("src/new.rs"), "// v2\n");
    assert_eq!(f.modified.to_vec(), ["src/new.rs"]);
}

#[tokio::test]
async fn test_file_write_outside_scratch_is_refused() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let output = registry
        .execute("file_write", json!({"file_path": "../escape.rs", "content": "x"}))
        .await
        .unwrap();

    assert_eq!(output["success"], false);
    assert!(!f.scratch.parent().unwrap().join("escape.rs").exists());
    assert!(f.modified.is_empty());
}

#[tokio::test]
async fn test_file_read_with_offset_and_limit() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let all = registry
        .execute("file_read", json!({"file_path": "src/lib.rs"}))
        .await
        .unwrap();
    assert_eq!(all["total_lines"], 3);

    let window = registry
        .execute("file_read", json!({"file_path": "src/lib.rs", "offset": 2, "limit": 1}))
        .await
        .unwrap();
    assert_eq!(window["content"], "fn two() {}");

    let missing = registry
        .execute("file_read", json!({"file_path": "src/missing.rs"}))
        .await
        .unwrap();
    assert_eq!(missing["success"], false);
    assert!(f.modified.is_empty());
}

#[tokio::test]
async fn test_file_edit_requires_unique_match() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let ambiguous = registry
        .execute(
            "file_edit",
            json!({"file_path": "src/lib.rs", "old_string": "fn ", "new_string": "pub fn "}),
        )
        .await
        .unwrap();
    assert_eq!(ambiguous["success"], false);
    assert!(f.modified.is_empty());

    let all = registry
        .execute(
            "file_edit",
            json!({
                "file_path": "src/lib.rs",
                "old_string": "fn ",
                "new_string": "pub fn ",
                "replace_all": true
            }),
        )
        .await
        .unwrap();
    assert_eq!(all["success"], true);
    assert!(f.read("src/lib.rs").starts_with("pub fn one() {}"));
    assert_eq!(f.modified.to_vec(), ["src/lib.rs"]);
}

#[tokio::test]
async fn test_file_multi_edit_is_atomic() {
    let f = Fixture::new();
    let registry = f.registry().await;
    let before = f.read("src/lib.rs");

    let failed = registry
        .execute(
            "file_multi_edit",
            json!({
                "file_path": "src/lib.rs",
                "edits": [
                    {"old_string": "one", "new_string": "uno"},
                    {"old_string": "four", "new_string": "cuatro"}
                ]
            }),
        )
        .await
        .unwrap();
    assert_eq!(failed["success"], false);
    assert_eq!(f.read("src/lib.rs"), before);

    let applied = registry
        .execute(
            "file_multi_edit",
            json!({
                "file_path": "src/lib.rs",
                "edits": [
                    {"old_string": "one", "new_string": "uno"},
                    {"old_string": "two", "new_string": "dos"}
                ]
            }),
        )
        .await
        .unwrap();
    assert_eq!(applied["success"], true);
    assert_eq!(f.read("src/lib.rs"), "fn uno() {}\nfn dos() {}\nfn three() {}\n");
}

// ============================================================================
// DIAGNOSTICS AND LIBRARIES
// ============================================================================

fn diagnostic(code: &str, severity: Severity) -> Diagnostic {
    serde_json::from_value(json!({
        "file": "src/lib.rs",
        "code": code,
        "message": "problem",
        "severity": severity,
        "range": {
            "start": {"line": 0, "character": 0},
            "end": {"line": 0, "character": 3}
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_diagnostics_tool_summarises() {
    let f = Fixture::new();
    let mut bindings = f.bindings();
    bindings.language_server = Arc::new(FixedDiagnostics(vec![
        diagnostic("E0308", Severity::Error),
        diagnostic("W1", Severity::Warning),
    ]));
    let registry = ToolRegistry::for_generation(bindings).await;

    let output = registry.execute("diagnostics", json!({})).await.unwrap();

    assert_eq!(output["success"], true);
    assert_eq!(output["diagnostics"].as_array().unwrap().len(), 2);
    assert_eq!(output["message"], "Found 2 diagnostic(s), 1 error(s)");
}

#[tokio::test]
async fn test_diagnostics_tool_reports_server_failure() {
    let f = Fixture::new();
    let mut bindings = f.bindings();
    bindings.language_server = Arc::new(FailingLanguageServer);
    let registry = ToolRegistry::for_generation(bindings).await;

    let output = registry.execute("diagnostics", json!({})).await.unwrap();
    assert_eq!(output["success"], false);
    assert!(output["message"].as_str().unwrap().contains("server crashed"));
}

#[tokio::test]
async fn test_library_lookup_by_scope() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let general = registry
        .execute("library_provider", json!({"library_names": ["json", "missing"]}))
        .await
        .unwrap();
    assert_eq!(general, json!([{"name": "json", "description": "JSON codec"}]));

    let healthcare = registry
        .execute("healthcare_library_provider", json!({"library_names": ["fhir", "json"]}))
        .await
        .unwrap();
    assert_eq!(healthcare, json!([{"name": "fhir", "description": "FHIR resources"}]));
}

// ============================================================================
// CONNECTORS
// ============================================================================

#[tokio::test]
async fn test_connector_without_generator_fails() {
    let f = Fixture::new();
    let registry = f.registry().await;

    let output = registry
        .execute("connector_generator", json!({"connector_name": "stripe"}))
        .await
        .unwrap();
    assert_eq!(output["success"], false);
}

#[tokio::test]
async fn test_connector_generated_from_provided_spec() {
    let f = Fixture::new();
    let mut bindings = f.bindings();
    bindings.connectors = Some(Arc::new(StubConnector));
    bindings.gate = Arc::new(RecordingGate {
        connector: Some(json!({"openapi": "3.0.0"})),
        ..RecordingGate::default()
    });
    let registry = ToolRegistry::for_generation(bindings).await;

    let output = registry
        .execute("connector_generator", json!({"connector_name": "stripe"}))
        .await
        .unwrap();

    assert_eq!(output["success"], true);
    assert_eq!(output["files"], json!(["connectors/stripe.json"]));
    assert_eq!(f.read("connectors/stripe.json"), r#"{"openapi":"3.0.0"}"#);
    assert_eq!(f.modified.to_vec(), ["connectors/stripe.json"]);
}

#[tokio::test]
async fn test_connector_skipped_by_user() {
    let f = Fixture::new();
    let mut bindings = f.bindings();
    bindings.connectors = Some(Arc::new(StubConnector));
    bindings.gate = Arc::new(RecordingGate::default());
    let registry = ToolRegistry::for_generation(bindings).await;

    let output = registry
        .execute("connector_generator", json!({"connector_name": "stripe"}))
        .await
        .unwrap();

    assert_eq!(output["success"], false);
    assert_eq!(output["skipped"], true);
    assert_eq!(output["message"], "User skipped connector generation: not now");
    assert!(f.modified.is_empty());
}

// ============================================================================
// TASK WRITER
// ============================================================================

#[tokio::test]
async fn test_task_write_plan_then_completion() {
    let f = Fixture::new();
    let gate = Arc::new(RecordingGate::default());
    let mut bindings = f.bindings();
    bindings.gate = Arc::clone(&gate) as Arc<dyn SessionGate>;
    let registry = ToolRegistry::for_generation(bindings).await;

    let plan = registry
        .execute("task_write", task_list(&["pending", "pending"]))
        .await
        .unwrap();
    assert_eq!(plan["success"], true);
    assert!(plan["message"].as_str().unwrap().starts_with("Plan approved."));
    assert!(plan["message"].as_str().unwrap().ends_with("User comment: looks good"));
    assert_eq!(gate.plans.lock().len(), 1);
    assert_eq!(gate.plans.lock()[0].tasks.len(), 2);
    assert_eq!(*gate.started.lock(), 1);

    let progress = registry
        .execute("task_write", task_list(&["in_progress", "pending"]))
        .await
        .unwrap();
    assert_eq!(progress["message"], "Task list updated.");

    let first = registry
        .execute("task_write", task_list(&["completed", "pending"]))
        .await
        .unwrap();
    assert_eq!(first["message"], "Task approved. Continue with the next task.");
    assert_eq!(*gate.started.lock(), 2);

    let last = registry
        .execute("task_write", task_list(&["completed", "completed"]))
        .await
        .unwrap();
    assert_eq!(last["message"], "Task approved. All tasks are completed.");
    assert_eq!(*gate.task_reviews.lock(), 2);
    assert_eq!(*gate.started.lock(), 2);
    assert_eq!(gate.plans.lock().len(), 1);
}

#[tokio::test]
async fn test_task_write_rejection_restarts_on_in_progress() {
    let f = Fixture::new();
    let gate = Arc::new(RecordingGate {
        reject_tasks: true,
        ..RecordingGate::default()
    });
    let mut bindings = f.bindings();
    bindings.gate = Arc::clone(&gate) as Arc<dyn SessionGate>;
    let registry = ToolRegistry::for_generation(bindings).await;

    registry
        .execute("task_write", task_list(&["in_progress"]))
        .await
        .unwrap();
    let rejected = registry
        .execute("task_write", task_list(&["completed"]))
        .await
        .unwrap();
    assert!(rejected["message"].as_str().unwrap().starts_with("Task rejected."));
    assert_eq!(*gate.started.lock(), 1);

    registry
        .execute("task_write", task_list(&["in_progress"]))
        .await
        .unwrap();
    assert_eq!(*gate.started.lock(), 2);
}

#[tokio::test]
async fn test_task_write_rejects_empty_list() {
    let f = Fixture::new();
    let registry = f.registry().await;
    let output = registry
        .execute("task_write", json!({"tasks": []}))
        .await
        .unwrap();
    assert_eq!(output["success"], false);
}

#[tokio::test]
async fn test_task_write_cancelled_while_waiting() {
    struct NeverGate;

    #[async_trait]
    impl SessionGate for NeverGate {
        async fn plan_ready(&self, _plan: Plan) -> Decision {
            std::future::pending().await
        }

        async fn task_ready(&self) -> Decision {
            std::future::pending().await
        }

        fn task_started(&self) {}

        async fn connector_spec(&self, _request_id: RequestId) -> ConnectorDecision {
            std::future::pending().await
        }
    }

    let f = Fixture::new();
    let mut bindings = f.bindings();
    bindings.gate = Arc::new(NeverGate);
    let registry = ToolRegistry::for_generation(bindings).await;

    f.cancel.cancel();
    let output = registry
        .execute("task_write", task_list(&["pending"]))
        .await
        .unwrap();
    assert!(output["message"].as_str().unwrap().starts_with("Plan rejected."));
}
