//! Unit tests for scratch workspaces, integration, checkpoints and metrics

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use kodegen_agent_session::workspace::{integrate, measure};
use kodegen_agent_session::{
    AgentError, CheckpointManager, ExecutionContext, MessageId, ScratchWorkspaces,
    SessionOptions,
};

struct Fixture {
    dir: TempDir,
    workspaces: ScratchWorkspaces,
    options: Arc<SessionOptions>,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let options = Arc::new(
            SessionOptions::builder()
                .scratch_root(dir.path().join("scratch"))
                .build(),
        );
        Self {
            workspaces: ScratchWorkspaces::new(Arc::clone(&options)),
            options,
            dir,
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn read(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative)).unwrap()
}

// ============================================================================
// SCRATCH WORKSPACES
// ============================================================================

#[tokio::test]
async fn test_create_copies_project_without_ignored_dirs() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "src/main.rs", "fn main() {}\n");
    write(&project, "Cargo.toml", "[package]\n");
    write(&project, ".git/HEAD", "ref: refs/heads/main\n");
    write(&project, "target/debug/app", "binary");

    let scratch = f
        .workspaces
        .create(&ExecutionContext::project(&project))
        .await
        .unwrap();

    assert!(scratch.starts_with(f.workspaces.root()));
    assert_eq!(read(&scratch, "src/main.rs"), "fn main() {}\n");
    assert!(scratch.join("Cargo.toml").exists());
    assert!(!scratch.join(".git").exists());
    assert!(!scratch.join("target").exists());

    let other = f
        .workspaces
        .create(&ExecutionContext::project(&project))
        .await
        .unwrap();
    assert_ne!(scratch, other);
}

#[tokio::test]
async fn test_create_rejects_missing_project() {
    let f = Fixture::new();
    let err = assert_err!(
        f.workspaces
            .create(&ExecutionContext::project(f.path("missing")))
            .await
    );
    assert!(matches!(err, AgentError::Workspace(_)));
}

#[tokio::test]
async fn test_project_sources_single_project() {
    let f = Fixture::new();
    let project = f.path("service");
    write(&project, "src/lib.rs", "");
    write(&project, "README.md", "");
    let ctx = ExecutionContext::project(&project);
    let scratch = f.workspaces.create(&ctx).await.unwrap();

    let sources = f.workspaces.project_sources(&scratch, &ctx).unwrap();

    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].project_name, "service");
    assert_eq!(sources[0].relative_root, "");
    let mut files = sources[0].files.clone();
    files.sort();
    assert_eq!(files, ["README.md", "src/lib.rs"]);
}

#[tokio::test]
async fn test_project_sources_inside_workspace() {
    let f = Fixture::new();
    let workspace = f.path("workspace");
    write(&workspace, "shared/lib.rs", "");
    write(&workspace, "apps/billing/main.rs", "");
    let ctx = ExecutionContext::in_workspace(workspace.join("apps/billing"), &workspace);

    let scratch = f.workspaces.create(&ctx).await.unwrap();
    assert!(scratch.join("shared/lib.rs").exists());

    let sources = f.workspaces.project_sources(&scratch, &ctx).unwrap();
    assert_eq!(sources[0].project_name, "billing");
    assert_eq!(sources[0].relative_root, "apps/billing");
    assert_eq!(sources[0].files, ["apps/billing/main.rs"]);
}

#[test]
fn test_project_outside_workspace_is_rejected() {
    let f = Fixture::new();
    let ctx = ExecutionContext::in_workspace(f.path("elsewhere"), f.path("workspace"));
    assert_err!(f.workspaces.project_sources(&f.path("scratch"), &ctx));
}

#[test]
fn test_resolve_stays_inside_scratch() {
    let scratch = Path::new("/tmp/scratch/abc");

    assert_eq!(
        ScratchWorkspaces::resolve(scratch, "src/./lib.rs").unwrap(),
        scratch.join("src/lib.rs")
    );
    assert_eq!(
        ScratchWorkspaces::resolve(scratch, "src/../Cargo.toml").unwrap(),
        scratch.join("Cargo.toml")
    );
    assert_eq!(
        ScratchWorkspaces::resolve(scratch, "/tmp/scratch/abc/src/lib.rs").unwrap(),
        scratch.join("src/lib.rs")
    );

    for escape in ["../outside.rs", "src/../../outside.rs", "/etc/passwd", "", "."] {
        assert!(
            matches!(
                ScratchWorkspaces::resolve(scratch, escape),
                Err(AgentError::PathEscape(_))
            ),
            "{escape:?} should be rejected"
        );
    }
}

#[test]
fn test_translate_maps_into_real_project() {
    let scratch = Path::new("/tmp/scratch/abc");
    let real = Path::new("/home/user/project");

    assert_eq!(
        ScratchWorkspaces::translate(scratch, real, "src/lib.rs").unwrap(),
        real.join("src/lib.rs")
    );
    assert_err!(ScratchWorkspaces::translate(scratch, real, "../x"));
}

#[tokio::test]
async fn test_teardown_is_idempotent_and_scoped() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "a.txt", "a");
    let scratch = f
        .workspaces
        .create(&ExecutionContext::project(&project))
        .await
        .unwrap();

    f.workspaces.teardown(&scratch).await;
    assert!(!scratch.exists());
    f.workspaces.teardown(&scratch).await;

    f.workspaces.teardown(&project).await;
    assert!(project.join("a.txt").exists());
}

#[tokio::test]
async fn test_detached_teardown_removes_scratch() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "a.txt", "a");
    let scratch = f
        .workspaces
        .create(&ExecutionContext::project(&project))
        .await
        .unwrap();

    f.workspaces.teardown_detached(scratch.clone());

    for _ in 0..200 {
        if !scratch.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!scratch.exists());
    assert!(project.join("a.txt").exists());
}

// ============================================================================
// INTEGRATION
// ============================================================================

#[tokio::test]
async fn test_integrate_copies_and_removes() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "src/lib.rs", "old\n");
    write(&project, "src/obsolete.rs", "gone\n");
    write(&project, "untouched.rs", "same\n");
    let ctx = ExecutionContext::project(&project);
    let scratch = f.workspaces.create(&ctx).await.unwrap();

    write(&scratch, "src/lib.rs", "new\n");
    write(&scratch, "src/added/mod.rs", "added\n");
    write(&scratch, "untouched.rs", "changed but not reported\n");
    std::fs::remove_file(scratch.join("src/obsolete.rs")).unwrap();

    let modified = vec![
        "src/lib.rs".to_string(),
        "src/added/mod.rs".to_string(),
        "src/obsolete.rs".to_string(),
        "never/existed.rs".to_string(),
    ];
    let applied = integrate(&scratch, &modified, &ctx).await.unwrap();

    assert_eq!(applied, 3);
    assert_eq!(read(&project, "src/lib.rs"), "new\n");
    assert_eq!(read(&project, "src/added/mod.rs"), "added\n");
    assert!(!project.join("src/obsolete.rs").exists());
    assert_eq!(read(&project, "untouched.rs"), "same\n");
}

#[tokio::test]
async fn test_integrate_into_workspace_root() {
    let f = Fixture::new();
    let workspace = f.path("workspace");
    write(&workspace, "apps/web/index.ts", "old");
    let ctx = ExecutionContext::in_workspace(workspace.join("apps/web"), &workspace);
    let scratch = f.workspaces.create(&ctx).await.unwrap();

    write(&scratch, "apps/web/index.ts", "new");
    assert_ok!(integrate(&scratch, &["apps/web/index.ts".to_string()], &ctx).await);

    assert_eq!(read(&workspace, "apps/web/index.ts"), "new");
}

#[tokio::test]
async fn test_integrate_rejects_escaping_path() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "a.txt", "a");
    let ctx = ExecutionContext::project(&project);
    let scratch = f.workspaces.create(&ctx).await.unwrap();

    let result = integrate(&scratch, &["../../evil.txt".to_string()], &ctx).await;
    assert!(matches!(result, Err(AgentError::PathEscape(_))));
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

#[tokio::test]
async fn test_checkpoint_capture_and_restore() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "src/main.rs", "fn main() {}\n");
    write(&project, "notes.md", "v1\n");
    write(&project, ".git/config", "[core]\n");
    let manager = CheckpointManager::new(Arc::clone(&f.options));

    let checkpoint = manager
        .capture(&project, MessageId::new("m1"))
        .await
        .unwrap();
    assert_eq!(checkpoint.message_id, MessageId::new("m1"));
    assert_eq!(
        checkpoint.files.keys().cloned().collect::<Vec<_>>(),
        ["notes.md", "src/main.rs"]
    );

    write(&project, "notes.md", "v2\n");
    write(&project, "src/extra.rs", "// new\n");
    std::fs::remove_file(project.join("src/main.rs")).unwrap();

    manager.restore(&project, &checkpoint).await.unwrap();

    assert_eq!(read(&project, "notes.md"), "v1\n");
    assert_eq!(read(&project, "src/main.rs"), "fn main() {}\n");
    assert!(!project.join("src/extra.rs").exists());
    assert_eq!(read(&project, ".git/config"), "[core]\n");
}

#[tokio::test]
async fn test_checkpoint_keeps_binary_files() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "a.txt", "a");
    let manager = CheckpointManager::new(Arc::clone(&f.options));
    let checkpoint = manager.capture(&project, MessageId::new("m1")).await.unwrap();

    std::fs::write(project.join("logo.png"), [0xff_u8, 0xfe, 0x00, 0x9f]).unwrap();
    manager.restore(&project, &checkpoint).await.unwrap();

    assert!(project.join("logo.png").exists());
}

#[tokio::test]
async fn test_checkpoint_of_missing_project_fails() {
    let f = Fixture::new();
    let manager = CheckpointManager::new(Arc::clone(&f.options));
    let err = manager
        .capture(&f.path("missing"), MessageId::new("m1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Checkpoint(_)));
}

// ============================================================================
// METRICS
// ============================================================================

#[test]
fn test_measure_counts_files_and_lines() {
    let f = Fixture::new();
    let project = f.path("project");
    write(&project, "a.txt", "one\ntwo\nthree");
    write(&project, "b.txt", "single");
    write(&project, "node_modules/dep/index.js", "ignored\nignored");
    std::fs::write(project.join("blob.bin"), [0xff_u8, 0xfe]).unwrap();

    let metrics = measure(&project, &f.options);

    assert_eq!(metrics.file_count, 3);
    assert_eq!(metrics.line_count, 4);
}

#[test]
fn test_measure_missing_directory_is_empty() {
    let f = Fixture::new();
    let metrics = measure(&f.path("missing"), &f.options);
    assert_eq!(metrics.file_count, 0);
    assert_eq!(metrics.line_count, 0);
}
