//! Runs against a real directory, plus the CLI commands that read it back.

use super::test_utils::{config, plan, with_config_env, IdPrompt, ScriptedProvider};
use pagesmith::cli::{Commands, ConfigCommands, RunContext};
use pagesmith::error::CommandError;
use pagesmith::generation::{ExecutionMode, FsArtifactStore, Generator, ItemStatus, PlanStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn artifacts_are_cleaned_and_written_under_the_root() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new();
    provider.script(
        "page-0",
        vec![Ok(
            "```markdown\n---\ntitle: Home\ndraft: flase\n---\nWelcome.\n```".to_string(),
        )],
    );
    let store = Arc::new(FsArtifactStore::new(dir.path()));
    let generator = Generator::new(config(ExecutionMode::Parallel), provider.clone(), store)
        .with_prompt_builder(Arc::new(IdPrompt));
    let mut plan = plan(3);

    let report = generator.run(&mut plan, CancellationToken::new()).await;
    assert!(report.is_success());

    let home = std::fs::read_to_string(dir.path().join("content/page-0.md")).unwrap();
    assert_eq!(home, "---\ntitle: Home\ndraft: false\n---\nWelcome.");
    assert!(dir.path().join("content/page-2.md").exists());

    // A fresh plan over the same directory finds every artifact in place.
    let mut again = super::test_utils::plan(3);
    let report = generator.run(&mut again, CancellationToken::new()).await;
    assert!(report.outputs.iter().all(|output| output.skipped));
    assert_eq!(provider.calls().len(), 3);
    assert_eq!(again.stats.skipped, 3);
    assert_eq!(again.status, PlanStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn dry_run_leaves_the_directory_empty() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = config(ExecutionMode::Sequential);
    pipeline.dry_run = true;
    let generator = Generator::new(
        pipeline,
        ScriptedProvider::new(),
        Arc::new(FsArtifactStore::new(dir.path())),
    )
    .with_prompt_builder(Arc::new(IdPrompt));
    let mut plan = plan(2);

    let report = generator.run(&mut plan, CancellationToken::new()).await;

    assert_eq!(report.produced(), 2);
    assert_eq!(
        report.outputs[1].content.as_deref(),
        Some("content for page-1")
    );
    assert!(!dir.path().join("content").exists());
}

fn context(workspace: &TempDir, env_dir: &TempDir, toml: &str) -> RunContext {
    let config_path = workspace.path().join("custom.toml");
    std::fs::write(&config_path, toml).unwrap();
    with_config_env(env_dir, &[], || {
        RunContext::new(workspace.path().to_path_buf(), Some(config_path.clone()))
    })
    .unwrap()
}

#[tokio::test]
async fn status_command_reports_saved_plan() {
    let workspace = TempDir::new().unwrap();
    let env_dir = TempDir::new().unwrap();
    let mut saved = plan(3);
    saved.items[1].status = ItemStatus::Failed;
    saved.items[1].last_error = Some("Provider authentication failed: bad key".to_string());
    saved.refresh();
    saved.save(&workspace.path().join("plan.json")).unwrap();

    let ctx = context(&workspace, &env_dir, "[provider]\napi_key = \"sk-test\"\n");
    let output = ctx
        .execute(
            &Commands::Status {
                plan: PathBuf::from("plan.json"),
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(output.contains("3 items: 0 completed, 0 skipped, 1 failed, 2 pending"));
    assert!(output.contains("page-1 (content/page-1.md): Provider authentication failed: bad key"));
}

#[tokio::test]
async fn config_show_redacts_the_api_key() {
    let workspace = TempDir::new().unwrap();
    let env_dir = TempDir::new().unwrap();
    let ctx = context(
        &workspace,
        &env_dir,
        "[provider]\napi_key = \"sk-secret\"\n\n[pipeline]\nmax_attempts = 7\n",
    );

    let output = ctx
        .execute(
            &Commands::Config {
                command: ConfigCommands::Show,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(output.contains("max_attempts = 7"));
    assert!(output.contains("<redacted>"));
    assert!(!output.contains("sk-secret"));
}

#[tokio::test]
async fn run_without_credentials_fails_before_loading_the_plan() {
    let workspace = TempDir::new().unwrap();
    let env_dir = TempDir::new().unwrap();
    let ctx = context(&workspace, &env_dir, "[pipeline]\nmax_attempts = 2\n");

    let result = ctx
        .execute(
            &Commands::Run {
                plan: PathBuf::from("missing.json"),
                mode: None,
                dry_run: false,
                overwrite: false,
                stop_on_error: false,
            },
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(CommandError::Config(err)) => assert!(err.to_string().contains("api_key")),
        other => panic!("unexpected result: {other:?}"),
    }
}
