//! Subprocess-backed runners, gates and deploy chains against real shell scripts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use autosync_core::{
    CommandSpec, DeployChain, DeployError, DeployOutcome, ModuleConfig, ModuleRunner,
    PipelineExecutor, Plan, PlanAction, PlanItem, RunState, RunnerError, SafetyGate, StageConfig,
};
use autosync_core::config::PatchConfig;
use autosync_core::patch::EditSettings;
use autosync_core::{Intent, PatchEngine, PatchOutcome, PatchRequest, ValidatorConfig};
use autosync_exec::{CommandSafetyGate, CommandValidator, ProcessModuleRunner, StagedDeployChain};
use tempfile::tempdir;

fn write_script(dir: &Path, name: &str, body: &str) {
    if let Some(parent) = dir.join(name).parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(dir.join(name), body).unwrap();
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new(script).with_interpreter("sh")
}

fn modules(entries: &[(&str, &str)]) -> BTreeMap<String, ModuleConfig> {
    entries
        .iter()
        .map(|(name, script)| {
            (
                name.to_string(),
                ModuleConfig {
                    command: sh(script),
                    dir: None,
                },
            )
        })
        .collect()
}

fn patch(module: &str, priority: u32) -> PlanItem {
    PlanItem {
        module: module.to_string(),
        action: PlanAction::Patch,
        priority,
        reason: String::new(),
        target_version: Some("1.2.0".to_string()),
    }
}

#[tokio::test]
async fn runner_reports_exit_codes_and_missing_scripts() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "Core/patch.sh", "echo \"to $AUTOSYNC_TARGET_VERSION\"\n");
    write_script(dir.path(), "Docs/patch.sh", "echo broken >&2\nexit 3\n");
    let runner = ProcessModuleRunner::new(
        dir.path(),
        modules(&[
            ("Core", "Core/patch.sh"),
            ("Docs", "Docs/patch.sh"),
            ("Ghost", "Ghost/patch.sh"),
        ]),
    );

    let ok = runner.run(&patch("Core", 1)).await.unwrap();
    assert!(ok.succeeded());
    assert!(ok.stdout.contains("to 1.2.0"));

    let failed = runner.run(&patch("Docs", 2)).await.unwrap();
    assert_eq!(failed.exit_code, 3);
    assert!(failed.stderr.contains("broken"));

    let missing = runner.run(&patch("Ghost", 3)).await.unwrap_err();
    assert!(matches!(missing, RunnerError::ScriptMissing { .. }));

    let unknown = runner.run(&patch("Nobody", 4)).await.unwrap_err();
    assert!(matches!(unknown, RunnerError::ModuleConfigMissing(_)));
}

async fn run_with_gate(gate_script: Option<&str>) -> RunState {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "Core/patch.sh", "exit 0\n");
    write_script(dir.path(), "gate_ok.sh", "echo all clear\n");
    write_script(dir.path(), "gate_red.sh", "echo status file missing\nexit 1\n");

    let runner = Arc::new(ProcessModuleRunner::new(
        dir.path(),
        modules(&[("Core", "Core/patch.sh")]),
    ));
    let gate = gate_script
        .map(|s| Arc::new(CommandSafetyGate::new(dir.path(), sh(s))) as Arc<dyn SafetyGate>);
    let executor = PipelineExecutor::new(
        runner,
        gate,
        "AutoSync",
        dir.path().join("plan.json"),
        dir.path().join("state/autosync_state.json"),
    );
    let plan = Plan {
        serial_order: vec!["Core".to_string()],
        items: vec![patch("Core", 1)],
    };
    executor.execute(plan, false).await.unwrap().state
}

#[tokio::test]
async fn command_gate_exit_status_maps_to_run_state() {
    assert_eq!(run_with_gate(Some("gate_ok.sh")).await, RunState::Green);
    assert_eq!(run_with_gate(Some("gate_red.sh")).await, RunState::Red);
    assert_eq!(run_with_gate(Some("gate_gone.sh")).await, RunState::NoSafeguard);
    assert_eq!(run_with_gate(None).await, RunState::NoSafeguard);
}

#[tokio::test]
async fn command_gate_collects_output_lines() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "gate.sh", "echo one\n\necho two\nexit 1\n");
    let gate = CommandSafetyGate::new(dir.path(), sh("gate.sh"));
    let outcome = gate.check().await.unwrap();
    assert!(!outcome.passed);
    assert_eq!(outcome.details, vec!["one".to_string(), "two".to_string()]);
}

fn stage(name: &str, script: &str) -> StageConfig {
    StageConfig {
        name: name.to_string(),
        command: sh(script),
    }
}

#[tokio::test]
async fn deploy_chain_skips_unchanged_tree() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "deploy/docs.sh", "echo docs >> state/deploy.log\n");
    std::fs::create_dir_all(dir.path().join("state")).unwrap();
    let chain = StagedDeployChain::new(
        dir.path(),
        vec![stage("docs", "deploy/docs.sh")],
        dir.path().join("state/structure_snapshot.json"),
    )
    .with_exclude(vec!["state".to_string()]);

    let first = chain.deploy().await.unwrap();
    assert_eq!(
        first,
        DeployOutcome::Deployed {
            stages: vec!["docs".to_string()]
        }
    );
    assert_eq!(chain.deploy().await.unwrap(), DeployOutcome::NoChange);

    let log = std::fs::read_to_string(dir.path().join("state/deploy.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn deploy_chain_stops_at_failing_stage() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "deploy/build.sh", "echo build failed\nexit 4\n");
    write_script(dir.path(), "deploy/upload.sh", "touch uploaded\n");
    let chain = StagedDeployChain::new(
        dir.path(),
        vec![
            stage("build", "deploy/build.sh"),
            stage("upload", "deploy/upload.sh"),
        ],
        dir.path().join("snapshot.json"),
    );

    let err = chain.deploy().await.unwrap_err();
    match err {
        DeployError::StageFailed {
            stage,
            exit_code,
            output,
        } => {
            assert_eq!(stage, "build");
            assert_eq!(exit_code, 4);
            assert!(output.contains("build failed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("uploaded").exists());
    assert!(!dir.path().join("snapshot.json").exists());
}

#[tokio::test]
async fn deploy_chain_is_blocked_by_red_revalidation() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "gate.sh", "exit 1\n");
    write_script(dir.path(), "deploy/docs.sh", "touch deployed\n");
    let gate = Arc::new(CommandSafetyGate::new(dir.path(), sh("gate.sh")));
    let chain = StagedDeployChain::new(
        dir.path(),
        vec![stage("docs", "deploy/docs.sh")],
        dir.path().join("snapshot.json"),
    )
    .with_gate(gate);

    let outcome = chain.deploy().await.unwrap();
    assert!(matches!(outcome, DeployOutcome::Blocked { .. }));
    assert!(!dir.path().join("deployed").exists());
}

#[tokio::test]
async fn missing_stage_script_is_an_invocation_error() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "README", "x\n");
    let chain = StagedDeployChain::new(
        dir.path(),
        vec![stage("docs", "deploy/missing.sh")],
        dir.path().join("snapshot.json"),
    );
    let err = chain.deploy().await.unwrap_err();
    assert!(matches!(err, DeployError::Invocation { .. }));
}

fn shell_patch_engine(dir: &Path) -> PatchEngine {
    let check = vec!["sh".to_string(), "-n".to_string(), "{path}".to_string()];
    PatchEngine::new(
        [("Deploy".to_string(), dir.join("deploy.sh"))].into(),
        EditSettings::from_config(&PatchConfig::default()).unwrap(),
        dir.join("sandbox"),
        dir.join("backups"),
    )
    .with_validator(Box::new(CommandValidator::new(ValidatorConfig {
        extensions: vec!["sh".to_string()],
        syntax: check.clone(),
        simulate: check,
    })))
}

#[cfg(unix)]
#[test]
fn shell_target_is_patched_in_place_and_stays_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    write_script(dir.path(), "deploy.sh", "# Version: 1.0\necho deploy\n");
    let target = dir.path().join("deploy.sh");
    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();
    let engine = shell_patch_engine(dir.path());

    let out = engine
        .apply(&PatchRequest {
            module: "Deploy".to_string(),
            intent: Intent::UpdateVersion {
                version: Some("1.1".to_string()),
            },
        })
        .unwrap();

    assert!(matches!(out, PatchOutcome::Applied { .. }), "{out:?}");
    assert!(std::fs::read_to_string(&target).unwrap().starts_with("# Version: 1.1"));
    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn shell_syntax_error_blocks_the_patch() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "deploy.sh", "# Version: 1.0\necho deploy\n");
    let engine = shell_patch_engine(dir.path());

    let out = engine
        .apply(&PatchRequest {
            module: "Deploy".to_string(),
            intent: Intent::ReplaceText {
                search: "echo deploy".to_string(),
                replace: "if then (".to_string(),
            },
        })
        .unwrap();

    assert_eq!(out.status(), "BLOCK");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("deploy.sh")).unwrap(),
        "# Version: 1.0\necho deploy\n"
    );
}
