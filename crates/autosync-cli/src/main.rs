//! AutoSync CLI
//!
//! The `autosync` command plans, patches, validates and deploys a set of
//! independently versioned modules living under one base directory.
//!
//! ## Commands
//!
//! - `plan`: Build the action plan from the module status file
//! - `run`: Execute the plan once and gate the result
//! - `loop`: Repeat run + deploy until the rollout converges
//! - `check`: Run the safety gate on its own
//! - `summary`: Show the resolved configuration
//! - `guard`: Inspect files for dangerous or invalid content
//! - `patch`: Apply one guarded edit to a module file
//! - `heal`: Repair state files and the structure snapshot

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use autosync_core::obs;
use autosync_core::{
    heal_snapshot, init_tracing, AutosyncContext, BuiltinSafetyGate, DeployChain,
    FileHealthStore, GateConfig, HybridLoop, Intent, LoopOptions, PatchEngine, PatchOutcome,
    PatchRequest, PipelineExecutor, PlanBuilder, RunState,
};
use autosync_exec::{gate_from_context, CommandValidator, ProcessModuleRunner, StagedDeployChain};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn, Instrument, Level};

#[derive(Parser)]
#[command(name = "autosync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plan, patch, validate and deploy module rollouts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the modules, config, plan and state
    #[arg(long, global = true, env = "AUTOSYNC_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the action plan from module health and version status
    Plan,

    /// Execute the current plan once
    Run {
        /// Walk the plan without running any module
        #[arg(long)]
        dry_run: bool,
    },

    /// Repeat pipeline and deploy until converged, not GREEN, or out of loops
    Loop {
        /// Upper bound on iterations (default from config)
        #[arg(long)]
        max_loops: Option<u32>,

        /// Iterations to run before a zero-patch loop may stop (default from config)
        #[arg(long)]
        min_loops: Option<u32>,

        /// Seconds to sleep between iterations (default from config)
        #[arg(long)]
        sleep: Option<u64>,

        /// Walk the plan without running modules or deploying
        #[arg(long)]
        dry_run: bool,

        /// Skip the deploy chain entirely
        #[arg(long)]
        disable_core: bool,
    },

    /// Run the configured safety gate; exits 0 only when GREEN
    Check {
        /// Write the builtin gate report to the reports directory
        #[arg(long)]
        export: bool,
    },

    /// Show the resolved configuration
    Summary,

    /// Inspect files for dangerous patterns and syntax problems
    Guard {
        /// Files to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Apply one guarded edit to a module's target file
    Patch {
        /// Module whose allow-listed target is edited
        #[arg(short, long)]
        module: String,

        #[arg(short, long, value_enum)]
        intent: IntentKind,

        /// New version (update-version)
        #[arg(long)]
        version: Option<String>,

        /// Feature block name (create-feature)
        #[arg(long)]
        name: Option<String>,

        /// Feature block body (create-feature)
        #[arg(long)]
        body: Option<String>,

        /// Dotted config key (update-config)
        #[arg(long)]
        key: Option<String>,

        /// JSON value, or a plain string (update-config)
        #[arg(long)]
        value: Option<String>,

        /// Text to find (replace-text)
        #[arg(long)]
        search: Option<String>,

        /// Replacement text (replace-text)
        #[arg(long)]
        replace: Option<String>,
    },

    /// Repair configured state files and prune the structure snapshot
    Heal,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Plan => "plan",
            Commands::Run { .. } => "run",
            Commands::Loop { .. } => "loop",
            Commands::Check { .. } => "check",
            Commands::Summary => "summary",
            Commands::Guard { .. } => "guard",
            Commands::Patch { .. } => "patch",
            Commands::Heal => "heal",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum IntentKind {
    UpdateVersion,
    CreateFeature,
    UpdateConfig,
    ReplaceText,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let ctx = AutosyncContext::open(&cli.base_dir)
        .with_context(|| format!("Failed to open AutoSync base dir {:?}", cli.base_dir))?;

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level, Some(&ctx.logs_dir()));

    let span = obs::command_span(cli.command.name());
    dispatch(&ctx, cli.command).instrument(span).await
}

async fn dispatch(ctx: &AutosyncContext, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Plan => cmd_plan(ctx),
        Commands::Run { dry_run } => cmd_run(ctx, dry_run).await,
        Commands::Loop {
            max_loops,
            min_loops,
            sleep,
            dry_run,
            disable_core,
        } => cmd_loop(ctx, max_loops, min_loops, sleep, dry_run, disable_core).await,
        Commands::Check { export } => cmd_check(ctx, export).await,
        Commands::Summary => cmd_summary(ctx),
        Commands::Guard { paths } => cmd_guard(ctx, &paths),
        Commands::Patch {
            module,
            intent,
            version,
            name,
            body,
            key,
            value,
            search,
            replace,
        } => {
            let intent = match intent {
                IntentKind::UpdateVersion => Intent::UpdateVersion { version },
                IntentKind::CreateFeature => Intent::CreateFeature { name, body },
                IntentKind::UpdateConfig => Intent::UpdateConfig {
                    key: key.context("--key is required for update-config")?,
                    value: parse_value(&value.context("--value is required for update-config")?),
                },
                IntentKind::ReplaceText => Intent::ReplaceText {
                    search: search.context("--search is required for replace-text")?,
                    replace: replace.unwrap_or_default(),
                },
            };
            cmd_patch(ctx, PatchRequest { module, intent })
        }
        Commands::Heal => cmd_heal(ctx),
    }
}

fn exit_for(state: RunState) -> ExitCode {
    if state.is_green() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// `--value 3` is the number 3, `--value fast` is the string "fast".
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn cmd_plan(ctx: &AutosyncContext) -> Result<ExitCode> {
    let store = FileHealthStore::new(ctx.status_path());
    let order = &ctx.config().serial_order;
    let plan = PlanBuilder::new(&store, order)
        .build()
        .context("Failed to build plan")?;
    plan.save(&ctx.plan_path())
        .with_context(|| format!("Failed to write plan to {:?}", ctx.plan_path()))?;

    for item in &plan.items {
        println!(
            "{:>3}  {:<10} {:<12} {}",
            item.priority, item.action, item.module, item.reason
        );
    }
    println!("Plan written to {}", ctx.plan_path().display());
    Ok(ExitCode::SUCCESS)
}

fn executor(ctx: &AutosyncContext) -> PipelineExecutor {
    let runner = Arc::new(ProcessModuleRunner::from_context(ctx));
    PipelineExecutor::from_context(ctx, runner, gate_from_context(ctx))
}

async fn cmd_run(ctx: &AutosyncContext, dry_run: bool) -> Result<ExitCode> {
    let result = executor(ctx)
        .run_from_file(dry_run)
        .await
        .context("Pipeline run failed")?;

    for r in &result.patch_results {
        let mark = if r.success { "ok" } else { "FAILED" };
        println!("{:<12} {:<6} exit={} {}", r.module, mark, r.exit_code, r.message);
    }
    println!(
        "State: {} ({} patched{})",
        result.state,
        result.patched_count(),
        if dry_run { ", dry run" } else { "" }
    );
    if dry_run {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(exit_for(result.state))
}

async fn cmd_loop(
    ctx: &AutosyncContext,
    max_loops: Option<u32>,
    min_loops: Option<u32>,
    sleep: Option<u64>,
    dry_run: bool,
    disable_core: bool,
) -> Result<ExitCode> {
    let mut opts = LoopOptions::from(ctx.config().loop_defaults);
    if let Some(n) = max_loops {
        opts.max_loops = n;
    }
    if let Some(n) = min_loops {
        opts.min_loops = n;
    }
    if let Some(secs) = sleep {
        opts.sleep = Duration::from_secs(secs);
    }
    opts.dry_run = dry_run;
    opts.disable_deploy = disable_core;

    let gate = gate_from_context(ctx);
    let runner = Arc::new(ProcessModuleRunner::from_context(ctx));
    let store = Arc::new(FileHealthStore::new(ctx.status_path()));
    let pipeline = PipelineExecutor::from_context(ctx, runner, gate.clone())
        .with_planner(store, ctx.config().serial_order.clone());
    let chain = StagedDeployChain::from_context(ctx, gate);

    let summary = HybridLoop::new(&pipeline, Some(&chain as &dyn DeployChain))
        .with_history(ctx.loop_history_path())
        .run(opts)
        .await
        .context("Hybrid loop failed")?;

    for stats in &summary.loop_stats {
        println!(
            "loop {:>2}: {} ({} patched)",
            stats.loop_index, stats.state, stats.patched_count
        );
    }
    println!(
        "Finished after {} loop(s): {} total patched, last state {}, stop reason {}",
        summary.loops_ran,
        summary.total_patched,
        summary.last_state,
        summary.stop_reason.as_str()
    );
    if let Some(err) = &summary.deploy_error {
        println!("Deploy error: {err}");
        return Ok(ExitCode::FAILURE);
    }
    if dry_run {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(exit_for(summary.last_state))
}

async fn cmd_check(ctx: &AutosyncContext, export: bool) -> Result<ExitCode> {
    match &ctx.config().safeguard {
        Some(GateConfig::Command { .. }) => {
            if export {
                warn!("--export only applies to the builtin gate; ignored");
            }
            let Some(gate) = gate_from_context(ctx) else {
                return Ok(ExitCode::FAILURE);
            };
            let outcome = gate.check().await;
            let state = autosync_core::gate::state_from_gate(&outcome);
            match &outcome {
                Ok(o) => o.details.iter().for_each(|d| println!("  {d}")),
                Err(e) => println!("  {e}"),
            }
            println!("Safeguard: {state}");
            Ok(exit_for(state))
        }
        // `check` always runs the builtin checks when no external gate is set.
        Some(GateConfig::Builtin) | None => {
            let report = BuiltinSafetyGate::from_context(ctx).evaluate();
            for check in &report.checks {
                let mark = if check.passed { "ok" } else { "FAIL" };
                println!("  [{mark:>4}] {}: {}", check.name, check.detail);
            }
            for warning in &report.warnings {
                println!("  [warn] {warning}");
            }
            if export {
                let path = report
                    .export(&ctx.reports_dir())
                    .context("Failed to export safeguard report")?;
                println!("Report: {}", path.display());
            }
            println!("Safeguard: {}", report.state);
            Ok(exit_for(report.state))
        }
    }
}

fn cmd_summary(ctx: &AutosyncContext) -> Result<ExitCode> {
    let config = ctx.config();
    let gate = match &config.safeguard {
        Some(GateConfig::Builtin) => "builtin".to_string(),
        Some(GateConfig::Command { script, .. }) => format!("command ({})", script.display()),
        None => "none".to_string(),
    };

    println!("AutoSync {}", config.version);
    println!("Base dir:     {}", ctx.base_dir().display());
    println!("Config:       {}", ctx.config_path().display());
    println!("Plan:         {}", ctx.plan_path().display());
    println!("Status:       {}", ctx.status_path().display());
    println!("State:        {}", ctx.state_path().display());
    println!("Safeguard:    {gate}");
    println!("Serial order: {}", config.serial_order.join(" -> "));
    println!("Modules:");
    for (name, module) in &config.modules {
        println!("  {name:<12} {}", module.command.script.display());
    }
    println!("Deploy stages:");
    for stage in &config.deploy.stages {
        println!("  {:<12} {}", stage.name, stage.command.script.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn patch_engine(ctx: &AutosyncContext) -> Result<PatchEngine> {
    let engine = PatchEngine::from_context(ctx).context("Invalid patch configuration")?;
    Ok(match &ctx.config().patch.validator {
        Some(config) => engine.with_validator(Box::new(CommandValidator::new(config.clone()))),
        None => engine,
    })
}

fn cmd_guard(ctx: &AutosyncContext, paths: &[PathBuf]) -> Result<ExitCode> {
    let resolved: Vec<PathBuf> = paths.iter().map(|p| resolve_arg(ctx, p)).collect();
    let report = patch_engine(ctx)?.guard(&resolved, &ctx.module_dirs());
    print_json(&report)?;
    Ok(if report.summary.block == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Relative CLI paths are taken from the working directory when they exist
/// there, otherwise from the base dir.
fn resolve_arg(ctx: &AutosyncContext, path: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        ctx.resolve(path)
    }
}

fn cmd_patch(ctx: &AutosyncContext, request: PatchRequest) -> Result<ExitCode> {
    let outcome = patch_engine(ctx)?
        .apply(&request)
        .with_context(|| format!("Failed to patch module {}", request.module))?;
    info!(module = %request.module, status = outcome.status(), "patch finished");
    print_json(&outcome)?;
    Ok(match outcome {
        PatchOutcome::Applied { .. } | PatchOutcome::NoChange => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn cmd_heal(ctx: &AutosyncContext) -> Result<ExitCode> {
    let records = autosync_core::heal_configured(ctx).context("Failed to heal state files")?;
    let mut issues: Vec<String> = records.iter().filter_map(|r| r.issue()).collect();

    let snapshot_issues = heal_snapshot(&ctx.snapshot_path(), ctx.base_dir())
        .context("Failed to heal structure snapshot")?;
    issues.extend(snapshot_issues);

    if issues.is_empty() {
        println!("Nothing to heal");
    }
    for issue in &issues {
        println!("{issue}");
    }
    Ok(ExitCode::SUCCESS)
}
