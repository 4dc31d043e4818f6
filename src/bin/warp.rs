//! The `warp` CLI: `build` / `watch` / `init` over a [`warp_build`] package
//! (`spec.md` §6).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::prelude::*;

use warp_build::backend::default_backend;
use warp_build::config::{self, Target};
use warp_build::dedup;
use warp_build::error::{ErrorKind, Result as WarpResult, WarpError};
use warp_build::manifest;
use warp_build::orchestrator::{self, BuildOptions, CompileResult};
use warp_build::size_report;
use warp_build::target::{self, Plan};
use warp_build::worker::pool::{worker_count, WorkerPool, WORKER_LOOP_FLAG};
use warp_build::{BufferLayer, CancellationToken, DiagnosticBuffer};

#[derive(Debug, Parser)]
#[clap(name = "warp", version, about = "Parallel multi-target compiler orchestrator")]
struct App {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline once.
    Build(BuildArgs),
    /// Build, then rebuild on source/config change.
    Watch(BuildArgs),
    /// Scaffold a default config.
    Init {
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Parser)]
struct BuildArgs {
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long)]
    dry_run: bool,
    #[clap(long)]
    no_clean: bool,
    #[clap(long)]
    parallel: bool,
    #[clap(long = "target")]
    targets: Vec<String>,
    #[clap(long)]
    stats: bool,
    #[clap(long)]
    json: bool,
    #[clap(long, short = 'v')]
    verbose: bool,
    #[clap(long, short = 'q')]
    quiet: bool,
}

#[derive(Debug, Serialize)]
struct JsonTarget {
    name: String,
    condition: String,
    success: bool,
    #[serde(rename = "compileTimeMs")]
    compile_time_ms: u64,
    deduped: bool,
    #[serde(rename = "outDir")]
    out_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct JsonOutput {
    success: bool,
    #[serde(rename = "totalTimeMs")]
    total_time_ms: u64,
    targets: Vec<JsonTarget>,
    #[serde(rename = "sizeReport", skip_serializing_if = "Option::is_none")]
    size_report: Option<Vec<size_report::TargetSizeReport>>,
}

fn main() -> ExitCode {
    // Re-exec under the hidden worker flag before any normal CLI parsing.
    if std::env::args().nth(1).as_deref() == Some(WORKER_LOOP_FLAG) {
        return run_worker();
    }

    let app = App::parse();
    match &app.command {
        Command::Build(args) => {
            let buffer = init_tracing(args.verbose, args.quiet || args.json);
            let exit = run_build(args);
            if !matches!(exit, ExitCode::SUCCESS) {
                if let Some(buffer) = buffer {
                    buffer.replay_to_stderr();
                }
            }
            exit
        }
        Command::Watch(args) => {
            init_tracing(args.verbose, args.quiet || args.json);
            run_watch(args)
        }
        Command::Init { config } => run_init(config.as_deref()),
    }
}

/// Installs the global `tracing` subscriber. While quiet/json, events are
/// captured into a [`DiagnosticBuffer`] instead of printed immediately, and
/// replayed to stderr only if the build subsequently fails (`spec.md` §7).
fn init_tracing(verbose: bool, quiet: bool) -> Option<DiagnosticBuffer> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if quiet {
        let buffer = DiagnosticBuffer::new();
        tracing_subscriber::Registry::default()
            .with(filter)
            .with(BufferLayer::new(buffer.clone()))
            .init();
        Some(buffer)
    } else {
        tracing_subscriber::Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().without_time().with_target(false))
            .init();
        None
    }
}

fn run_worker() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(_) => return ExitCode::from(2),
    };
    match runtime.block_on(warp_build::worker::run_loop()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::from(2),
    }
}

fn run_build(args: &BuildArgs) -> ExitCode {
    // Typed errors (`WarpError`) are all "known" per spec.md §7's table and
    // exit 1; anything that unwinds out of `try_build` instead (a bug, not a
    // modeled failure mode) is the "unexpected error" case and exits 2.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| try_build(args)));

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            eprintln!("internal error: {message}");
            return ExitCode::from(2);
        }
    };

    match result {
        Ok((success, output, results)) => {
            if args.json {
                println!("{}", serde_json::to_string(&output).unwrap());
            } else if !args.quiet {
                for r in &results {
                    if !r.diagnostic_text.is_empty() {
                        eprint!("{}", r.diagnostic_text);
                    }
                }
            }
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

fn try_build(args: &BuildArgs) -> WarpResult<(bool, JsonOutput, Vec<CompileResult>)> {
    let started = Instant::now();
    let package_root = std::env::current_dir()?;

    let raw = config::discover_config(&package_root, args.config.as_deref())?;
    let (targets, exports) = config::validate(raw)?;
    let selected = select_targets(targets, &args.targets)?;

    let mut parsed = Vec::with_capacity(selected.len());
    for t in &selected {
        parsed.push(target::parse_target(t, &package_root)?);
    }
    let plan = Plan { targets: parsed, exports, package_root: package_root.clone() };
    plan.validate()?;

    if args.dry_run {
        let suffixes: std::collections::HashMap<String, String> = plan
            .targets
            .iter()
            .filter_map(|t| t.target.polyfill_suffix.clone().map(|s| (t.name().to_string(), s)))
            .collect();
        let dedup_plan = dedup::plan(plan.targets.clone(), &suffixes);
        for group in &dedup_plan.groups {
            let members: Vec<&str> = group.members().map(|m| m.name()).collect();
            tracing::info!(primary = group.primary.name(), members = ?members, "dry-run group");
        }
        return Ok((
            true,
            JsonOutput { success: true, total_time_ms: started.elapsed().as_millis() as u64, targets: Vec::new(), size_report: None },
            Vec::new(),
        ));
    }

    if !args.no_clean {
        for t in &plan.targets {
            if t.out_dir.is_dir() {
                std::fs::remove_dir_all(&t.out_dir)?;
            }
        }
    }

    let options = BuildOptions {
        parallel: args.parallel,
        skip_type_check: false,
        skip_declarations: false,
        copy_concurrency: warp_build::fsutil::DEFAULT_COPY_CONCURRENCY,
        cancellation: CancellationToken::new(),
    };

    let results = if args.parallel {
        let n = worker_count(count_unique_compilations(&plan));
        let pool = WorkerPool::spawn(n)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| WarpError::with_cause(ErrorKind::Compile, "failed to start async runtime", e))?;
        let result = runtime.block_on(orchestrator::build_parallel(&plan, &pool, &options));
        runtime.block_on(pool.terminate());
        result?
    } else {
        let mut backend = default_backend();
        orchestrator::build_sequential(&plan, backend.as_mut(), &options)?
    };

    if results.iter().all(|r| r.success) {
        write_manifest_exports(&package_root, &plan, &selected, &results)?;
    }

    let success = results.iter().all(|r| r.success);
    let size_report = if args.stats { Some(size_report::report(&results)?) } else { None };

    let conditions: std::collections::HashMap<&str, &str> =
        plan.targets.iter().map(|t| (t.name(), t.target.condition.as_str())).collect();
    let output = JsonOutput {
        success,
        total_time_ms: started.elapsed().as_millis() as u64,
        targets: results.iter().map(|r| to_json_target(r, &conditions)).collect(),
        size_report,
    };
    Ok((success, output, results))
}

fn to_json_target(r: &CompileResult, conditions: &std::collections::HashMap<&str, &str>) -> JsonTarget {
    JsonTarget {
        name: r.target_name.clone(),
        condition: conditions.get(r.target_name.as_str()).map(|c| c.to_string()).unwrap_or_else(|| r.target_name.clone()),
        success: r.success,
        compile_time_ms: r.compile_time_ms,
        deduped: r.deduped,
        out_dir: r.out_dir.clone(),
    }
}

fn select_targets(all: Vec<Target>, names: &[String]) -> WarpResult<Vec<Target>> {
    if names.is_empty() {
        return Ok(all);
    }
    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        let t = all
            .iter()
            .find(|t| &t.name == name)
            .ok_or_else(|| WarpError::validation(format!("unknown --target \"{name}\"")))?;
        selected.push(t.clone());
    }
    Ok(selected)
}

fn count_unique_compilations(plan: &Plan) -> usize {
    let suffixes: std::collections::HashMap<String, String> = plan
        .targets
        .iter()
        .filter_map(|t| t.target.polyfill_suffix.clone().map(|s| (t.name().to_string(), s)))
        .collect();
    dedup::plan(plan.targets.clone(), &suffixes).groups.len()
}

fn write_manifest_exports(
    package_root: &Path,
    plan: &Plan,
    targets: &[Target],
    results: &[CompileResult],
) -> WarpResult<()> {
    if plan.exports.is_empty() {
        return Ok(());
    }
    let input =
        manifest::ExportsInput { package_root, exports: &plan.exports, targets, results };
    let built = manifest::build_exports(&input)?;

    let manifest_path = package_root.join("package.json");
    let existing: serde_json::Value = match std::fs::read_to_string(&manifest_path) {
        Ok(content) => serde_json::from_str(&content)?,
        Err(_) => serde_json::json!({}),
    };
    let merged = manifest::merge_into_manifest(&existing, &built);
    manifest::write_manifest(&manifest_path, &merged)
}

fn run_watch(args: &BuildArgs) -> ExitCode {
    use notify::Watcher;

    let package_root = match std::env::current_dir() {
        Ok(p) => p,
        Err(_) => return ExitCode::from(1),
    };

    let exit = run_build(args);
    if !matches!(exit, ExitCode::SUCCESS) && !args.quiet {
        eprintln!("initial build failed; watching for changes anyway");
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = match notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    }) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("failed to start filesystem watcher: {e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = watcher.watch(&package_root, notify::RecursiveMode::Recursive) {
        eprintln!("failed to watch {}: {e}", package_root.display());
        return ExitCode::from(1);
    }

    loop {
        match rx.recv() {
            Ok(Ok(_event)) => {
                run_build(args);
            }
            Ok(Err(e)) => {
                if !args.quiet {
                    eprintln!("watch error: {e}");
                }
            }
            Err(_) => return ExitCode::SUCCESS,
        }
    }
}

const DEFAULT_CONFIG: &str =
    "exports:\n  .: ./src/index.ts\ntargets:\n  - name: esm\n    tsconfig: tsconfig.json\n    moduleType: module\n";

const DEFAULT_TSCONFIG: &str =
    "{\"compilerOptions\":{\"outDir\":\"dist/esm\",\"rootDir\":\"src\"},\"include\":[\"src/**/*.ts\"]}\n";

fn run_init(explicit: Option<&Path>) -> ExitCode {
    let package_root = match std::env::current_dir() {
        Ok(p) => p,
        Err(_) => return ExitCode::SUCCESS,
    };
    let config_path = explicit.map(Path::to_path_buf).unwrap_or_else(|| package_root.join("warp.config.yml"));

    if config_path.exists() {
        println!("{} already exists; leaving it untouched", config_path.display());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = std::fs::write(&config_path, DEFAULT_CONFIG) {
        eprintln!("failed to write {}: {e}", config_path.display());
        return ExitCode::SUCCESS;
    }

    let tsconfig_path = package_root.join("tsconfig.json");
    if !tsconfig_path.exists() {
        let _ = std::fs::write(&tsconfig_path, DEFAULT_TSCONFIG);
    }

    println!("wrote {}", config_path.display());
    ExitCode::SUCCESS
}
