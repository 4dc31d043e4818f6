//! Drives a validated [`crate::target::Plan`] through dedup, and either the
//! sequential or parallel execution mode, to a list of [`CompileResult`]s in
//! plan declaration order (`spec.md` §4.9).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use crate::backend::{CompileBackend, Diagnostic, DiagnosticKind};
use crate::cancellation::CancellationToken;
use crate::dedup;
use crate::error::{Result, WarpError};
use crate::fsutil;
use crate::host::CompileHost;
use crate::polyfill::Overlay;
use crate::source_cache::SourceFileCache;
use crate::target::{ParsedTarget, Plan};
use crate::task_graph::{self, Task};
use crate::worker::message::{CompileRequest, WireTarget};
use crate::worker::pool::WorkerPool;

/// One target's outcome, as defined by `spec.md` §3 "CompileResult".
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub target_name: String,
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub diagnostic_text: String,
    pub out_dir: PathBuf,
    pub root_dir: PathBuf,
    pub compile_time_ms: u64,
    pub deduped: bool,
}

pub struct BuildOptions {
    pub parallel: bool,
    pub skip_type_check: bool,
    pub skip_declarations: bool,
    pub copy_concurrency: usize,
    pub cancellation: CancellationToken,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            skip_type_check: false,
            skip_declarations: false,
            copy_concurrency: fsutil::DEFAULT_COPY_CONCURRENCY,
            cancellation: CancellationToken::new(),
        }
    }
}

fn to_wire_target(t: &ParsedTarget, overlay: &Overlay) -> WireTarget {
    WireTarget {
        name: t.name().to_string(),
        out_dir: t.out_dir.clone(),
        root_dir: t.root_dir.clone(),
        root_files: t.root_files.clone(),
        options: t.options.clone(),
        module_type: t.target.module_type,
        polyfill_suffix: if overlay.is_empty() { None } else { t.target.polyfill_suffix.clone() },
    }
}

fn overlay_entries(overlay: &Overlay) -> Vec<(PathBuf, PathBuf)> {
    overlay.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Runs `plan` sequentially in a single process: no worker pool, one
/// in-process `SourceFileCache`/backend pair reused across every primary
/// (`spec.md` §4.9 "Sequential mode").
pub fn build_sequential(
    plan: &Plan,
    backend: &mut dyn CompileBackend,
    options: &BuildOptions,
) -> Result<Vec<CompileResult>> {
    if plan.targets.is_empty() {
        return Ok(Vec::new());
    }

    let dedup_plan = dedup::plan(plan.targets.clone(), &suffix_map(plan));
    let mut by_name: HashMap<String, CompileResult> = HashMap::new();
    let mut declaration_out_dirs: HashMap<String, PathBuf> = HashMap::new();
    let mut cache = SourceFileCache::new(512);

    for group in &dedup_plan.groups {
        if options.cancellation.is_cancelled() {
            break;
        }

        let overlay = dedup_plan.overlays.get(group.primary.name()).cloned().unwrap_or_default();
        let type_check = !options.skip_type_check && dedup_plan.needs_type_check(group.primary.name());
        let skip_declarations = options.skip_declarations || !dedup_plan.needs_type_check(group.primary.name());

        let wire = to_wire_target(&group.primary, &overlay);
        let started = Instant::now();
        let mut host = CompileHost::new(&mut cache, overlay);
        let outcome = crate::engine::compile(&mut host, &wire, type_check, skip_declarations, backend)?;
        let elapsed = started.elapsed().as_millis() as u64;

        if !skip_declarations {
            declaration_out_dirs.insert(group.primary.name().to_string(), group.primary.out_dir.clone());
        } else if let Some(declaration_source) = dedup_plan.declaration_source(group.primary.name()) {
            if let Some(source_out_dir) = declaration_out_dirs.get(declaration_source).cloned() {
                copy_declaration_files(&source_out_dir, &group.primary.out_dir)?;
            }
        }

        record_result(&mut by_name, &group.primary, &outcome.diagnostics, elapsed, false);

        // A failed primary never produced an `out_dir` to copy from
        // (`engine::compile` returns before emitting on a type error); mark
        // copies failed too instead of copying a nonexistent tree
        // (`spec.md` §4.9, §7 "partial recovery").
        for copy in &group.copies {
            if outcome.success() {
                fsutil::copy_tree(&group.primary.out_dir, &copy.out_dir, options.copy_concurrency)?;
            }
            record_result(&mut by_name, copy, &outcome.diagnostics, elapsed, true);
        }
    }

    Ok(order_results(plan, by_name))
}

/// Runs `plan` via [`crate::task_graph`] against `pool`. When a primary's
/// source-identity twin already emitted declarations, the secondary's
/// fast-path compile does not wait on it: the `.d.ts` copy happens once the
/// whole graph completes and only if every compile succeeded (`spec.md`
/// §4.9 "Parallel mode").
pub async fn build_parallel(
    plan: &Plan,
    pool: &WorkerPool,
    options: &BuildOptions,
) -> Result<Vec<CompileResult>> {
    if plan.targets.is_empty() {
        return Ok(Vec::new());
    }

    pool.wait_ready().await?;

    let dedup_plan = dedup::plan(plan.targets.clone(), &suffix_map(plan));
    let mut tasks = Vec::new();
    let mut deferred_declaration_copies = Vec::new();

    for group in &dedup_plan.groups {
        let overlay = dedup_plan.overlays.get(group.primary.name()).cloned().unwrap_or_default();
        let type_check = !options.skip_type_check && dedup_plan.needs_type_check(group.primary.name());
        let skip_declarations = options.skip_declarations || !dedup_plan.needs_type_check(group.primary.name());

        if skip_declarations {
            if let Some(declaration_source) = dedup_plan.declaration_source(group.primary.name()) {
                deferred_declaration_copies.push((group.primary.name().to_string(), declaration_source.to_string()));
            }
        }

        let request = CompileRequest {
            package_root: plan.package_root.clone(),
            target: to_wire_target(&group.primary, &overlay),
            type_check,
            skip_declarations,
            overlay: overlay_entries(&overlay),
        };
        let pool = pool.clone();
        tasks.push(Task::new(group.primary.name().to_string(), Vec::new(), move || async move {
            pool.compile(request).await
        }));
    }

    let outcomes = task_graph::run(tasks).await?;

    if options.cancellation.is_cancelled() {
        return Err(WarpError::compile("build cancelled"));
    }

    // Deferred `.d.ts` copies only run "if every compile succeeded"
    // (`spec.md` §4.9, §8) — a type error anywhere means a secondary may be
    // copying declarations that were never actually validated as current.
    let all_succeeded = outcomes.values().all(|r| r.success);
    if all_succeeded {
        for (secondary, primary) in &deferred_declaration_copies {
            let secondary_target = plan.targets.iter().find(|t| t.name() == secondary);
            let primary_target = plan.targets.iter().find(|t| t.name() == primary);
            if let (Some(secondary_target), Some(primary_target)) = (secondary_target, primary_target) {
                copy_declaration_files(&primary_target.out_dir, &secondary_target.out_dir)
                    .map_err(|e| WarpError::compile(format!("deferred declaration copy for {secondary}: {e}")))?;
            }
        }
    }

    let mut by_name: HashMap<String, CompileResult> = HashMap::new();
    for group in &dedup_plan.groups {
        let response = outcomes
            .get(group.primary.name())
            .ok_or_else(|| WarpError::compile(format!("missing result for {}", group.primary.name())))?;

        by_name.insert(
            group.primary.name().to_string(),
            CompileResult {
                target_name: group.primary.name().to_string(),
                success: response.success,
                diagnostics: Vec::new(),
                diagnostic_text: response.diagnostics_text.clone(),
                out_dir: response.out_dir.clone(),
                root_dir: group.primary.root_dir.clone(),
                compile_time_ms: response.time_ms,
                deduped: false,
            },
        );

        for copy in &group.copies {
            if response.success {
                fsutil::copy_tree(&group.primary.out_dir, &copy.out_dir, options.copy_concurrency)?;
            }
            by_name.insert(
                copy.name().to_string(),
                CompileResult {
                    target_name: copy.name().to_string(),
                    success: response.success,
                    diagnostics: Vec::new(),
                    diagnostic_text: response.diagnostics_text.clone(),
                    out_dir: copy.out_dir.clone(),
                    root_dir: copy.root_dir.clone(),
                    compile_time_ms: response.time_ms,
                    deduped: true,
                },
            );
        }
    }

    Ok(order_results(plan, by_name))
}

fn suffix_map(plan: &Plan) -> HashMap<String, String> {
    plan.targets
        .iter()
        .filter_map(|t| t.target.polyfill_suffix.clone().map(|s| (t.name().to_string(), s)))
        .collect()
}

/// Copies every `.d.ts`/`.d.mts` file from `source_out_dir` into the same
/// relative path under `dest_out_dir`, mirroring a skipped declaration emit
/// (`spec.md` §4.9 "deferred `.d.ts` copy").
fn copy_declaration_files(source_out_dir: &std::path::Path, dest_out_dir: &std::path::Path) -> Result<()> {
    if !source_out_dir.is_dir() {
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(source_out_dir) {
        let entry = entry.map_err(|e| {
            WarpError::with_cause(crate::error::ErrorKind::DistMissing, "declaration copy walk failed", std::io::Error::from(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !(name.ends_with(".d.ts") || name.ends_with(".d.mts")) {
            continue;
        }
        let relative = entry.path().strip_prefix(source_out_dir).unwrap();
        let dest = dest_out_dir.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &dest)?;
    }
    Ok(())
}

fn record_result(
    by_name: &mut HashMap<String, CompileResult>,
    target: &ParsedTarget,
    diagnostics: &[Diagnostic],
    elapsed_ms: u64,
    deduped: bool,
) {
    by_name.insert(
        target.name().to_string(),
        CompileResult {
            target_name: target.name().to_string(),
            success: !diagnostics.iter().any(|d| d.kind == DiagnosticKind::Error),
            diagnostics: diagnostics.to_vec(),
            diagnostic_text: crate::diagnostics::format_for_target(target.name(), diagnostics),
            out_dir: target.out_dir.clone(),
            root_dir: target.root_dir.clone(),
            compile_time_ms: elapsed_ms,
            deduped,
        },
    );
}

fn order_results(plan: &Plan, mut by_name: HashMap<String, CompileResult>) -> Vec<CompileResult> {
    plan.targets
        .iter()
        .filter_map(|t| by_name.remove(t.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EchoBackend;
    use crate::config::{ModuleType, Target};
    use std::collections::BTreeMap;
    use std::fs;

    fn parsed(dir: &std::path::Path, name: &str, out_dir: &str) -> ParsedTarget {
        let src = dir.join("src");
        fs::create_dir_all(&src).unwrap();
        let file = src.join("index.ts");
        fs::write(&file, "export const x = 1;").unwrap();

        ParsedTarget {
            target: Target {
                name: name.into(),
                condition: name.into(),
                tsconfig: "tsconfig.json".into(),
                polyfill_suffix: None,
                module_type: Some(ModuleType::Module),
            },
            options: BTreeMap::new(),
            out_dir: dir.join(out_dir),
            root_dir: src,
            root_files: vec![file],
        }
    }

    #[test]
    fn empty_plan_returns_empty_results_without_compiling() {
        let dir = tempfile::tempdir().unwrap();
        let plan = Plan { targets: vec![], exports: Default::default(), package_root: dir.path().into() };
        let mut backend = EchoBackend::new();
        let results = build_sequential(&plan, &mut backend, &BuildOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn single_target_compiles_and_emits_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let target = parsed(dir.path(), "esm", "dist/esm");
        let plan = Plan {
            targets: vec![target],
            exports: Default::default(),
            package_root: dir.path().into(),
        };
        let mut backend = EchoBackend::new();
        let results = build_sequential(&plan, &mut backend, &BuildOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert!(!results[0].deduped);
        assert!(dir.path().join("dist/esm/index.d.ts").is_file());
    }

    #[test]
    fn results_preserve_plan_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut t1 = parsed(dir.path(), "browser", "dist/browser");
        t1.options.insert("module".into(), serde_json::json!("esnext"));
        let mut t2 = parsed(dir.path(), "esm", "dist/esm");
        t2.options.insert("module".into(), serde_json::json!("esnext"));

        let plan = Plan {
            targets: vec![t1, t2],
            exports: Default::default(),
            package_root: dir.path().into(),
        };
        let mut backend = EchoBackend::new();
        let results = build_sequential(&plan, &mut backend, &BuildOptions::default()).unwrap();
        assert_eq!(results.iter().map(|r| r.target_name.as_str()).collect::<Vec<_>>(), vec!["browser", "esm"]);
        assert!(!results[0].deduped);
        assert!(results[1].deduped);
    }
}
