//! Drives a [`crate::backend::CompileBackend`] over one target's root files,
//! choosing between the full-program path and the fast transpile path
//! (`spec.md` §4.6).

use std::path::{Path, PathBuf};

use crate::backend::{BackendRequest, CompileBackend, Diagnostic, DiagnosticKind};
use crate::config::ModuleType;
use crate::error::Result;
use crate::ext::{declaration_ext_for, output_ext_for, split_source_stem};
use crate::host::CompileHost;
use crate::polyfill;
use crate::source_cache::LanguageVersion;
use crate::worker::message::WireTarget;

/// Outcome of compiling one target: diagnostics plus the list of files
/// actually written, relative to `out_dir` (`spec.md` §4.6).
#[derive(Debug)]
pub struct EngineOutcome {
    pub diagnostics: Vec<Diagnostic>,
    pub written: Vec<PathBuf>,
}

impl EngineOutcome {
    /// `spec.md` §4.6: "success = no diagnostics of kind error" — warnings,
    /// suggestions and messages don't flip this to `false`.
    pub fn success(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Error)
    }
}

/// Runs `backend` over `target`'s root files.
///
/// `type_check` selects the full-program path; when `false` *and*
/// `skip_declarations` is also `true`, the fast transpile path is taken
/// (`spec.md` §4.6 — the fast path additionally requires declarations be
/// skippable, since it never runs semantic analysis).
#[tracing::instrument(skip(host, backend), fields(target = %target.name))]
pub fn compile(
    host: &mut CompileHost<'_>,
    target: &WireTarget,
    type_check: bool,
    skip_declarations: bool,
    backend: &mut dyn CompileBackend,
) -> Result<EngineOutcome> {
    let root_files = polyfill::filter_replacement_files(&target.root_files, host.overlay());

    let module_type = resolve_module_type(target);
    let emit_declarations = !skip_declarations;

    let mut sources = Vec::with_capacity(root_files.len());
    for path in &root_files {
        sources.push(host.get_source(path, LanguageVersion::Latest)?);
    }

    let request = BackendRequest {
        sources,
        module_type,
        emit_declarations: emit_declarations || type_check,
        options: &target.options,
    };

    let output = backend.compile(request)?;
    if output.has_errors() {
        return Ok(EngineOutcome { diagnostics: output.diagnostics, written: Vec::new() });
    }

    let mut written = Vec::with_capacity(output.emits.len() * 2);
    for emit in &output.emits {
        let relative = relative_to(&target.root_dir, &emit.relative_path);
        let js_path = remap_extension(&relative, output_ext_for);
        let dest_js = target.out_dir.join(&js_path);
        write_file(&dest_js, &emit.js)?;
        written.push(js_path);

        if let Some(declaration) = &emit.declaration {
            let dts_path = remap_extension(&relative, declaration_ext_for);
            let dest_dts = target.out_dir.join(&dts_path);
            write_file(&dest_dts, declaration)?;
            written.push(dts_path);
        }
    }

    let shim_json = module_type.map(ModuleType::shim_json).unwrap_or(r#"{"type":"commonjs"}"#);
    write_file(&target.out_dir.join("package.json"), shim_json)?;

    Ok(EngineOutcome { diagnostics: output.diagnostics, written })
}

/// When the compiler's configured module kind is the platform-aware variant
/// (absent `module_type`), pin it based on explicit configuration or an
/// inference from compiler options (`spec.md` §4.6 "Module-format
/// disambiguation").
fn resolve_module_type(target: &WireTarget) -> Option<ModuleType> {
    if target.module_type.is_some() {
        return target.module_type;
    }
    match target.options.get("module").and_then(|v| v.as_str()) {
        Some(s) if s.eq_ignore_ascii_case("commonjs") => Some(ModuleType::Commonjs),
        Some(s) if s.eq_ignore_ascii_case("esnext") || s.eq_ignore_ascii_case("es2022") => {
            Some(ModuleType::Module)
        }
        _ => None,
    }
}

fn relative_to(root_dir: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root_dir).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

fn remap_extension(path: &Path, map: fn(&str) -> &'static str) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    let Some((stem, ext)) = split_source_stem(name) else { return path.to_path_buf() };
    path.with_file_name(format!("{stem}.{}", map(ext)))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
