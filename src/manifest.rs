//! Package manifest `exports` rewriting (`spec.md` §4.11, external
//! collaborator — still implemented).

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::config::Target;
use crate::error::{ErrorKind, Result, WarpError};
use crate::orchestrator::CompileResult;

/// One configured export subpath's source (either a compilable source file
/// or an opaque passthrough path).
pub struct ExportsInput<'a> {
    pub package_root: &'a Path,
    pub exports: &'a IndexMap<String, String>,
    pub targets: &'a [Target],
    pub results: &'a [CompileResult],
}

/// Computes the rewritten `exports` object for `package.json`. Conditions
/// are emitted in target declaration order; a passthrough entry (a source
/// path not ending in a recognized source extension) is copied verbatim;
/// pre-existing unmanaged entries are preserved by merging over the
/// existing manifest (`spec.md` §4.11).
pub fn build_exports(input: &ExportsInput<'_>) -> Result<IndexMap<String, Value>> {
    let mut built = IndexMap::new();

    for (subpath, source) in input.exports {
        if crate::ext::split_source_stem(file_name(source)).is_none() {
            built.insert(subpath.clone(), Value::String(source.clone()));
            continue;
        }

        let mut by_condition = serde_json::Map::new();
        for target in input.targets {
            let result = input
                .results
                .iter()
                .find(|r| r.target_name == target.name)
                .ok_or_else(|| {
                    WarpError::new(
                        ErrorKind::DistMissing,
                        format!("no compile result for target \"{}\"", target.name),
                    )
                })?;

            let relative = relative_artifact_path(input.package_root, &result.root_dir, source);
            let js = result.out_dir.join(remap(&relative, crate::ext::output_ext_for));
            let dts = result.out_dir.join(remap(&relative, crate::ext::declaration_ext_for));

            if !js.is_file() {
                return Err(WarpError::new(
                    ErrorKind::DistMissing,
                    format!("expected artifact {} does not exist", js.display()),
                ));
            }

            by_condition.insert(
                target.condition.clone(),
                json!({ "types": dts.display().to_string(), "default": js.display().to_string() }),
            );
        }
        built.insert(subpath.clone(), Value::Object(by_condition));
    }

    Ok(built)
}

fn file_name(path: &str) -> &str {
    Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path)
}

/// Mirrors `engine::relative_to`: the export source is a package-root
/// relative path, but artifacts land under `out_dir` at paths relative to
/// the target's `root_dir`, not the package root (`spec.md` §4.11).
fn relative_artifact_path(package_root: &Path, root_dir: &Path, source: &str) -> std::path::PathBuf {
    let stripped = source.strip_prefix("./").unwrap_or(source);
    let absolute = package_root.join(stripped);
    absolute.strip_prefix(root_dir).map(Path::to_path_buf).unwrap_or_else(|_| std::path::PathBuf::from(stripped))
}

fn remap(path: &Path, map: fn(&str) -> &'static str) -> std::path::PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    match crate::ext::split_source_stem(name) {
        Some((stem, ext)) => path.with_file_name(format!("{stem}.{}", map(ext))),
        None => path.to_path_buf(),
    }
}

/// Merges `built` over `existing`'s `exports` map (managed entries
/// overwritten, unmanaged entries preserved) and returns the full
/// `package.json` value ready to write.
pub fn merge_into_manifest(existing: &Value, built: &IndexMap<String, Value>) -> Value {
    let mut manifest = existing.clone();
    let mut merged: BTreeMap<String, Value> = existing
        .get("exports")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    for (k, v) in built {
        merged.insert(k.clone(), v.clone());
    }

    let exports_value = Value::Object(merged.into_iter().collect());
    manifest["exports"] = exports_value;
    manifest
}

/// Writes `manifest` to `path` atomically, unless the computed content
/// already equals the file's existing content (`spec.md` §8 "Round-trip and
/// idempotence").
pub fn write_manifest(path: &Path, manifest: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(manifest)? + "\n";
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == rendered {
            return Ok(());
        }
    }
    crate::fsutil::write_atomic(path, rendered.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_entries_are_copied_verbatim() {
        let mut exports = IndexMap::new();
        exports.insert("./package.json".to_string(), "./package.json".to_string());
        let input =
            ExportsInput { package_root: Path::new("/pkg"), exports: &exports, targets: &[], results: &[] };
        let built = build_exports(&input).unwrap();
        assert_eq!(built["./package.json"], Value::String("./package.json".into()));
    }

    #[test]
    fn merge_preserves_unmanaged_entries_and_overwrites_managed_ones() {
        let existing = json!({
            "name": "pkg",
            "exports": {
                ".": { "default": "./old.js" },
                "./unmanaged": "./unmanaged.js"
            }
        });
        let mut built = IndexMap::new();
        built.insert(".".to_string(), json!({ "default": "./dist/esm/index.js" }));

        let merged = merge_into_manifest(&existing, &built);
        assert_eq!(merged["exports"]["."], json!({ "default": "./dist/esm/index.js" }));
        assert_eq!(merged["exports"]["./unmanaged"], Value::String("./unmanaged.js".into()));
        assert_eq!(merged["name"], "pkg");
    }

    #[test]
    fn write_manifest_is_a_noop_when_content_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.json");
        let manifest = json!({ "name": "pkg" });
        write_manifest(&path, &manifest).unwrap();
        let mtime_before = std::fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        write_manifest(&path, &manifest).unwrap();
        let mtime_after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(mtime_before, mtime_after);
    }
}
