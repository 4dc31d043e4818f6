//! [`ParsedTarget`] and [`Plan`]: the validated, typed input the core
//! consumes, per `spec.md` §3. Producing a [`ParsedTarget`] from a per-target
//! compiler config file is the `ConfigParser` external collaborator's job;
//! [`parse_target`] is a minimal, self-contained stand-in for it so this
//! repository is runnable end to end without vendoring a real compiler's
//! config resolver.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Target;
use crate::error::{Result, WarpError};

/// Canonicalized, serde-friendly compiler options blob. Kept as a sorted map
/// so [`crate::signature`] can hash it deterministically without knowing its
/// schema.
pub type CompilerOptions = BTreeMap<String, Value>;

/// A [`Target`] plus everything resolved from its compiler config file.
/// See `spec.md` §3.
#[derive(Debug, Clone)]
pub struct ParsedTarget {
    pub target: Target,
    pub options: CompilerOptions,
    pub out_dir: PathBuf,
    pub root_dir: PathBuf,
    pub root_files: Vec<PathBuf>,
}

impl ParsedTarget {
    pub fn name(&self) -> &str {
        &self.target.name
    }
}

/// On-disk shape of a per-target compiler config file (a minimal tsconfig
/// analogue): `{"compilerOptions": {...}, "include": [...]}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawTsconfig {
    #[serde(default)]
    extends: Option<String>,
    #[serde(default, rename = "compilerOptions")]
    compiler_options: BTreeMap<String, Value>,
    #[serde(default)]
    include: Vec<String>,
}

/// Resolves a [`Target`]'s `tsconfig` file into a [`ParsedTarget`].
///
/// `outDir` and `rootDir` are required compiler options (`spec.md` §7
/// `TSCONFIG_ERROR`); `include` globs are resolved relative to `package_root`.
/// `extends` is followed one level to a base config, matching the common
/// "missing base config" failure mode named in §7.
pub fn parse_target(target: &Target, package_root: &Path) -> Result<ParsedTarget> {
    let config_path = package_root.join(&target.tsconfig);
    let raw = read_tsconfig(&config_path)?;

    let mut options = raw.compiler_options;

    let out_dir_rel = options
        .get("outDir")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            WarpError::tsconfig(format!(
                "{}: compiler config is missing `outDir`",
                config_path.display()
            ))
        })?
        .to_string();
    let root_dir_rel = options.get("rootDir").and_then(Value::as_str).unwrap_or(".").to_string();

    let out_dir = dunce::simplified(&package_root.join(&out_dir_rel)).to_path_buf();
    let root_dir = dunce::simplified(&package_root.join(&root_dir_rel)).to_path_buf();

    // configFilePath/outDir are per-target bookkeeping, not semantic; strip
    // them before signatures are ever computed downstream (spec.md §4.2).
    options.remove("outDir");
    options.insert("configFilePath".into(), Value::String(config_path.display().to_string()));

    let root_files = resolve_include(package_root, &root_dir, &raw.include)?;
    if root_files.is_empty() {
        return Err(WarpError::validation(format!(
            "target \"{}\" resolves to zero root files",
            target.name
        )));
    }

    Ok(ParsedTarget { target: target.clone(), options, out_dir, root_dir, root_files })
}

fn read_tsconfig(path: &Path) -> Result<RawTsconfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WarpError::with_cause(
            crate::error::ErrorKind::TsconfigError,
            format!("cannot read compiler config {}", path.display()),
            e,
        )
    })?;
    let mut raw: RawTsconfig = serde_json::from_str(&content).map_err(|e| {
        WarpError::with_cause(
            crate::error::ErrorKind::TsconfigError,
            format!("cannot parse compiler config {}", path.display()),
            e,
        )
    })?;

    if let Some(base_rel) = raw.extends.take() {
        let base_path = path
            .parent()
            .map(|p| p.join(&base_rel))
            .ok_or_else(|| WarpError::tsconfig(format!("{}: invalid path", path.display())))?;
        let base = read_tsconfig(&base_path).map_err(|e| {
            WarpError::tsconfig(format!(
                "{}: extends missing base config {}: {}",
                path.display(),
                base_path.display(),
                e
            ))
        })?;
        let mut merged = base.compiler_options;
        merged.extend(raw.compiler_options);
        raw.compiler_options = merged;
        if raw.include.is_empty() {
            raw.include = base.include;
        }
    }

    Ok(raw)
}

fn resolve_include(package_root: &Path, root_dir: &Path, include: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in include {
        let full_pattern = package_root.join(pattern);
        let pattern_str = full_pattern.to_string_lossy().into_owned();
        for entry in glob::glob(&pattern_str)
            .map_err(|e| WarpError::tsconfig(format!("invalid include glob {pattern}: {e}")))?
        {
            let path = entry.map_err(|e| WarpError::tsconfig(e.to_string()))?;
            if path.is_file() {
                files.push(dunce::simplified(&path).to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    let _ = root_dir;
    Ok(files)
}

/// The validated build plan: an ordered list of [`ParsedTarget`]s plus the
/// exports map they were derived from. Declaration order is preserved
/// throughout the pipeline (`spec.md` §5 "Ordering guarantees").
#[derive(Debug, Clone)]
pub struct Plan {
    pub targets: Vec<ParsedTarget>,
    pub exports: indexmap::IndexMap<String, String>,
    pub package_root: PathBuf,
}

impl Plan {
    /// Validates the out-dir-uniqueness invariant from `spec.md` §3.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for t in &self.targets {
            if !seen.insert(&t.out_dir) {
                return Err(WarpError::validation(format!(
                    "target \"{}\" has an out_dir that collides with another target: {}",
                    t.name(),
                    t.out_dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleType;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_out_dir_is_tsconfig_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tsconfig.json", r#"{"compilerOptions":{}}"#);
        write(dir.path(), "src/index.ts", "export const x = 1;");

        let target = Target {
            name: "esm".into(),
            condition: "esm".into(),
            tsconfig: "tsconfig.json".into(),
            polyfill_suffix: None,
            module_type: Some(ModuleType::Module),
        };
        let err = parse_target(&target, dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TsconfigError);
    }

    #[test]
    fn resolves_root_files_and_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "tsconfig.json",
            r#"{"compilerOptions":{"outDir":"dist/esm","rootDir":"src"},"include":["src/**/*.ts"]}"#,
        );
        write(dir.path(), "src/index.ts", "export const x = 1;");

        let target = Target {
            name: "esm".into(),
            condition: "esm".into(),
            tsconfig: "tsconfig.json".into(),
            polyfill_suffix: None,
            module_type: Some(ModuleType::Module),
        };
        let parsed = parse_target(&target, dir.path()).unwrap();
        assert_eq!(parsed.root_files.len(), 1);
        assert!(parsed.out_dir.ends_with("dist/esm"));
        assert!(!parsed.options.contains_key("outDir"));
    }

    #[test]
    fn zero_root_files_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "tsconfig.json",
            r#"{"compilerOptions":{"outDir":"dist"},"include":["src/**/*.ts"]}"#,
        );
        let target = Target {
            name: "esm".into(),
            condition: "esm".into(),
            tsconfig: "tsconfig.json".into(),
            polyfill_suffix: None,
            module_type: None,
        };
        let err = parse_target(&target, dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn plan_rejects_out_dir_collisions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/index.ts", "export const x = 1;");
        let t1 = ParsedTarget {
            target: Target {
                name: "a".into(),
                condition: "a".into(),
                tsconfig: "a.json".into(),
                polyfill_suffix: None,
                module_type: None,
            },
            options: BTreeMap::new(),
            out_dir: dir.path().join("dist"),
            root_dir: dir.path().join("src"),
            root_files: vec![dir.path().join("src/index.ts")],
        };
        let mut t2 = t1.clone();
        t2.target.name = "b".into();
        t2.target.condition = "b".into();

        let plan = Plan { targets: vec![t1, t2], exports: Default::default(), package_root: dir.path().into() };
        assert!(plan.validate().is_err());
    }
}
