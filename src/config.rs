//! Declarative package configuration: `warp.config.{yml,yaml,json}` or a
//! `warp` key inside `package.json`. This is the external "config loading"
//! collaborator from `spec.md` §1 — the core never reads these files itself,
//! it only ever sees the validated [`Target`]s this module produces.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WarpError};

/// A single named build variant, as declared in the config file.
/// See `spec.md` §3 "Target".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub condition: String,
    pub tsconfig: PathBuf,
    pub polyfill_suffix: Option<String>,
    pub module_type: Option<ModuleType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Module,
    Commonjs,
}

impl ModuleType {
    pub fn shim_json(&self) -> &'static str {
        match self {
            Self::Module => r#"{"type":"module"}"#,
            Self::Commonjs => r#"{"type":"commonjs"}"#,
        }
    }
}

/// Raw, not-yet-validated shape of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub exports: indexmap::IndexMap<String, String>,
    #[serde(default)]
    pub targets: Vec<RawTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTarget {
    pub name: String,
    pub condition: Option<String>,
    pub tsconfig: PathBuf,
    #[serde(default)]
    pub polyfill_suffix: Option<PolyfillSuffixSpec>,
    pub module_type: Option<ModuleType>,
}

/// `polyfillSuffix` accepts a string, `true` (defaulting to `-<name>`), or
/// `false` (disabled) per `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolyfillSuffixSpec {
    Explicit(String),
    Enabled(bool),
}

/// Candidate config file names searched for in the package root, in order.
pub const CONFIG_FILE_NAMES: &[&str] =
    &["warp.config.yml", "warp.config.yaml", "warp.config.json"];

/// Finds and parses the package configuration.
///
/// Looks for one of [`CONFIG_FILE_NAMES`] in `root`, falling back to a
/// `warp` key inside `root/package.json`. Returns [`ErrorKind::ConfigNotFound`]
/// if neither is present, or [`ErrorKind::ConfigInvalid`] on parse/schema
/// failure.
///
/// [`ErrorKind::ConfigNotFound`]: crate::error::ErrorKind::ConfigNotFound
/// [`ErrorKind::ConfigInvalid`]: crate::error::ErrorKind::ConfigInvalid
pub fn discover_config(root: &Path, explicit: Option<&Path>) -> Result<RawConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    for name in CONFIG_FILE_NAMES {
        let path = root.join(name);
        if path.is_file() {
            return load_config_file(&path);
        }
    }

    let package_json = root.join("package.json");
    if package_json.is_file() {
        let content = std::fs::read_to_string(&package_json)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        if let Some(warp) = value.get("warp") {
            return serde_json::from_value(warp.clone())
                .map_err(|e| WarpError::with_cause(
                    crate::error::ErrorKind::ConfigInvalid,
                    "invalid `warp` key in package.json",
                    e,
                ));
        }
    }

    Err(WarpError::config_not_found(format!(
        "no warp.config.{{yml,yaml,json}} found and no `warp` key in {}",
        package_json.display()
    )))
}

fn load_config_file(path: &Path) -> Result<RawConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WarpError::with_cause(
            crate::error::ErrorKind::ConfigNotFound,
            format!("failed to read config file {}", path.display()),
            e,
        ))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Ok(serde_yaml::from_str(&content)?),
    }
}

/// Validates a [`RawConfig`] into a list of [`Target`]s, enforcing the
/// uniqueness invariants from `spec.md` §3 before any compilation begins.
pub fn validate(raw: RawConfig) -> Result<(Vec<Target>, indexmap::IndexMap<String, String>)> {
    let mut names = HashSet::new();
    let mut conditions = HashSet::new();
    let mut targets = Vec::with_capacity(raw.targets.len());

    for t in raw.targets {
        if !names.insert(t.name.clone()) {
            return Err(WarpError::validation(format!("duplicate target name \"{}\"", t.name)));
        }
        let condition = t.condition.clone().unwrap_or_else(|| t.name.clone());
        if !conditions.insert(condition.clone()) {
            return Err(WarpError::validation(format!(
                "duplicate target condition \"{condition}\""
            )));
        }

        let polyfill_suffix = match t.polyfill_suffix {
            None | Some(PolyfillSuffixSpec::Enabled(true)) => Some(format!("-{}", t.name)),
            Some(PolyfillSuffixSpec::Enabled(false)) => None,
            Some(PolyfillSuffixSpec::Explicit(s)) => Some(s),
        };

        targets.push(Target {
            name: t.name,
            condition,
            tsconfig: t.tsconfig,
            polyfill_suffix,
            module_type: t.module_type,
        });
    }

    for key in raw.exports.keys() {
        if key != "." && !key.starts_with("./") {
            return Err(WarpError::validation(format!(
                "invalid exports subpath key \"{key}\": must be \".\" or start with \"./\""
            )));
        }
        if key.ends_with('/') {
            return Err(WarpError::validation(format!(
                "invalid exports subpath key \"{key}\": trailing slash not allowed"
            )));
        }
    }

    Ok((targets, raw.exports))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyfill_suffix_defaults_to_dash_name() {
        let raw = RawConfig {
            exports: Default::default(),
            targets: vec![RawTarget {
                name: "browser".into(),
                condition: None,
                tsconfig: "tsconfig.browser.json".into(),
                polyfill_suffix: Some(PolyfillSuffixSpec::Enabled(true)),
                module_type: None,
            }],
        };
        let (targets, _) = validate(raw).unwrap();
        assert_eq!(targets[0].polyfill_suffix.as_deref(), Some("-browser"));
        assert_eq!(targets[0].condition, "browser");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let raw = RawConfig {
            exports: Default::default(),
            targets: vec![
                RawTarget {
                    name: "esm".into(),
                    condition: None,
                    tsconfig: "a.json".into(),
                    polyfill_suffix: None,
                    module_type: None,
                },
                RawTarget {
                    name: "esm".into(),
                    condition: Some("other".into()),
                    tsconfig: "b.json".into(),
                    polyfill_suffix: None,
                    module_type: None,
                },
            ],
        };
        let err = validate(raw).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn invalid_subpath_keys_are_rejected() {
        let mut exports = indexmap::IndexMap::new();
        exports.insert("bad".to_string(), "./src/index.ts".to_string());
        let raw = RawConfig { exports, targets: vec![] };
        assert!(validate(raw).is_err());
    }
}
