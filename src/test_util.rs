//! Utilities for mocking package workspaces in tests, a direct analogue of
//! the teacher's `project_util` module (`SPEC_FULL.md` §I).
//!
//! Gated behind the `project-util` feature so the `tempfile`/`fs_extra`
//! dependencies stay optional for library consumers.

use std::fmt;
use std::path::{Path, PathBuf};

use fs_extra::{dir, file};
use tempfile::TempDir;

use crate::config::{ModuleType, Target};
use crate::error::{Result, WarpError};
use crate::target::{parse_target, ParsedTarget, Plan};

/// A package workspace that lives in a new temporary directory. Dropping it
/// removes the directory, same as [`TempDir::drop`].
pub struct TempPackage {
    root: TempDir,
}

impl TempPackage {
    /// Creates an empty temporary package root.
    pub fn new() -> Result<Self> {
        Self::prefixed("warp-build-test")
    }

    pub fn prefixed(prefix: &str) -> Result<Self> {
        let root = tempfile::Builder::new().prefix(prefix).tempdir().map_err(|e| {
            WarpError::with_cause(crate::error::ErrorKind::Validation, "failed to create temp dir", e)
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Writes `content` to `relative` under the package root, creating parent
    /// directories as needed.
    pub fn write_source(&self, relative: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Writes a minimal compiler config (`outDir`/`rootDir`/`include`) at
    /// `relative`.
    pub fn write_tsconfig(
        &self,
        relative: impl AsRef<Path>,
        out_dir: &str,
        root_dir: &str,
        include: &[&str],
    ) -> Result<PathBuf> {
        let include_json: Vec<String> = include.iter().map(|s| format!("\"{s}\"")).collect();
        let content = format!(
            "{{\"compilerOptions\":{{\"outDir\":\"{out_dir}\",\"rootDir\":\"{root_dir}\"}},\"include\":[{}]}}",
            include_json.join(",")
        );
        self.write_source(relative, &content)
    }

    /// Copies an existing file into the package root under `relative`,
    /// matching the teacher's `copy_source` semantics.
    pub fn copy_into(&self, source: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<()> {
        let dest = self.root().join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        file::copy(source, dest, &file::CopyOptions::new().overwrite(true)).map_err(|e| {
            WarpError::with_cause(crate::error::ErrorKind::Validation, "failed to copy file into temp package", e)
        })?;
        Ok(())
    }

    /// Copies an entire directory tree into the package root under
    /// `relative`.
    pub fn copy_dir_into(&self, source: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<()> {
        let dest = self.root().join(relative);
        std::fs::create_dir_all(&dest)?;
        dir::copy(source, &dest, &dir::CopyOptions::new().content_only(true)).map_err(|e| {
            WarpError::with_cause(crate::error::ErrorKind::Validation, "failed to copy dir into temp package", e)
        })?;
        Ok(())
    }

    /// Builds a one-target [`Target`] pointing at `tsconfig_relative`.
    pub fn target(&self, name: &str, tsconfig_relative: &str, module_type: Option<ModuleType>) -> Target {
        Target {
            name: name.to_string(),
            condition: name.to_string(),
            tsconfig: PathBuf::from(tsconfig_relative),
            polyfill_suffix: None,
            module_type,
        }
    }

    /// Parses `targets` against this package root into a validated [`Plan`].
    pub fn plan(&self, targets: Vec<Target>) -> Result<Plan> {
        let mut parsed: Vec<ParsedTarget> = Vec::with_capacity(targets.len());
        for t in &targets {
            parsed.push(parse_target(t, self.root())?);
        }
        let plan = Plan { targets: parsed, exports: Default::default(), package_root: self.root().to_path_buf() };
        plan.validate()?;
        Ok(plan)
    }
}

impl fmt::Debug for TempPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempPackage").field("root", &self.root()).finish()
    }
}
