//! Wire format for the worker IPC protocol (`spec.md` §6 "Worker IPC").
//!
//! Line-delimited JSON over the child process's stdin/stdout. Exactly three
//! message shapes exist; anything else (a malformed line, an unexpected
//! `type`) is dropped by the reader rather than treated as fatal — it is
//! simply uncorrelated with any pending request (`spec.md` §4.7, §6).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModuleType;

/// Minimal, serializable projection of a [`crate::target::ParsedTarget`] —
/// only the fields a worker needs to run [`crate::backend::CompileBackend`]
/// are sent, to avoid re-deriving `Serialize` for the whole config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTarget {
    pub name: String,
    pub out_dir: PathBuf,
    pub root_dir: PathBuf,
    pub root_files: Vec<PathBuf>,
    pub options: BTreeMap<String, Value>,
    pub module_type: Option<ModuleType>,
    pub polyfill_suffix: Option<String>,
}

/// main → worker: dispatches a single compile job, including the
/// pre-computed overlay so the worker never has to rescan directories
/// (`spec.md` §4.7 "Dispatch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRequest {
    pub package_root: PathBuf,
    pub target: WireTarget,
    pub type_check: bool,
    pub skip_declarations: bool,
    pub overlay: Vec<(PathBuf, PathBuf)>,
}

/// worker → main: the outcome of a [`CompileRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResponse {
    pub target_name: String,
    pub success: bool,
    pub diagnostics_text: String,
    pub error_count: usize,
    pub time_ms: u64,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ready,
    Compile(CompileRequest),
    Result(CompileResponse),
}

impl WorkerMessage {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}
