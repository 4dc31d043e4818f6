#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod error;

pub mod config;
pub use config::{discover_config, validate, ModuleType, RawConfig, Target};

pub mod ext;

pub mod target;
pub use target::{parse_target, ParsedTarget, Plan};

pub mod polyfill;

pub mod signature;
pub use signature::Signature;

pub mod dedup;

pub mod source_cache;
pub use source_cache::{LanguageVersion, SourceFileCache, SourceUnit};

pub mod host;
pub use host::CompileHost;

pub mod backend;
pub use backend::{default_backend, CompileBackend, Diagnostic, DiagnosticKind};

pub mod engine;

pub mod task_graph;

pub mod cancellation;
pub use cancellation::CancellationToken;

pub mod worker;
pub use worker::pool::{worker_count, WorkerPool, WORKER_LOOP_FLAG};

pub mod fsutil;

pub mod manifest;

pub mod diagnostics;

pub mod logbuffer;
pub use logbuffer::{BufferLayer, DiagnosticBuffer};

pub mod orchestrator;
pub use orchestrator::{build_parallel, build_sequential, BuildOptions, CompileResult};

pub mod size_report;

/// Utilities for creating, mocking and testing of (temporary) package
/// workspaces.
#[cfg(feature = "project-util")]
pub mod test_util;
