//! Process-isolated compile workers (`spec.md` §4.7, §5).
//!
//! Each worker is a separate OS process — never a thread — because the
//! underlying compiler is assumed non-reentrant and carries mutable global
//! state. `mod message` is the wire protocol; `mod pool` is the main
//! process's view of the pool; [`run_loop`] is what a worker process runs.

pub mod message;
pub mod pool;

use std::io::Write;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::backend::{self, CompileBackend, DiagnosticKind};
use crate::host::CompileHost;
use crate::polyfill::Overlay;
use crate::source_cache::SourceFileCache;

use message::{CompileResponse, WorkerMessage};

/// Entry point run inside a spawned worker process. Loads the backend,
/// initializes its `SourceFileCache`, sends `ready`, then services `compile`
/// requests one at a time off stdin until stdin closes (`spec.md` §4.7
/// "Startup").
pub async fn run_loop() -> std::io::Result<()> {
    let mut backend = backend::default_backend();
    let mut cache = SourceFileCache::new(512);

    emit(&WorkerMessage::Ready)?;

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(WorkerMessage::Compile(req)) = WorkerMessage::from_line(&line) else {
            // Malformed or unexpected message type; drop it rather than
            // crash the worker (spec.md §6 "Worker IPC").
            continue;
        };

        let overlay: Overlay = req.overlay.into_iter().collect();
        let mut host = CompileHost::new(&mut cache, overlay);

        let started = std::time::Instant::now();
        let outcome = crate::engine::compile(
            &mut host,
            &req.target,
            req.type_check,
            req.skip_declarations,
            backend.as_mut(),
        );

        let response = match outcome {
            Ok(outcome) => CompileResponse {
                target_name: req.target.name.clone(),
                success: outcome.success(),
                diagnostics_text: crate::diagnostics::format_for_target(
                    &req.target.name,
                    &outcome.diagnostics,
                ),
                error_count: outcome
                    .diagnostics
                    .iter()
                    .filter(|d| d.kind == DiagnosticKind::Error)
                    .count(),
                time_ms: started.elapsed().as_millis() as u64,
                out_dir: req.target.out_dir.clone(),
            },
            Err(e) => CompileResponse {
                target_name: req.target.name.clone(),
                success: false,
                diagnostics_text: e.to_string(),
                error_count: 1,
                time_ms: started.elapsed().as_millis() as u64,
                out_dir: req.target.out_dir.clone(),
            },
        };

        emit(&WorkerMessage::Result(response))?;
    }

    Ok(())
}

fn emit(message: &WorkerMessage) -> std::io::Result<()> {
    let line = message
        .to_line()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(line.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

/// Writes `message` to an already-async stdout handle. Used by the pool's
/// own in-process fallback path in tests; production dispatch goes through
/// a child process's piped stdin, handled in `pool`.
pub(crate) async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &WorkerMessage,
) -> std::io::Result<()> {
    let line = message
        .to_line()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
