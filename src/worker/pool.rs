//! The main process's view of the worker pool (`spec.md` §4.7).
//!
//! Implemented as a single actor task owning all pool state, communicating
//! with callers and per-worker I/O tasks over channels — avoids a shared
//! `Mutex` across the dispatch/crash/termination paths, which is where the
//! spec's ordering guarantees (`spec.md` §5) are easiest to get wrong under
//! a lock-per-operation design.

use std::collections::{HashMap, VecDeque};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, WarpError};

use super::message::{CompileRequest, WorkerMessage};

/// `N = max(1, min(available_cpus, unique_compilation_count))`
/// (`spec.md` §4.7 "Sizing").
pub fn worker_count(unique_compilation_count: usize) -> usize {
    let cpus = num_cpus::get();
    std::cmp::max(1, std::cmp::min(cpus, unique_compilation_count))
}

/// The flag passed to re-exec this binary as a worker process. Checked for
/// in `main` before normal CLI parsing runs.
pub const WORKER_LOOP_FLAG: &str = "--internal-worker-loop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Starting,
    Idle,
    Busy,
    Dead,
}

enum Command_ {
    WaitReady(oneshot::Sender<Result<()>>),
    Compile(CompileRequest, oneshot::Sender<Result<super::message::CompileResponse>>),
    Terminate(oneshot::Sender<()>),
}

enum Event {
    Ready(usize),
    Result(usize, super::message::CompileResponse),
    Died(usize, String),
}

struct Job {
    request: CompileRequest,
    reply: oneshot::Sender<Result<super::message::CompileResponse>>,
}

/// A handle to a running pool. Cloning is cheap (an mpsc sender); all clones
/// talk to the same underlying actor.
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command_>,
}

impl WorkerPool {
    /// Spawns `n` worker processes (re-execs the current binary under
    /// [`WORKER_LOOP_FLAG`]) and starts the actor task that owns them.
    pub fn spawn(n: usize) -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            WarpError::with_cause(crate::error::ErrorKind::Compile, "cannot locate own executable", e)
        })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut writers = HashMap::new();

        for id in 0..n {
            let mut child = Command::new(&exe)
                .arg(WORKER_LOOP_FLAG)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    WarpError::with_cause(
                        crate::error::ErrorKind::Compile,
                        format!("failed to spawn worker {id}"),
                        e,
                    )
                })?;

            let stdin = child.stdin.take().expect("piped stdin");
            let stdout = child.stdout.take().expect("piped stdout");

            let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WorkerMessage>();
            tokio::spawn(async move {
                let mut stdin = stdin;
                while let Some(message) = write_rx.recv().await {
                    if super::write_message(&mut stdin, &message).await.is_err() {
                        break;
                    }
                }
            });

            let reader_event_tx = event_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match WorkerMessage::from_line(&line) {
                            Some(WorkerMessage::Ready) => {
                                let _ = reader_event_tx.send(Event::Ready(id));
                            }
                            Some(WorkerMessage::Result(response)) => {
                                let _ = reader_event_tx.send(Event::Result(id, response));
                            }
                            _ => continue,
                        },
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
            });

            let exit_event_tx = event_tx.clone();
            tokio::spawn(async move {
                let status = child.wait().await;
                let reason = match status {
                    Ok(s) if s.success() => return,
                    Ok(s) => format!("exited with {s}"),
                    Err(e) => format!("wait failed: {e}"),
                };
                let _ = exit_event_tx.send(Event::Died(id, reason));
            });

            writers.insert(id, write_tx);
        }

        tokio::spawn(run_actor(n, writers, command_rx, event_rx));

        Ok(Self { commands: command_tx })
    }

    pub async fn wait_ready(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command_::WaitReady(tx))
            .map_err(|_| WarpError::compile("worker pool actor is gone"))?;
        rx.await.map_err(|_| WarpError::compile("worker pool actor is gone"))?
    }

    pub async fn compile(
        &self,
        request: CompileRequest,
    ) -> Result<super::message::CompileResponse> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command_::Compile(request, tx))
            .map_err(|_| WarpError::compile("worker pool terminated"))?;
        rx.await.map_err(|_| WarpError::compile("worker pool terminated"))?
    }

    pub async fn terminate(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command_::Terminate(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_actor(
    total: usize,
    writers: HashMap<usize, mpsc::UnboundedSender<WorkerMessage>>,
    mut commands: mpsc::UnboundedReceiver<Command_>,
    mut events: mpsc::UnboundedReceiver<Event>,
) {
    let mut states: HashMap<usize, WorkerState> =
        (0..total).map(|id| (id, WorkerState::Starting)).collect();
    let mut idle: VecDeque<usize> = VecDeque::new();
    let mut ready_count = 0usize;
    let mut ready_result: Option<std::result::Result<(), String>> = None;
    let mut ready_waiters: Vec<oneshot::Sender<Result<()>>> = Vec::new();
    let mut queue: VecDeque<Job> = VecDeque::new();
    let mut in_flight: HashMap<usize, Job> = HashMap::new();
    let mut terminated = false;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command_::WaitReady(reply) => {
                        if let Some(result) = &ready_result {
                            let _ = reply.send(result.clone().map_err(WarpError::compile));
                        } else {
                            ready_waiters.push(reply);
                        }
                    }
                    Command_::Compile(request, reply) => {
                        if terminated {
                            let _ = reply.send(Err(WarpError::compile("worker pool terminated")));
                            continue;
                        }
                        queue.push_back(Job { request, reply });
                        drain_queue(&mut states, &mut idle, &mut in_flight, &writers, &mut queue);
                    }
                    Command_::Terminate(reply) => {
                        terminated = true;
                        for job in queue.drain(..) {
                            let _ = job.reply.send(Err(WarpError::compile("worker pool terminated")));
                        }
                        for (_, job) in in_flight.drain() {
                            let _ = job.reply.send(Err(WarpError::compile("worker pool terminated")));
                        }
                        for (_, state) in states.iter_mut() {
                            *state = WorkerState::Dead;
                        }
                        let _ = reply.send(());
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    Event::Ready(id) => {
                        if states.get(&id) == Some(&WorkerState::Starting) {
                            states.insert(id, WorkerState::Idle);
                            idle.push_back(id);
                            ready_count += 1;
                            if ready_count == total && ready_result.is_none() {
                                ready_result = Some(Ok(()));
                                for w in ready_waiters.drain(..) {
                                    let _ = w.send(Ok(()));
                                }
                            }
                            drain_queue(&mut states, &mut idle, &mut in_flight, &writers, &mut queue);
                        }
                    }
                    Event::Result(id, response) => {
                        if let Some(job) = in_flight.remove(&id) {
                            let _ = job.reply.send(Ok(response));
                        }
                        if states.get(&id) == Some(&WorkerState::Busy) {
                            states.insert(id, WorkerState::Idle);
                            idle.push_back(id);
                        }
                        drain_queue(&mut states, &mut idle, &mut in_flight, &writers, &mut queue);
                    }
                    Event::Died(id, reason) => {
                        // Idempotent: the "error then exit" pair can both
                        // fire; only the first transition matters.
                        if states.get(&id) == Some(&WorkerState::Dead) {
                            continue;
                        }
                        states.insert(id, WorkerState::Dead);
                        idle.retain(|&i| i != id);

                        if let Some(job) = in_flight.remove(&id) {
                            let name = job.request.target.name.clone();
                            let _ = job.reply.send(Err(WarpError::worker_crashed(&name, &reason)));
                        }

                        if ready_result.is_none() {
                            ready_result = Some(Err(reason.clone()));
                            for w in ready_waiters.drain(..) {
                                let _ = w.send(Err(WarpError::compile(reason.clone())));
                            }
                        }

                        let any_alive = states.values().any(|s| *s != WorkerState::Dead);
                        if !any_alive && !queue.is_empty() {
                            for job in queue.drain(..) {
                                let _ = job.reply.send(Err(WarpError::compile(
                                    "all workers are dead; queued task rejected",
                                )));
                            }
                        }
                    }
                }
            }
        }
    }
}

fn drain_queue(
    states: &mut HashMap<usize, WorkerState>,
    idle: &mut VecDeque<usize>,
    in_flight: &mut HashMap<usize, Job>,
    writers: &HashMap<usize, mpsc::UnboundedSender<WorkerMessage>>,
    queue: &mut VecDeque<Job>,
) {
    while let Some(id) = idle.pop_front() {
        let Some(job) = queue.pop_front() else {
            idle.push_front(id);
            break;
        };
        if let Some(writer) = writers.get(&id) {
            let _ = writer.send(WorkerMessage::Compile(job.request.clone()));
            states.insert(id, WorkerState::Busy);
            in_flight.insert(id, job);
        } else {
            queue.push_front(job);
            break;
        }
    }
}
