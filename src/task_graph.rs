//! Generic dependency-ordered async task executor (`spec.md` §4.8).
//!
//! Validates acyclicity up front via Kahn's algorithm, then runs tasks as
//! their dependencies complete using a reverse-adjacency wake index so total
//! scheduling work is O(V+E), not O(V²).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use futures_util::future::FutureExt;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, Result, WarpError};

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// One unit of work: an id, the ids it depends on, and the closure that runs
/// it. A dependency id absent from the graph is silently ignored — it cannot
/// gate scheduling (`spec.md` §4.8).
pub struct Task<T> {
    pub id: String,
    pub deps: Vec<String>,
    pub run: Box<dyn FnOnce() -> BoxFuture<T> + Send>,
}

impl<T> Task<T> {
    pub fn new<F, Fut>(id: impl Into<String>, deps: Vec<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self { id: id.into(), deps, run: Box::new(move || run().boxed()) }
    }
}

/// Validates the graph is acyclic via in-degree-zero propagation (Kahn's
/// algorithm), ignoring dependency ids that aren't in the task set. Returns a
/// typed error naming every id still left with unresolved in-degree — the
/// cycle's participants — if one exists.
fn validate_acyclic<T>(tasks: &[Task<T>]) -> Result<()> {
    let ids: std::collections::HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();

    for t in tasks {
        let known_deps = t.deps.iter().filter(|d| ids.contains(d.as_str())).count();
        in_degree.insert(&t.id, known_deps);
        for d in &t.deps {
            if ids.contains(d.as_str()) {
                forward.entry(d.as_str()).or_default().push(&t.id);
            }
        }
    }

    let mut queue: Vec<&str> =
        in_degree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
    let mut visited = 0usize;

    while let Some(id) = queue.pop() {
        visited += 1;
        if let Some(dependents) = forward.get(id) {
            for &dep in dependents {
                let entry = in_degree.get_mut(dep).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push(dep);
                }
            }
        }
    }

    if visited != tasks.len() {
        let cyclic: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d > 0)
            .map(|(&id, _)| id)
            .collect();
        let mut cyclic = cyclic;
        cyclic.sort();
        return Err(WarpError::new(
            ErrorKind::Compile,
            format!("task graph has a cycle among: {}", cyclic.join(", ")),
        ));
    }

    Ok(())
}

/// Runs `tasks` to completion, respecting dependency edges, and returns
/// results keyed by task id in no particular order (callers re-sort into
/// plan order themselves, per `spec.md` §4.9 "return value").
///
/// If any task's executor fails, the overall future resolves to that error;
/// dependents of the failed task are never launched.
pub async fn run<T: Send + 'static>(tasks: Vec<Task<T>>) -> Result<HashMap<String, T>> {
    validate_acyclic(&tasks)?;

    if tasks.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: std::collections::HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut forward: HashMap<String, Vec<String>> = HashMap::new();
    let mut runnables: HashMap<String, Box<dyn FnOnce() -> BoxFuture<T> + Send>> = HashMap::new();

    for t in tasks {
        let known_deps = t.deps.iter().filter(|d| ids.contains(d.as_str())).count();
        in_degree.insert(t.id.clone(), known_deps);
        for d in &t.deps {
            if ids.contains(d) {
                forward.entry(d.clone()).or_default().push(t.id.clone());
            }
        }
        runnables.insert(t.id.clone(), t.run);
    }

    let in_degree = Mutex::new(in_degree);
    let results: Mutex<HashMap<String, T>> = Mutex::new(HashMap::new());
    let mut ready: Vec<String> = {
        let degrees = in_degree.lock().await;
        degrees.iter().filter(|(_, &d)| d == 0).map(|(id, _)| id.clone()).collect()
    };

    let mut failure: Option<WarpError> = None;

    while !ready.is_empty() {
        let batch = std::mem::take(&mut ready);
        let mut handles = Vec::with_capacity(batch.len());
        for id in batch {
            let run = runnables.remove(&id).expect("task runnable consumed exactly once");
            handles.push(async move { (id, run().await) });
        }

        let outcomes = futures_util::future::join_all(handles).await;

        for (id, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    results.lock().await.insert(id.clone(), value);
                    if let Some(dependents) = forward.get(&id) {
                        let mut degrees = in_degree.lock().await;
                        for dep in dependents {
                            let entry = degrees.get_mut(dep).unwrap();
                            *entry -= 1;
                            if *entry == 0 {
                                ready.push(dep.clone());
                            }
                        }
                    }
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        if failure.is_some() {
            break;
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    Ok(results.into_inner())
}
