use crate::error::{ErrorList, FaultPayload};
use crate::task::{CancelTask, GroupTask};

use std::panic::AssertUnwindSafe;

use fibre::mpsc::{self, AsyncReceiver};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum Finished<E> {
  Clean,
  Errored(E),
  Faulted(FaultPayload),
}

/// Spawns one execution context per task. The returned channel closes once
/// every spawned context has published, which is the join barrier the
/// combinators drain against.
fn spawn_group<E: Send + 'static>(tasks: Vec<GroupTask<E>>) -> AsyncReceiver<Finished<E>> {
  let (tx, rx) = mpsc::unbounded_async();
  for task in tasks {
    let tx = tx.clone();
    tokio::spawn(async move {
      let finished = match AssertUnwindSafe(task).catch_unwind().await {
        Ok(Ok(())) => Finished::Clean,
        Ok(Err(error)) => Finished::Errored(error),
        Err(payload) => Finished::Faulted(FaultPayload::new(payload)),
      };
      let _ = tx.send(finished).await;
    });
  }
  rx
}

fn derive<E: Send + 'static>(scope: &CancellationToken, tasks: Vec<CancelTask<E>>) -> Vec<GroupTask<E>> {
  tasks
    .into_iter()
    .map(|factory| -> GroupTask<E> {
      let token = scope.child_token();
      Box::pin(async move { factory(token).await })
    })
    .collect()
}

/// Runs every task concurrently, one execution context each, and waits for all
/// of them to finish. Nothing is cancelled: an error in one task does not
/// affect its siblings. Every error is joined into the returned [`ErrorList`].
///
/// If a task terminates abnormally, the fault is re-raised here after all
/// tasks have finished, superseding any collected errors.
pub async fn run_all<E: Send + 'static>(tasks: Vec<GroupTask<E>>) -> Result<(), ErrorList<E>> {
  let rx = spawn_group(tasks);

  let mut errors = Vec::new();
  let mut fault: Option<FaultPayload> = None;
  while let Ok(finished) = rx.recv().await {
    match finished {
      Finished::Clean => {}
      Finished::Errored(error) => errors.push(error),
      Finished::Faulted(payload) => {
        if fault.is_none() {
          fault = Some(payload);
        }
      }
    }
  }

  if let Some(payload) = fault {
    payload.resume();
  }
  ErrorList::join(errors)
}

/// Runs every task concurrently; the first error or fault cancels the shared
/// scope. Each task receives its own token derived from the scope and may
/// return early once it observes cancellation, but every already-started task
/// is still awaited before this returns.
///
/// Returns the first error encountered; later errors are superseded. A fault
/// is re-raised here after all tasks finish and wins over any error.
pub async fn try_all<E: Send + 'static>(tasks: Vec<CancelTask<E>>) -> Result<(), E> {
  let scope = CancellationToken::new();
  let rx = spawn_group(derive(&scope, tasks));

  let mut first_error: Option<E> = None;
  let mut fault: Option<FaultPayload> = None;
  while let Ok(finished) = rx.recv().await {
    match finished {
      Finished::Clean => {}
      Finished::Errored(error) => {
        debug!("task errored, cancelling group scope");
        scope.cancel();
        if first_error.is_none() {
          first_error = Some(error);
        }
      }
      Finished::Faulted(payload) => {
        scope.cancel();
        if fault.is_none() {
          fault = Some(payload);
        }
      }
    }
  }

  if let Some(payload) = fault {
    payload.resume();
  }
  match first_error {
    Some(error) => Err(error),
    None => Ok(()),
  }
}

/// Runs every task concurrently; the first success cancels the shared scope.
/// Each task receives its own token derived from the scope. Every
/// already-started task is still awaited before this returns.
///
/// Returns `Ok` if at least one task succeeded; otherwise every error is
/// joined into the returned [`ErrorList`]. A fault is re-raised after all
/// tasks finish and wins over both.
pub async fn race<E: Send + 'static>(tasks: Vec<CancelTask<E>>) -> Result<(), ErrorList<E>> {
  let scope = CancellationToken::new();
  let rx = spawn_group(derive(&scope, tasks));

  let mut any_success = false;
  let mut errors = Vec::new();
  let mut fault: Option<FaultPayload> = None;
  while let Ok(finished) = rx.recv().await {
    match finished {
      Finished::Clean => {
        debug!("task succeeded, cancelling group scope");
        scope.cancel();
        any_success = true;
      }
      Finished::Errored(error) => errors.push(error),
      Finished::Faulted(payload) => {
        scope.cancel();
        if fault.is_none() {
          fault = Some(payload);
        }
      }
    }
  }

  if let Some(payload) = fault {
    payload.resume();
  }
  if any_success {
    return Ok(());
  }
  ErrorList::join(errors)
}
