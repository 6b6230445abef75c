use crate::error::{ErrorList, FaultPayload};
use crate::outcome::TaskOutcome;
use crate::pool::{resolve_workers, start};

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Processes every item through a pool of `workers` execution contexts (or
/// available parallelism if `0`), waiting for all of them to resolve. Items
/// are dispatched in order; completion order is nondeterministic.
///
/// Errors do not halt execution and are joined into the returned
/// [`ErrorList`]. A fault does not halt dispatch either — every item still
/// runs — but is re-raised here once all items have resolved, superseding any
/// collected errors.
pub async fn for_each<I, E, F, Fut>(workers: usize, items: Vec<I>, task: F) -> Result<(), ErrorList<E>>
where
  I: Clone + Send + 'static,
  E: Send + 'static,
  F: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
{
  let workers = resolve_workers(workers);
  let (input, mut output) = start(workers, task);

  let mut pending = items.into_iter();
  let mut inflight: usize = 0;
  let mut errors = Vec::new();
  let mut fault: Option<FaultPayload> = None;

  loop {
    while inflight < workers {
      let Some(item) = pending.next() else { break };
      if input.send(item).await.is_err() {
        break;
      }
      inflight += 1;
    }
    if inflight == 0 {
      break;
    }

    let Some(outcome) = output.recv().await else { break };
    inflight -= 1;

    match outcome {
      TaskOutcome::Success { .. } => {}
      TaskOutcome::Failure { error, .. } => errors.push(error),
      TaskOutcome::Fault { payload, .. } => {
        if fault.is_none() {
          fault = Some(payload);
        }
      }
    }
  }

  input.close();
  while output.recv().await.is_some() {}

  if let Some(payload) = fault {
    payload.resume();
  }
  ErrorList::join(errors)
}

/// Maps every item to an output through a pool of `workers` execution contexts
/// (or available parallelism if `0`), preserving positions: the returned
/// vector is aligned with `items`.
///
/// The first error or fault cancels the shared scope and halts further
/// dispatch; outstanding work is still drained before returning. On error the
/// first one encountered is returned instead of the partial vector (slots for
/// items that never ran hold `O::default()` only while the run is in flight).
/// A fault is re-raised here after the drain and wins over any error.
///
/// Each task invocation receives a token derived from the scope alongside its
/// item; cancellation is cooperative only.
pub async fn try_map<I, O, E, F, Fut>(workers: usize, items: Vec<I>, task: F) -> Result<Vec<O>, E>
where
  I: Clone + Send + 'static,
  O: Default + Send + 'static,
  E: Send + 'static,
  F: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, E>> + Send + 'static,
{
  let workers = resolve_workers(workers);
  let scope = CancellationToken::new();
  let total = items.len();

  // The pool maps (position, item) pairs so outcomes carry the slot to fill.
  let pool_task = {
    let scope = scope.clone();
    let task = Arc::new(task);
    move |(_, item): (usize, I)| (*task)(scope.child_token(), item)
  };
  let (input, mut output) = start(workers, pool_task);

  let mut results: Vec<O> = std::iter::repeat_with(O::default).take(total).collect();
  let mut pending = items.into_iter().enumerate();
  let mut inflight: usize = 0;
  let mut first_error: Option<E> = None;
  let mut fault: Option<FaultPayload> = None;
  let mut halted = false;

  loop {
    while !halted && inflight < workers {
      let Some(slot) = pending.next() else { break };
      if input.send(slot).await.is_err() {
        halted = true;
        break;
      }
      inflight += 1;
    }
    if inflight == 0 {
      break;
    }

    let Some(outcome) = output.recv().await else { break };
    inflight -= 1;

    match outcome {
      TaskOutcome::Success { input: (pos, _), output } => results[pos] = output,
      TaskOutcome::Failure { error, .. } => {
        if first_error.is_none() {
          debug!("task errored, cancelling scope and halting dispatch");
          scope.cancel();
          first_error = Some(error);
          halted = true;
        }
      }
      TaskOutcome::Fault { payload, .. } => {
        if fault.is_none() {
          error!("task fault observed, cancelling scope and halting dispatch");
          scope.cancel();
          fault = Some(payload);
          halted = true;
        }
      }
    }
  }

  input.close();
  while output.recv().await.is_some() {}

  if let Some(payload) = fault {
    payload.resume();
  }
  match first_error {
    Some(error) => Err(error),
    None => Ok(results),
  }
}
