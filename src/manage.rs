use crate::outcome::TaskOutcome;
use crate::pool::{resolve_workers, start};

use std::collections::VecDeque;
use std::future::Future;
use std::ops::ControlFlow;

use tracing::{debug, error, trace};

/// Drives a worker pool with a FIFO frontier that the manager may grow.
///
/// `workers` parallel execution contexts (or available parallelism if `0`)
/// execute `task` against the frontier, seeded with `initial`. After every
/// resolved outcome the `manager` is invoked serially with the input and its
/// `Result`:
///
/// - `ControlFlow::Continue(new)` appends `new` to the back of the frontier in
///   order and keeps scheduling;
/// - `ControlFlow::Break(())` halts scheduling; outstanding work is drained
///   unprocessed and the call returns normally.
///
/// The manager runs on this call's single control flow and is never invoked
/// concurrently with itself, so it may freely mutate captured bookkeeping
/// state (a visited set, retry counters) without locks. An ordinary task error
/// does not stop scheduling by itself; only the manager's `Break` or a fault
/// does.
///
/// Frontier items are dispatched strictly in enqueue order, never more than
/// `workers` in flight at once, and the call returns only when the frontier is
/// empty and nothing is in flight (or the manager halted).
///
/// # Faults
///
/// If a task terminates abnormally, scheduling stops, every outstanding
/// outcome is drained without invoking the manager, and the captured payload
/// is re-raised here. Task and manager functions must not block the runtime
/// indefinitely; that obligation is the caller's.
pub async fn manage_tasks<I, O, E, F, Fut, M>(workers: usize, task: F, mut manager: M, initial: Vec<I>)
where
  I: Clone + Send + 'static,
  O: Send + 'static,
  E: Send + 'static,
  F: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, E>> + Send + 'static,
  M: FnMut(I, Result<O, E>) -> ControlFlow<(), Vec<I>>,
{
  let workers = resolve_workers(workers);
  let (input, mut output) = start(workers, task);

  let mut queue: VecDeque<I> = initial.into();
  let mut inflight: usize = 0;
  let mut fault = None;

  debug!(workers, seeded = queue.len(), "manager loop started");

  'schedule: while inflight > 0 || !queue.is_empty() {
    // Dispatch from the head of the frontier until the pool is saturated.
    while inflight < workers {
      let Some(item) = queue.pop_front() else { break };
      if input.send(item).await.is_err() {
        error!("pool input closed mid-run, halting scheduling");
        break 'schedule;
      }
      inflight += 1;
    }

    let Some(outcome) = output.recv().await else { break };
    inflight -= 1;

    let (item, result) = match outcome {
      TaskOutcome::Fault { payload, .. } => {
        error!("task fault observed, draining in-flight work before re-raising");
        fault = Some(payload);
        break;
      }
      TaskOutcome::Success { input, output } => (input, Ok(output)),
      TaskOutcome::Failure { input, error } => (input, Err(error)),
    };

    match manager(item, result) {
      ControlFlow::Continue(new) => queue.extend(new),
      ControlFlow::Break(()) => {
        debug!("manager halted scheduling");
        break;
      }
    }
  }

  // Always stop the pool and drain outstanding outcomes so no execution
  // context is left blocked on publishing.
  input.close();
  while output.recv().await.is_some() {}
  trace!("manager loop drained");

  if let Some(payload) = fault {
    payload.resume();
  }
}
