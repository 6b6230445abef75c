use crate::error::{FaultPayload, PoolError};
use crate::outcome::TaskOutcome;

use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;

use fibre::mpsc::{self, AsyncReceiver, AsyncSender};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, debug_span, error, trace, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);
}

/// Resolves the `workers` parameter: `0` means "use available parallelism".
pub(crate) fn resolve_workers(workers: usize) -> usize {
  if workers >= 1 {
    workers
  } else {
    thread::available_parallelism()
      .map(NonZeroUsize::get)
      .unwrap_or(1)
  }
}

/// The producer half of a worker pool. Cloneable; any clone may dispatch.
///
/// Closing the input (or dropping every clone) is the only supported way to
/// stop the pool. Only the producer side may do so.
pub struct PoolInput<I: Send + 'static> {
  tx: AsyncSender<I>,
}

impl<I: Send + 'static> Clone for PoolInput<I> {
  fn clone(&self) -> Self {
    Self { tx: self.tx.clone() }
  }
}

impl<I: Send + 'static> PoolInput<I> {
  /// Dispatches one input to the pool.
  pub async fn send(&self, input: I) -> Result<(), PoolError> {
    if self.tx.is_closed() {
      return Err(PoolError::InputClosed);
    }
    self.tx.send(input).await.map_err(|_| PoolError::InputClosed)
  }

  /// Closes the input channel. Idempotent. Inputs already dispatched still
  /// resolve; the output channel closes once the last of them has published.
  pub fn close(&self) {
    let _ = self.tx.close();
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Inputs accepted but not yet picked up by an execution context.
  pub fn pending(&self) -> usize {
    self.tx.len()
  }
}

/// The consumer half of a worker pool.
///
/// `recv` returning `None` is the single termination signal: it means the
/// input channel was closed and every dispatched input has resolved. Consumers
/// must drain to `None` to avoid abandoning in-flight executions.
pub struct PoolOutput<I: Send, O: Send, E: Send> {
  rx: AsyncReceiver<TaskOutcome<I, O, E>>,
}

impl<I: Send, O: Send, E: Send> PoolOutput<I, O, E> {
  /// Receives the next resolved outcome, or `None` once the pool has fully
  /// stopped. Completion order across the pool is nondeterministic.
  pub async fn recv(&mut self) -> Option<TaskOutcome<I, O, E>> {
    self.rx.recv().await.ok()
  }
}

/// Starts a pool of `workers` parallel execution contexts (or one per unit of
/// available parallelism if `workers` is `0`) draining the returned input
/// channel and publishing one [`TaskOutcome`] per input on the returned output
/// channel.
///
/// A panicking task is captured at the pool boundary and published as
/// [`TaskOutcome::Fault`]; the pool keeps running at full width afterwards.
///
/// Must be called from within a Tokio runtime.
pub fn start<I, O, E, F, Fut>(workers: usize, task: F) -> (PoolInput<I>, PoolOutput<I, O, E>)
where
  I: Clone + Send + 'static,
  O: Send + 'static,
  E: Send + 'static,
  F: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, E>> + Send + 'static,
{
  let workers = resolve_workers(workers);
  let pool_id = NEXT_POOL_ID.fetch_add(1, AtomicOrdering::Relaxed);
  let (in_tx, in_rx) = mpsc::unbounded_async::<I>();
  let (out_tx, out_rx) = mpsc::unbounded_async::<TaskOutcome<I, O, E>>();
  let semaphore = Arc::new(Semaphore::new(workers));
  let task = Arc::new(task);

  tokio::spawn(
    run_dispatch_loop(semaphore, in_rx, out_tx, task)
      .instrument(debug_span!("worker_pool", id = pool_id, workers)),
  );

  (PoolInput { tx: in_tx }, PoolOutput { rx: out_rx })
}

/// The pool's single dispatch loop: acquire a permit, receive one input, spawn
/// its execution holding the permit. The semaphore bounds concurrency while
/// the input channel itself stays unbounded.
async fn run_dispatch_loop<I, O, E, F, Fut>(
  semaphore: Arc<Semaphore>,
  in_rx: AsyncReceiver<I>,
  out_tx: AsyncSender<TaskOutcome<I, O, E>>,
  task: Arc<F>,
) where
  I: Clone + Send + 'static,
  O: Send + 'static,
  E: Send + 'static,
  F: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<O, E>> + Send + 'static,
{
  trace!("dispatch loop started");

  loop {
    let permit = match semaphore.clone().acquire_owned().await {
      Ok(permit) => permit,
      Err(_) => {
        error!("pool semaphore closed unexpectedly, dispatch loop exiting");
        break;
      }
    };

    let input = match in_rx.recv().await {
      Ok(input) => input,
      Err(_) => {
        // Input channel closed and empty: the pool is stopping.
        drop(permit);
        break;
      }
    };

    let task = task.clone();
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
      let _permit = permit;

      // The closure call happens inside the unwind boundary too, so a panic
      // while constructing the future is captured like any other.
      let run = {
        let task = task.clone();
        let input = input.clone();
        AssertUnwindSafe(async move { (*task)(input).await }).catch_unwind()
      };

      let outcome = match run.await {
        Ok(Ok(output)) => TaskOutcome::Success { input, output },
        Ok(Err(error)) => TaskOutcome::Failure { input, error },
        Err(payload) => {
          error!("task terminated abnormally, publishing fault");
          TaskOutcome::Fault {
            input,
            payload: FaultPayload::new(payload),
          }
        }
      };

      if out_tx.send(outcome).await.is_err() {
        debug!("outcome receiver dropped, outcome discarded");
      }
    });
  }

  trace!("dispatch loop stopped");
  // The loop's sender drops here; the output channel closes once the last
  // in-flight execution has published its outcome.
}
