use crate::task::GroupTask;

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// A shared cooperative cancellation scope for composing ad-hoc task groups
/// outside the fixed combinators.
///
/// Holds one token; [`cancel`](CancelScope::cancel) is idempotent and visible
/// to every holder. The two adapters wrap a cancellation-aware task into a
/// [`GroupTask`] suitable for [`run_all`](crate::run_all):
///
/// - [`all`](CancelScope::all) triggers the scope when the task errors, giving
///   a group that stops issuing work after the first failure;
/// - [`race`](CancelScope::race) triggers the scope when the task succeeds,
///   giving a group that stops once any member wins.
///
/// Both hand the task a token derived from the scope and skip the task body
/// entirely when the scope is already cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelScope {
  token: CancellationToken,
}

impl CancelScope {
  pub fn new() -> Self {
    Self {
      token: CancellationToken::new(),
    }
  }

  /// A scope that is also cancelled whenever `parent` is.
  pub fn child_of(parent: &CancellationToken) -> Self {
    Self {
      token: parent.child_token(),
    }
  }

  pub fn token(&self) -> CancellationToken {
    self.token.clone()
  }

  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Triggers the scope. Idempotent; later calls are no-ops.
  pub fn cancel(&self) {
    self.token.cancel();
  }

  /// Wraps `task` with "all" semantics: an error triggers the scope.
  pub fn all<E, F, Fut>(&self, task: F) -> GroupTask<E>
  where
    E: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
  {
    let token = self.token.clone();
    Box::pin(async move {
      if token.is_cancelled() {
        return Ok(());
      }
      match task(token.child_token()).await {
        Ok(()) => Ok(()),
        Err(error) => {
          token.cancel();
          Err(error)
        }
      }
    })
  }

  /// Wraps `task` with "race" semantics: a success triggers the scope.
  pub fn race<E, F, Fut>(&self, task: F) -> GroupTask<E>
  where
    E: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
  {
    let token = self.token.clone();
    Box::pin(async move {
      if token.is_cancelled() {
        return Ok(());
      }
      match task(token.child_token()).await {
        Ok(()) => {
          token.cancel();
          Ok(())
        }
        Err(error) => Err(error),
      }
    })
  }
}
