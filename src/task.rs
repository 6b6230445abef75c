use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// A boxed, sendable future, the shape every group combinator consumes.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A unit of work for the group combinators: runs to completion and reports
/// either success or an ordinary error of type `E`.
pub type GroupTask<E> = BoxFuture<Result<(), E>>;

/// A cancellation-aware task factory. The combinator hands it a token derived
/// from the group's scope; the task may poll or await it to return early, but
/// nothing forcibly preempts a task that ignores it.
pub type CancelTask<E> = Box<dyn FnOnce(CancellationToken) -> GroupTask<E> + Send + 'static>;
