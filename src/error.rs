use std::any::Any;
use std::fmt;
use std::panic;

use thiserror::Error;

/// Errors surfaced by the pool's channel handles.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
  #[error("pool input channel is closed, cannot dispatch")]
  InputClosed,
}

/// An ordered collection of every distinct error produced by a group of tasks.
///
/// Returned by the combinators that join errors rather than reporting only the
/// first one (`run_all`, `race`, `for_each`). The list is never empty: an
/// error-free run returns `Ok` instead.
pub struct ErrorList<E> {
  errors: Vec<E>,
}

impl<E> ErrorList<E> {
  /// Joins a batch of collected errors into a single value.
  ///
  /// Returns `Ok(())` when `errors` is empty, mirroring a nil joined error.
  pub fn join(errors: Vec<E>) -> Result<(), Self> {
    if errors.is_empty() {
      Ok(())
    } else {
      Err(Self { errors })
    }
  }

  pub fn len(&self) -> usize {
    self.errors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  /// The first error collected, in completion order.
  pub fn first(&self) -> &E {
    &self.errors[0]
  }

  pub fn iter(&self) -> std::slice::Iter<'_, E> {
    self.errors.iter()
  }

  pub fn into_vec(self) -> Vec<E> {
    self.errors
  }
}

impl<E> IntoIterator for ErrorList<E> {
  type Item = E;
  type IntoIter = std::vec::IntoIter<E>;

  fn into_iter(self) -> Self::IntoIter {
    self.errors.into_iter()
  }
}

impl<E: fmt::Debug> fmt::Debug for ErrorList<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.errors.iter()).finish()
  }
}

impl<E: fmt::Display> fmt::Display for ErrorList<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, error) in self.errors.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      write!(f, "{}", error)?;
    }
    Ok(())
  }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for ErrorList<E> {}

/// The opaque payload of a captured abnormal task termination.
///
/// The runtime never resolves the payload further; it is carried as-is from the
/// capture site to the orchestrating flow, which may inspect it with the
/// accessors or re-raise it with [`FaultPayload::resume`].
pub struct FaultPayload {
  payload: Box<dyn Any + Send + 'static>,
}

impl FaultPayload {
  pub(crate) fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
    Self { payload }
  }

  /// The panic message, when the payload is a `&str` or `String`.
  pub fn as_str(&self) -> Option<&str> {
    if let Some(s) = self.payload.downcast_ref::<&'static str>() {
      Some(s)
    } else if let Some(s) = self.payload.downcast_ref::<String>() {
      Some(s.as_str())
    } else {
      None
    }
  }

  pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
    self.payload.downcast_ref::<T>()
  }

  pub fn into_inner(self) -> Box<dyn Any + Send + 'static> {
    self.payload
  }

  /// Re-raises the captured termination in the calling context.
  pub fn resume(self) -> ! {
    panic::resume_unwind(self.payload)
  }
}

impl fmt::Debug for FaultPayload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FaultPayload")
      .field("message", &self.as_str().unwrap_or("<non-string payload>"))
      .finish()
  }
}

impl fmt::Display for FaultPayload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.as_str() {
      Some(s) => write!(f, "task fault: {}", s),
      None => write!(f, "task fault: <non-string payload>"),
    }
  }
}
