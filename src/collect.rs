use std::collections::HashMap;
use std::hash::Hash;
use std::mem;

use parking_lot::Mutex;

struct Guarded<C> {
  items: C,
  frozen: bool,
}

/// A concurrently writable vector with a one-shot freeze.
///
/// Writers push from any context; a single `freeze` call hands the underlying
/// vector over for read-only use. Writing after the freeze is a programming
/// error and panics. Reads are not offered before the freeze.
pub struct SharedVec<T> {
  inner: Mutex<Guarded<Vec<T>>>,
}

impl<T> SharedVec<T> {
  pub fn new() -> Self {
    Self::with_capacity(0)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      inner: Mutex::new(Guarded {
        items: Vec::with_capacity(capacity),
        frozen: false,
      }),
    }
  }

  /// # Panics
  /// Panics if the vector has been frozen.
  pub fn push(&self, value: T) {
    let mut guard = self.inner.lock();
    if guard.frozen {
      panic!("SharedVec: push after freeze");
    }
    guard.items.push(value);
  }

  /// Takes the underlying vector. One-shot.
  ///
  /// # Panics
  /// Panics if called twice.
  pub fn freeze(&self) -> Vec<T> {
    let mut guard = self.inner.lock();
    if guard.frozen {
      panic!("SharedVec: freeze called twice");
    }
    guard.frozen = true;
    mem::take(&mut guard.items)
  }
}

impl<T> Default for SharedVec<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// A concurrently writable map with a one-shot freeze. Keys need `Eq + Hash`.
///
/// Same discipline as [`SharedVec`]: write, freeze once, then read the
/// returned map single-threaded.
pub struct SharedMap<K: Eq + Hash, V> {
  inner: Mutex<Guarded<HashMap<K, V>>>,
}

impl<K: Eq + Hash, V> SharedMap<K, V> {
  pub fn new() -> Self {
    Self::with_capacity(0)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      inner: Mutex::new(Guarded {
        items: HashMap::with_capacity(capacity),
        frozen: false,
      }),
    }
  }

  /// # Panics
  /// Panics if the map has been frozen.
  pub fn insert(&self, key: K, value: V) {
    let mut guard = self.inner.lock();
    if guard.frozen {
      panic!("SharedMap: insert after freeze");
    }
    guard.items.insert(key, value);
  }

  /// Takes the underlying map. One-shot.
  ///
  /// # Panics
  /// Panics if called twice.
  pub fn freeze(&self) -> HashMap<K, V> {
    let mut guard = self.inner.lock();
    if guard.frozen {
      panic!("SharedMap: freeze called twice");
    }
    guard.frozen = true;
    mem::take(&mut guard.items)
  }
}

impl<K: Eq + Hash, V> Default for SharedMap<K, V> {
  fn default() -> Self {
    Self::new()
  }
}
