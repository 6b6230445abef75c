//! A Tokio-based structured concurrency toolkit: bounded worker pools,
//! orchestration combinators, and a manager-driven dynamic scheduler with
//! cooperative cancellation.
//!
//! The substrate is [`start`]: a fixed-width pool draining an input channel
//! and publishing one [`TaskOutcome`] per input, with panics captured as
//! faults at the pool boundary. [`manage_tasks`] drives that pool with a FIFO
//! frontier a serial manager function may grow, and the fixed-arity
//! combinators ([`run_all`], [`try_all`], [`race`], [`for_each`], [`try_map`])
//! layer cancellation and error-aggregation policies on the same substrate.

mod batch;
mod collect;
mod error;
mod group;
mod manage;
mod outcome;
mod pool;
mod scope;
mod task;

pub use batch::{for_each, try_map};
pub use collect::{SharedMap, SharedVec};
pub use error::{ErrorList, FaultPayload, PoolError};
pub use group::{race, run_all, try_all};
pub use manage::manage_tasks;
pub use outcome::TaskOutcome;
pub use pool::{start, PoolInput, PoolOutput};
pub use scope::CancelScope;
pub use task::{BoxFuture, CancelTask, GroupTask};

pub use tokio_util::sync::CancellationToken;
