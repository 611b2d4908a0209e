//! Command queue and the single-consumer dispatcher
//!
//! The queue serializes bursts of incoming commands onto the one device
//! input stream. Only [`QueueConsumer`] can take commands out, and it is
//! owned by exactly one [`Dispatcher`].

mod dispatcher;
mod queue;

pub use dispatcher::{DispatchConfig, DispatchStats, Dispatcher};
pub use queue::{command_queue, Allowlist, CommandQueue, QueueConsumer, SubmitError};
