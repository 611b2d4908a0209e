//! Transport to the remote command API
//!
//! - [`CommandSource`] / [`ResultSink`]: the two seams the engine consumes
//! - [`HttpBridge`]: bearer-token HTTP implementation of both
//! - [`Poller`]: fetch loop feeding the command queue
//! - [`ResultReporter`]: delivery of finished reports with bounded retries

pub mod http;
#[cfg(test)]
pub mod memory;
pub mod poller;
pub mod reporter;
pub mod traits;

pub use http::HttpBridge;
pub use poller::Poller;
pub use reporter::{ReportStats, ResultReporter};
pub use traits::{CommandSource, InboundCommand, ResultSink, TransportError};
