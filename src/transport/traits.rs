//! Remote command source and result sink abstractions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shadow_shared::ResultEnvelope;
use thiserror::Error;

/// Poll or report call failures. Never fatal to the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected status {status}")]
    Status { status: u16 },

    #[error("bad response body: {0}")]
    Body(String),
}

/// One item from the remote command queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundCommand {
    /// Sealed request token
    Encrypted { encrypted: String },
    /// Plaintext request object
    Plain(serde_json::Value),
}

/// Where new commands come from
#[async_trait]
pub trait CommandSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<InboundCommand>, TransportError>;

    /// Human-readable name for this source
    fn name(&self) -> &'static str;
}

/// Where finished command reports go
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, envelope: &ResultEnvelope) -> Result<(), TransportError>;
}
