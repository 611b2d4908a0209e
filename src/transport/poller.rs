//! Inbound poller - moves remote commands into the queue

use super::traits::{CommandSource, InboundCommand};
use crate::dispatch::{CommandQueue, SubmitError};
use crate::shutdown::ShutdownSignal;
use shadow_shared::{CommandRequest, EncryptedChannel};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Tally of what one batch produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub queued: usize,
    pub rejected: usize,
    pub undecryptable: usize,
}

pub struct Poller<C> {
    source: C,
    queue: CommandQueue,
    channel: Arc<EncryptedChannel>,
    interval: Duration,
    backoff: Duration,
}

impl<C: CommandSource> Poller<C> {
    pub fn new(
        source: C,
        queue: CommandQueue,
        channel: Arc<EncryptedChannel>,
        interval: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            source,
            queue,
            channel,
            interval,
            backoff,
        }
    }

    /// Poll until shutdown. A failed fetch waits `backoff` instead of `interval`.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!("[POLL] Polling {} every {:?}", self.source.name(), self.interval);

        loop {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                fetched = self.source.fetch() => fetched,
            };

            let delay = match fetched {
                Ok(items) => {
                    if !items.is_empty() {
                        let stats = self.ingest(items);
                        debug!("[POLL] {:?}", stats);
                    }
                    self.interval
                }
                Err(e) => {
                    warn!("[POLL] Fetch from {} failed: {}", self.source.name(), e);
                    self.backoff
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("[POLL] Stopped");
    }

    /// Submit every item of a batch. Bad items are dropped one by one.
    pub fn ingest(&self, items: Vec<InboundCommand>) -> IngestStats {
        let mut stats = IngestStats::default();

        for item in items {
            let submitted = match item {
                InboundCommand::Encrypted { encrypted } => {
                    self.queue.submit_encrypted(&self.channel, &encrypted)
                }
                InboundCommand::Plain(value) => CommandRequest::from_json(value)
                    .map_err(SubmitError::from)
                    .and_then(|request| self.queue.submit(request)),
            };

            match submitted {
                Ok(id) => {
                    debug!("[POLL] Queued {}", id);
                    stats.queued += 1;
                }
                // CodecError never carries plaintext or token content
                Err(SubmitError::Decrypt(e)) => {
                    warn!("[POLL] Dropped encrypted command: {}", e);
                    stats.undecryptable += 1;
                }
                Err(e) => {
                    warn!("[POLL] Rejected command: {}", e);
                    stats.rejected += 1;
                }
            }
        }

        stats
    }
}
