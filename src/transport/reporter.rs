//! Result reporter - delivers finished command reports to the sink

use super::traits::ResultSink;
use shadow_shared::{CommandReport, ResultEnvelope};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct ResultReporter<K> {
    sink: K,
    max_retries: u32,
    retry_delay: Duration,
}

impl<K: ResultSink> ResultReporter<K> {
    pub fn new(sink: K, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            sink,
            max_retries,
            retry_delay,
        }
    }

    /// Deliver reports until the dispatcher drops its sender
    pub async fn run(self, mut reports: mpsc::UnboundedReceiver<CommandReport>) -> ReportStats {
        let mut stats = ReportStats::default();

        while let Some(report) = reports.recv().await {
            if self.deliver(report).await {
                stats.delivered += 1;
            } else {
                stats.dropped += 1;
            }
        }

        debug!("[REPORT] Stopped: {:?}", stats);
        stats
    }

    /// Up to `1 + max_retries` attempts. Failure leaves the command's local
    /// status untouched.
    pub async fn deliver(&self, report: CommandReport) -> bool {
        let envelope = ResultEnvelope::new(report);
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            match self.sink.deliver(&envelope).await {
                Ok(()) => {
                    debug!("[REPORT] Delivered {}", envelope.command_id);
                    return true;
                }
                Err(e) => {
                    warn!(
                        "[REPORT] Delivery of {} failed (attempt {}/{}): {}",
                        envelope.command_id, attempt, attempts, e
                    );
                    if attempt < attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        error!("[REPORT] Giving up on {}", envelope.command_id);
        false
    }
}
