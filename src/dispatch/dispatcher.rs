//! Dispatcher - the one loop that talks to the device

use super::queue::QueueConsumer;
use crate::command::ActionRouter;
use crate::device::DeviceSession;
use crate::shutdown::ShutdownSignal;
use shadow_shared::{now_ms, timing, CommandReport, ShadowCommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Log each command's start and finish at INFO instead of DEBUG
    pub log_commands: bool,
    /// Pause after the device drops out from under a command
    pub loop_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            log_commands: true,
            loop_backoff: Duration::from_secs(timing::LOOP_BACKOFF_SECS),
        }
    }
}

/// Counters returned when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub completed: usize,
    pub failed: usize,
    /// Commands still queued at shutdown
    pub discarded: usize,
}

enum Outcome {
    Done,
    ConnectionLost,
}

/// Pulls commands one at a time and runs them to a terminal status
pub struct Dispatcher<S> {
    router: ActionRouter<S>,
    reports: mpsc::UnboundedSender<CommandReport>,
    config: DispatchConfig,
    link: Option<Arc<AtomicBool>>,
}

impl<S: DeviceSession> Dispatcher<S> {
    pub fn new(
        router: ActionRouter<S>,
        reports: mpsc::UnboundedSender<CommandReport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            router,
            reports,
            config,
            link: None,
        }
    }

    /// Flag cleared on connection loss and set again after a command finishes
    /// without one
    pub fn with_link_flag(mut self, link: Arc<AtomicBool>) -> Self {
        self.link = Some(link);
        self
    }

    /// Run until shutdown or until every producer is gone.
    ///
    /// A command already executing when shutdown fires is finished first;
    /// whatever is still queued afterwards is discarded.
    pub async fn run(mut self, mut queue: QueueConsumer, mut shutdown: ShutdownSignal) -> DispatchStats {
        let mut stats = DispatchStats::default();
        info!("[DISPATCH] Loop started");

        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                next = queue.recv() => match next {
                    Some(command) => command,
                    None => break,
                },
            };

            match self.process(command, &mut stats).await {
                Outcome::Done => self.router.cool_down().await,
                Outcome::ConnectionLost => {
                    warn!(
                        "[DISPATCH] Device connection lost, backing off {:?}",
                        self.config.loop_backoff
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.wait() => break,
                        _ = sleep(self.config.loop_backoff) => {}
                    }
                }
            }
        }

        stats.discarded = queue.discard_remaining();
        if stats.discarded > 0 {
            warn!("[DISPATCH] Discarded {} queued command(s)", stats.discarded);
        }
        info!(
            "[DISPATCH] Loop stopped: {} completed, {} failed",
            stats.completed, stats.failed
        );
        stats
    }

    async fn process(&mut self, mut command: ShadowCommand, stats: &mut DispatchStats) -> Outcome {
        if let Err(e) = command.start(now_ms()) {
            error!("[DISPATCH] {} not startable: {}", command.id, e);
            return Outcome::Done;
        }

        if self.config.log_commands {
            info!("[DISPATCH] {} running: {} {}", command.id, command.app, command.action);
        } else {
            debug!("[DISPATCH] {} running: {} {}", command.id, command.app, command.action);
        }

        let mut outcome = Outcome::Done;
        let transition = match self.router.execute(&command).await {
            Ok(result) => {
                stats.completed += 1;
                if self.config.log_commands {
                    info!("[DISPATCH] {} completed: {}", command.id, result);
                } else {
                    debug!("[DISPATCH] {} completed: {}", command.id, result);
                }
                command.complete(result)
            }
            Err(e) => {
                stats.failed += 1;
                warn!("[DISPATCH] {} failed: {}", command.id, e);
                if e.is_connection_loss() {
                    outcome = Outcome::ConnectionLost;
                }
                command.fail(e.to_string())
            }
        };

        if let Some(link) = &self.link {
            link.store(matches!(outcome, Outcome::Done), Ordering::Relaxed);
        }

        if let Err(e) = transition {
            error!("[DISPATCH] {} lifecycle error: {}", command.id, e);
        }

        if let Some(report) = command.report() {
            if self.reports.send(report).is_err() {
                debug!("[DISPATCH] Reporter gone, {} kept locally", command.id);
            }
        }

        outcome
    }
}
