//! Unbounded FIFO of pending commands

use shadow_shared::{
    now_ms, App, CodecError, CommandIdGenerator, CommandRequest, EncryptedChannel, RequestError,
    ShadowCommand,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Reasons a request never becomes a command
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] RequestError),

    #[error(transparent)]
    Decrypt(#[from] CodecError),

    #[error("command '{0}' is not in allowed_commands")]
    NotAllowed(String),

    #[error("command queue is closed")]
    Closed,
}

/// Allowed command types.
///
/// An entry matches the bare action (`like`) or `App:action`
/// (`Instagram:like`). Matching ignores case. An empty list allows everything.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    entries: Vec<String>,
}

impl Allowlist {
    pub fn new<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn permits(&self, app: App, action: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        let action = action.trim().to_ascii_lowercase();
        let qualified = format!("{}:{}", app.name().to_ascii_lowercase(), action);
        self.entries
            .iter()
            .any(|entry| *entry == action || *entry == qualified)
    }
}

struct Shared {
    depth: AtomicUsize,
    ids: CommandIdGenerator,
    allowlist: Allowlist,
}

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<ShadowCommand>,
    shared: Arc<Shared>,
}

/// Consumer side. Not cloneable, so there is only ever one.
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<ShadowCommand>,
    shared: Arc<Shared>,
}

/// Create a queue with the given allowlist
pub fn command_queue(allowlist: Allowlist) -> (CommandQueue, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        depth: AtomicUsize::new(0),
        ids: CommandIdGenerator::new(),
        allowlist,
    });

    (
        CommandQueue {
            tx,
            shared: shared.clone(),
        },
        QueueConsumer { rx, shared },
    )
}

impl CommandQueue {
    /// Validate a request, assign it an ID and enqueue it as `pending`
    pub fn submit(&self, request: CommandRequest) -> Result<String, SubmitError> {
        request.validate()?;

        let action = request.action.trim();
        if !self.shared.allowlist.permits(request.app, action) {
            return Err(SubmitError::NotAllowed(format!("{}:{}", request.app, action)));
        }

        let created_at = now_ms();
        let id = self
            .shared
            .ids
            .next_id(request.app, action, created_at / 1000);
        let command = ShadowCommand::from_request(id.clone(), request, created_at);

        self.shared.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(command).is_err() {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(SubmitError::Closed);
        }

        Ok(id)
    }

    /// Open an encrypted token and submit the request inside it
    pub fn submit_encrypted(
        &self,
        channel: &EncryptedChannel,
        token: &str,
    ) -> Result<String, SubmitError> {
        let request: CommandRequest = channel.decrypt(token)?;
        self.submit(request)
    }

    /// Commands waiting to be dispatched
    pub fn pending(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }
}

impl QueueConsumer {
    /// Next command in FIFO order; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<ShadowCommand> {
        let command = self.rx.recv().await?;
        self.shared.depth.fetch_sub(1, Ordering::SeqCst);
        Some(command)
    }

    /// Close the queue and drop whatever is still in it
    pub fn discard_remaining(&mut self) -> usize {
        self.rx.close();

        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            discarded += 1;
        }
        discarded
    }
}
