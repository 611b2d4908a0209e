//! In-memory source and sink for tests

use super::traits::{CommandSource, InboundCommand, ResultSink, TransportError};
use async_trait::async_trait;
use shadow_shared::ResultEnvelope;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Hands out scripted batches, then empty ones
#[derive(Clone, Default)]
pub struct MemorySource {
    batches: Arc<Mutex<VecDeque<Result<Vec<InboundCommand>, TransportError>>>>,
}

impl MemorySource {
    pub fn push(&self, batch: Result<Vec<InboundCommand>, TransportError>) {
        self.batches.lock().expect("source lock").push_back(batch);
    }

    pub fn remaining(&self) -> usize {
        self.batches.lock().expect("source lock").len()
    }
}

#[async_trait]
impl CommandSource for MemorySource {
    async fn fetch(&self) -> Result<Vec<InboundCommand>, TransportError> {
        self.batches
            .lock()
            .expect("source lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Records envelopes; can be told to fail the next N deliveries
#[derive(Clone, Default)]
pub struct MemorySink {
    delivered: Arc<Mutex<Vec<ResultEnvelope>>>,
    failures: Arc<Mutex<u32>>,
    attempts: Arc<Mutex<u32>>,
}

impl MemorySink {
    pub fn failing(times: u32) -> Self {
        let sink = Self::default();
        *sink.failures.lock().expect("sink lock") = times;
        sink
    }

    pub fn delivered(&self) -> Vec<ResultEnvelope> {
        self.delivered.lock().expect("sink lock").clone()
    }

    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().expect("sink lock")
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn deliver(&self, envelope: &ResultEnvelope) -> Result<(), TransportError> {
        *self.attempts.lock().expect("sink lock") += 1;

        let mut failures = self.failures.lock().expect("sink lock");
        if *failures > 0 {
            *failures -= 1;
            return Err(TransportError::Status { status: 502 });
        }
        drop(failures);

        self.delivered
            .lock()
            .expect("sink lock")
            .push(envelope.clone());
        Ok(())
    }
}
