//! Shared conversation log.
//!
//! One `SharedMemory` handle is cloned into every component that reads or
//! writes the conversation: the foreground agent, the scheduler's executor,
//! and the tool dispatch table. All access goes through the internal mutex,
//! so a foreground turn and a concurrently firing task cannot interleave
//! partial writes.

use crate::message::Message;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Condenses a message log into a persisted summary before the log is
/// truncated. See [`MemoryArchive`](crate::memory::MemoryArchive) for the
/// production implementation.
pub trait Summarizer: Send + Sync {
    fn save(&self, messages: Vec<Message>) -> BoxFuture<'_, crate::Result<()>>;
}

/// Ordered, append-mostly message log with interior locking.
///
/// Clones share the same log; the handle lives as long as the process.
#[derive(Clone)]
pub struct SharedMemory {
    log: Arc<Mutex<Vec<Message>>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl SharedMemory {
    /// A log that discards its contents on [`clear`](Self::clear).
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            summarizer: None,
        }
    }

    /// A log whose [`clear`](Self::clear) archives through `summarizer`
    /// first.
    pub fn with_summarizer(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            summarizer: Some(summarizer),
        }
    }

    pub fn append(&self, message: Message) {
        self.lock().push(message);
    }

    pub fn append_batch(&self, messages: Vec<Message>) {
        self.lock().extend(messages);
    }

    /// Replace the message at `index`. Out-of-range writes are silently
    /// dropped.
    pub fn overwrite(&self, index: usize, message: Message) {
        let mut log = self.lock();
        if let Some(slot) = log.get_mut(index) {
            *slot = message;
        }
    }

    /// Point-in-time copy of the whole log.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// The last `n` messages, oldest first. Empty for `n == 0`.
    pub fn last_n(&self, n: usize) -> Vec<Message> {
        let log = self.lock();
        let start = log.len().saturating_sub(n);
        log[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Summarize-and-archive the current log, then empty it.
    ///
    /// The summarizer receives exactly the messages buffered at the moment
    /// of the call; a summarizer failure is logged and the log is cleared
    /// anyway.
    pub async fn clear(&self) {
        let snapshot = self.snapshot();
        if let (Some(summarizer), false) = (&self.summarizer, snapshot.is_empty()) {
            if let Err(e) = summarizer.save(snapshot).await {
                warn!("memory archive failed, clearing anyway: {e}");
            }
        }
        let count = {
            let mut log = self.lock();
            let count = log.len();
            log.clear();
            count
        };
        info!("cleared {count} messages from shared memory");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}
