//! RateLimiter implementation

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use eyre::Result;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::config::LimiterConfig;

/// A deferred outbound operation
type SendOp = BoxFuture<'static, Result<()>>;

/// Counters and queue, one mutual-exclusion domain per limiter
///
/// `respond`/`delete` admissions and the maintenance drain all
/// read-modify-write this state; serializing them is what keeps two
/// concurrent admissions from both seeing spare budget.
struct LimiterInner {
    sent_in_window: u32,
    total_sent: u64,
    queue: VecDeque<SendOp>,
}

/// Snapshot of limiter counters for logging and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    pub sent_in_window: u32,
    pub queued: usize,
    pub total_sent: u64,
}

/// Windowed admission control for one connection's outbound operations
///
/// Operations inside the window budget run immediately; overflow queues FIFO
/// and is released in a burst of up to `limit` entries at each window
/// boundary. Queuing preserves delivery instead of dropping replies, at the
/// cost of bounded latency for overflow traffic.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            limit: config.messages_per_window,
            window: config.window(),
            inner: Mutex::new(LimiterInner {
                sent_in_window: 0,
                total_sent: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Send a reply now if the window has budget, otherwise queue it
    ///
    /// Returns once the operation has executed or been queued - not once a
    /// queued message is actually delivered.
    pub async fn respond<F>(&self, op: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.admit(Box::pin(op), "respond").await
    }

    /// Same admission policy for a message-removal operation
    pub async fn delete<F>(&self, op: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.admit(Box::pin(op), "delete").await
    }

    async fn admit(&self, op: SendOp, kind: &'static str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.sent_in_window < self.limit {
            inner.sent_in_window += 1;
            inner.total_sent += 1;
            drop(inner);
            op.await
        } else {
            inner.queue.push_back(op);
            debug!(kind, queued = inner.queue.len(), "window budget exhausted, queued");
            Ok(())
        }
    }

    /// Maintenance loop: open a fresh window and drain deferred operations
    ///
    /// Every `window`: the counter resets and up to `limit` queued entries
    /// are taken FIFO in the same critical section, so the new window starts
    /// with exactly the residual budget the drain leaves. The batch then
    /// executes serially, each operation awaited before the next, preserving
    /// queue order on the wire. Never terminates on its own - the registry
    /// cancels it when the owning connection is torn down.
    pub async fn periodic_check(&self) -> Result<()> {
        loop {
            sleep(self.window).await;

            let batch = {
                let mut inner = self.inner.lock().await;
                let take = (self.limit as usize).min(inner.queue.len());
                let batch: Vec<SendOp> = inner.queue.drain(..take).collect();
                inner.sent_in_window = batch.len() as u32;
                inner.total_sent += batch.len() as u64;
                batch
            };

            if !batch.is_empty() {
                debug!(count = batch.len(), "draining deferred operations");
            }
            for op in batch {
                if let Err(error) = op.await {
                    warn!(%error, "deferred operation failed");
                }
            }
        }
    }

    pub async fn stats(&self) -> LimiterStats {
        let inner = self.inner.lock().await;
        LimiterStats {
            sent_in_window: inner.sent_in_window,
            queued: inner.queue.len(),
            total_sent: inner.total_sent,
        }
    }
}
