//! Long-running background tasks: the audit writer and the decay sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use citadel_db::{ClaimStore, RetryPolicy, with_retry};
use citadel_types::AuditEntry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::service::ClaimService;

/// Settings for [`spawn_audit_writer`].
#[derive(Debug, Clone, Copy)]
pub struct AuditWriterConfig {
    /// Flush as soon as this many entries are buffered.
    pub batch_size: usize,
    /// Flush whatever is buffered at least this often.
    pub flush_interval: Duration,
    /// Retry policy for each flush.
    pub retry: RetryPolicy,
}

/// Drain `rx` into `store` in batches until every sender is dropped.
///
/// The task resolves to the number of entries written. A batch that still
/// fails after retries is logged and dropped.
pub fn spawn_audit_writer(
    mut rx: mpsc::Receiver<AuditEntry>,
    store: Arc<dyn ClaimStore>,
    config: AuditWriterConfig,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let batch_size = config.batch_size.max(1);
        let mut buffer: Vec<AuditEntry> = Vec::with_capacity(batch_size);
        let mut ticker = tokio::time::interval(config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut written: u64 = 0;
        let retry = &config.retry;
        let store = store.as_ref();

        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(entry) = received else {
                        written = written.saturating_add(flush(store, retry, &mut buffer).await);
                        break;
                    };
                    buffer.push(entry);
                    if buffer.len() >= batch_size {
                        written = written.saturating_add(flush(store, retry, &mut buffer).await);
                    }
                }
                _ = ticker.tick() => {
                    written = written.saturating_add(flush(store, retry, &mut buffer).await);
                }
            }
        }

        tracing::info!(written, "Audit writer stopped");
        written
    })
}

async fn flush(store: &dyn ClaimStore, retry: &RetryPolicy, buffer: &mut Vec<AuditEntry>) -> u64 {
    if buffer.is_empty() {
        return 0;
    }
    let count = u64::try_from(buffer.len()).unwrap_or(u64::MAX);
    let batch: &[AuditEntry] = buffer;
    let result = with_retry(retry, "append_audit", || store.append_audit(batch)).await;
    buffer.clear();
    match result {
        Ok(()) => {
            tracing::debug!(count, "Audit batch flushed");
            count
        }
        Err(err) => {
            tracing::error!(dropped = count, error = %err, "Audit batch lost");
            0
        }
    }
}

/// Sweep decayed claims every `interval` until `shutdown` flips to `true`
/// or its sender is dropped. The first sweep runs immediately.
pub fn spawn_decay_sweeper(
    service: Arc<ClaimService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let evicted = service.sweep_decay(Utc::now()).await;
                    tracing::debug!(evicted = evicted.len(), "Decay sweep finished");
                }
            }
        }

        tracing::info!("Decay sweeper stopped");
    })
}
