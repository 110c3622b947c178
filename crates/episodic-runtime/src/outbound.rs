use std::time::Duration;

use tokio_util::sync::CancellationToken;

use episodic_core::config::OutboundConfig;
use episodic_core::models::{OutboundFlagRecord, QueuedFlagRecord};

use crate::db::DbHandle;
use crate::traits::{OutboundQueue, TrackingAccess};
use crate::TaskError;

impl OutboundQueue for DbHandle {
    async fn enqueue(&self, record: OutboundFlagRecord) -> Result<i64, TaskError> {
        Ok(self.enqueue_outbound(record).await?)
    }

    async fn peek(&self) -> Result<Option<QueuedFlagRecord>, TaskError> {
        Ok(self.peek_outbound().await?)
    }

    async fn remove(&self, id: i64) -> Result<(), TaskError> {
        Ok(self.remove_outbound(id).await?)
    }

    async fn record_attempt(&self, id: i64) -> Result<u32, TaskError> {
        Ok(self.record_outbound_attempt(id).await?)
    }

    async fn park(&self, id: i64, reason: &str) -> Result<(), TaskError> {
        Ok(self.park_outbound(id, reason).await?)
    }
}

/// Exponential backoff for transient submission failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay after the `attempts`-th failed submission: `base * 2^(attempts - 1)`,
    /// capped at `max`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempts.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl From<&OutboundConfig> for RetryPolicy {
    fn from(config: &OutboundConfig) -> Self {
        Self {
            base: Duration::from_secs(config.retry_base_secs),
            max: Duration::from_secs(config.retry_max_secs),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub submitted: usize,
    /// Records moved out of the live queue because they cannot be delivered.
    pub parked: usize,
}

/// Single consumer of the outbound queue. Replays records oldest first and
/// removes a record only after trakt accepted it.
pub struct OutboundReplayer<T, Q> {
    tracking: T,
    queue: Q,
    policy: RetryPolicy,
}

impl<T: TrackingAccess, Q: OutboundQueue> OutboundReplayer<T, Q> {
    pub fn new(tracking: T, queue: Q, policy: RetryPolicy) -> Self {
        Self {
            tracking,
            queue,
            policy,
        }
    }

    /// Drain the queue.
    ///
    /// Stops with [`TaskError::RemoteAuth`] when the credentials are rejected,
    /// with [`TaskError::Offline`] when trakt cannot be reached, and with
    /// [`TaskError::Cancelled`] when `cancel` fires. Records stay queued in all
    /// three cases. A record trakt refuses, or one that keeps failing for
    /// `max_attempts`, is parked rather than deleted.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ReplaySummary, TaskError> {
        let mut summary = ReplaySummary::default();

        loop {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            let Some(head) = self.queue.peek().await? else {
                break;
            };

            match self.tracking.submit(&head.record).await {
                Ok(()) => {
                    self.queue.remove(head.id).await?;
                    summary.submitted += 1;
                    tracing::debug!(id = head.id, show_id = head.record.show_id, "Replayed flag change");
                }
                Err(TaskError::RemoteAuth) => {
                    tracing::warn!(id = head.id, "trakt rejected credentials, pausing replay");
                    return Err(TaskError::RemoteAuth);
                }
                Err(TaskError::Offline) => {
                    tracing::info!(id = head.id, "trakt unreachable, pausing replay");
                    return Err(TaskError::Offline);
                }
                Err(TaskError::RemoteRejected(reason)) => {
                    self.park(&head, &format!("rejected by trakt: {reason}")).await?;
                    summary.parked += 1;
                }
                Err(e) => {
                    let attempts = self.queue.record_attempt(head.id).await?;
                    if attempts >= self.policy.max_attempts {
                        self.park(&head, &format!("gave up after {attempts} attempts: {e}"))
                            .await?;
                        summary.parked += 1;
                        continue;
                    }

                    let delay = self.policy.backoff(attempts);
                    tracing::warn!(id = head.id, attempts, ?delay, error = %e, "Flag change failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if summary != ReplaySummary::default() {
            tracing::info!(
                submitted = summary.submitted,
                parked = summary.parked,
                "Outbound queue drained"
            );
        }
        Ok(summary)
    }

    async fn park(&self, head: &QueuedFlagRecord, reason: &str) -> Result<(), TaskError> {
        tracing::warn!(
            id = head.id,
            show_id = head.record.show_id,
            action = ?head.record.action,
            queued_at = %head.created_at,
            reason,
            "Parking flag change"
        );
        self.queue.park(head.id, reason).await
    }
}
