//! Bounded polling of audit jobs.
//!
//! Status is checked after an initial interval, then with exponential
//! backoff up to a cap. Polling stops on:
//! - `completed` (the report is fetched once, right after),
//! - `error` (no report fetch),
//! - the attempt or elapsed-time ceiling (`TimedOut`),
//! - too many consecutive transport failures (`Unreachable`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PollConfig;
use crate::errors::AppError;
use crate::models::audit::{is_valid_transition, AuditReport, AuditStatus};
use crate::services::audit_client::AuditClient;

/// The two calls the poller needs from the audit API.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    async fn poll_status(&self, audit_id: &str) -> Result<AuditStatus, AppError>;
    async fn fetch_report(&self, audit_id: &str) -> Result<Option<AuditReport>, AppError>;
}

#[async_trait]
impl AuditBackend for AuditClient {
    async fn poll_status(&self, audit_id: &str) -> Result<AuditStatus, AppError> {
        AuditClient::poll_status(self, audit_id).await
    }

    async fn fetch_report(&self, audit_id: &str) -> Result<Option<AuditReport>, AppError> {
        AuditClient::fetch_report(self, audit_id).await
    }
}

/// How a poll ended.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Completed { report: Box<AuditReport> },
    /// The audit backend reported the job as failed.
    Failed,
    TimedOut { attempts: u32, elapsed_secs: u64 },
    /// Transport failures exceeded the consecutive-failure limit.
    Unreachable { reason: String },
}

/// Exponential delay sequence capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    /// A non-finite or sub-1 multiplier is treated as 1 (a fixed interval).
    pub fn new(policy: &PollConfig) -> Self {
        let multiplier = if policy.multiplier.is_finite() {
            policy.multiplier.max(1.0)
        } else {
            1.0
        };
        Self {
            next: policy.initial_interval,
            max: policy.max_interval.max(policy.initial_interval),
            multiplier,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));
        current
    }
}

/// Poll until the audit reaches a terminal state or a ceiling is hit.
pub async fn poll_until_done<B>(
    backend: &B,
    audit_id: &str,
    policy: &PollConfig,
) -> Result<PollOutcome, AppError>
where
    B: AuditBackend + ?Sized,
{
    poll_with_observer(backend, audit_id, policy, |_, _| {}).await
}

/// Like [`poll_until_done`], calling `observe(attempt, status)` after every
/// successful status check.
pub async fn poll_with_observer<B, F>(
    backend: &B,
    audit_id: &str,
    policy: &PollConfig,
    mut observe: F,
) -> Result<PollOutcome, AppError>
where
    B: AuditBackend + ?Sized,
    F: FnMut(u32, AuditStatus) + Send,
{
    let started = Instant::now();
    let mut backoff = Backoff::new(policy);
    let mut attempts: u32 = 0;
    let mut consecutive_failures: u32 = 0;
    let mut last_status: Option<AuditStatus> = None;

    loop {
        tokio::time::sleep(backoff.next_delay()).await;
        attempts += 1;

        let step = match backend.poll_status(audit_id).await {
            Ok(status) => {
                if let Some(previous) = last_status {
                    if !is_valid_transition(previous, status) {
                        return Err(AppError::InvalidTransition(format!(
                            "audit {audit_id} went from {previous} to {status}"
                        )));
                    }
                }
                last_status = Some(status);
                observe(attempts, status);

                match status {
                    AuditStatus::Pending => Ok(None),
                    AuditStatus::Error => {
                        tracing::info!(audit_id = %audit_id, attempts, "Audit failed");
                        return Ok(PollOutcome::Failed);
                    }
                    AuditStatus::Completed => backend.fetch_report(audit_id).await,
                }
            }
            Err(e) => Err(e),
        };

        match step {
            Ok(Some(report)) => {
                tracing::info!(audit_id = %audit_id, attempts, "Audit completed");
                return Ok(PollOutcome::Completed {
                    report: Box::new(report),
                });
            }
            Ok(None) => consecutive_failures = 0,
            Err(e) if e.is_transient() => {
                consecutive_failures += 1;
                tracing::warn!(
                    audit_id = %audit_id,
                    attempts,
                    consecutive_failures,
                    error = %e,
                    "Audit poll failed"
                );
                if consecutive_failures >= policy.max_transport_failures.max(1) {
                    return Ok(PollOutcome::Unreachable {
                        reason: e.to_string(),
                    });
                }
            }
            Err(e) => return Err(e),
        }

        let elapsed = started.elapsed();
        if attempts >= policy.max_attempts || elapsed >= policy.max_elapsed {
            tracing::warn!(audit_id = %audit_id, attempts, ?elapsed, "Audit polling timed out");
            return Ok(PollOutcome::TimedOut {
                attempts,
                elapsed_secs: elapsed.as_secs(),
            });
        }
    }
}

/// A poll running on its own task.
///
/// Dropping the handle (or calling [`PollHandle::cancel`]) aborts the task,
/// including a request that is still in flight.
pub struct PollHandle {
    audit_id: String,
    task: JoinHandle<Result<PollOutcome, AppError>>,
}

impl PollHandle {
    pub fn spawn(backend: Arc<dyn AuditBackend>, audit_id: String, policy: PollConfig) -> Self {
        Self::spawn_with_observer(backend, audit_id, policy, |_, _| {})
    }

    /// Spawn a poll that reports every status it sees to `observe`.
    pub fn spawn_with_observer<F>(
        backend: Arc<dyn AuditBackend>,
        audit_id: String,
        policy: PollConfig,
        observe: F,
    ) -> Self
    where
        F: FnMut(u32, AuditStatus) + Send + 'static,
    {
        let id = audit_id.clone();
        let task = tokio::spawn(async move {
            poll_with_observer(backend.as_ref(), &id, &policy, observe).await
        });
        Self { audit_id, task }
    }

    pub fn audit_id(&self) -> &str {
        &self.audit_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        tracing::debug!(audit_id = %self.audit_id, "Audit poll cancelled");
        // Drop aborts.
    }

    /// Wait for the poll to finish. Call at most once to completion.
    pub async fn wait(&mut self) -> Result<PollOutcome, AppError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(AppError::Internal("audit poll was cancelled".to_string())),
            Err(e) => Err(AppError::Internal(format!("audit poll task failed: {e}"))),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
