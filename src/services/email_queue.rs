use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};

use super::email::{Mailer, OutgoingEmail};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Fire-and-forget delivery: `send` only enqueues, a background worker
/// delivers through the inner mailer and retries with exponential backoff.
#[derive(Clone)]
pub struct EmailQueue {
    tx: mpsc::UnboundedSender<OutgoingEmail>,
}

impl EmailQueue {
    pub fn start(inner: Arc<dyn Mailer>, policy: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, inner, policy));
        (Self { tx }, worker)
    }
}

#[async_trait]
impl Mailer for EmailQueue {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        self.tx
            .send(email.clone())
            .map_err(|_| anyhow::anyhow!("email queue worker has stopped"))
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<OutgoingEmail>,
    inner: Arc<dyn Mailer>,
    policy: RetryPolicy,
) {
    let mut job_id: u64 = 0;
    while let Some(email) = rx.recv().await {
        job_id += 1;
        // One task per job so a message in backoff does not hold up the rest.
        tokio::spawn(deliver(job_id, email, inner.clone(), policy));
    }
    tracing::info!("email queue closed");
}

async fn deliver(job_id: u64, email: OutgoingEmail, mailer: Arc<dyn Mailer>, policy: RetryPolicy) {
    for attempt in 1..=policy.max_attempts {
        match mailer.send(&email).await {
            Ok(()) => {
                tracing::info!(job_id, attempt, to = %email.to, "email job completed");
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(job_id, attempt, error = %e, ?delay, "email job failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(job_id, attempt, to = %email.to, error = %e, "email job failed");
            }
        }
    }
}
