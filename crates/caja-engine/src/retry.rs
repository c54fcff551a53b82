//! # Bounded Attempts
//!
//! Every engine operation runs through [`RetryPolicy::run`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1 ──► timeout(tx_timeout, attempt)                            │
//! │     │ Ok / business error ─────────────────────────► return            │
//! │     │ busy, pool exhausted, timed out                                  │
//! │     ▼                                                                   │
//! │  sleep(backoff) ──► attempt 2 ──► ... ──► attempt 1 + max_retries      │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                                   EngineError::Unavailable              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An attempt that times out is dropped mid-flight. Dropping an open
//! transaction rolls it back, so a retry always starts from clean state.
//!
//! Writers go through [`RetryPolicy::run_tx`] instead: the attempt hands its
//! open transaction back and COMMIT runs after the deadline check, bounded
//! by the database busy timeout. A deadline can only discard work that was
//! never committed, so a timed-out write is never applied twice.
//!
//! ```text
//!  run_tx:  timeout( BEGIN … checks … writes ) ──► COMMIT ──► Ok
//!                 │ elapsed                          │ busy
//!                 ▼                                  ▼
//!            drop → ROLLBACK                    drop → ROLLBACK
//!                 └──────────── retry ◄──────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use caja_db::DbError;
use sqlx::{Sqlite, Transaction};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// An open write transaction handed back to [`RetryPolicy::run_tx`].
pub type Tx = Transaction<'static, Sqlite>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        self.retry(operation, || self.bounded(operation, attempt())).await
    }

    /// Like [`RetryPolicy::run`] for writes: `attempt` returns its open
    /// transaction and the policy commits it outside the deadline.
    pub async fn run_tx<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<(Tx, T)>>,
    {
        self.retry(operation, || {
            let pending = attempt();
            async move {
                let (tx, value) = self.bounded(operation, pending).await?;
                tx.commit().await.map_err(DbError::from)?;
                Ok(value)
            }
        })
        .await
    }

    async fn bounded<T, Fut>(&self, operation: &'static str, pending: Fut) -> EngineResult<T>
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        match timeout(self.timeout, pending).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                operation,
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match attempt().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation, attempts, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    if attempts > self.max_retries {
                        warn!(operation, attempts, error = %err, "Giving up");
                        return Err(EngineError::Unavailable {
                            operation,
                            attempts,
                            last_error: err.to_string(),
                        });
                    }

                    let wait = backoff.next_backoff().unwrap_or(self.max_backoff);
                    warn!(operation, attempt = attempts, ?wait, error = %err, "Retrying");
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
