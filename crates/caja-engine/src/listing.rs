//! Lazy listings with the engine's timeout and retry bounds.
//!
//! Wraps a [`caja_db::Pager`]. A failed page fetch does not move the
//! cursor, so the same page is simply fetched again.

use backoff::backoff::Backoff;
use caja_db::{PageCursor, PageSource, Pager};
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;

pub struct Listing<S: PageSource> {
    pager: Pager<S>,
    policy: RetryPolicy,
    operation: &'static str,
}

impl<S: PageSource> Listing<S> {
    pub(crate) fn new(pager: Pager<S>, policy: RetryPolicy, operation: &'static str) -> Self {
        Listing {
            pager,
            policy,
            operation,
        }
    }

    /// Next item, or `None` when the listing is exhausted.
    pub async fn next(&mut self) -> EngineResult<Option<S::Item>> {
        let mut backoff = backoff::ExponentialBackoff {
            initial_interval: self.policy.initial_backoff,
            max_interval: self.policy.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let outcome = match timeout(self.policy.timeout, self.pager.next()).await {
                Ok(result) => result.map_err(EngineError::from),
                Err(_) => Err(EngineError::Timeout {
                    operation: self.operation,
                    after_ms: self.policy.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(item) => return Ok(item),
                Err(err) if err.is_retryable() && attempts <= self.policy.max_retries => {
                    let wait = backoff.next_backoff().unwrap_or(self.policy.max_backoff);
                    warn!(operation = self.operation, attempt = attempts, error = %err, "Retrying page");
                    sleep(wait).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(EngineError::Unavailable {
                        operation: self.operation,
                        attempts,
                        last_error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Drains what is left of the listing.
    pub async fn collect_remaining(&mut self) -> EngineResult<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Position after the last yielded item; pass it to the matching
    /// `*_after` call to resume later.
    pub fn cursor(&self) -> Option<&PageCursor> {
        self.pager.cursor()
    }

    pub fn restart(&mut self) {
        self.pager.restart();
    }
}
