use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use crate::config::{FailureKind, RetryPolicy};
use crate::logging;
use crate::model::Quantity;
use crate::provider::Provider;

/// Fetches single quantities from one provider, keeping every request at
/// least `min_spacing` apart and retrying failures with backoff.
///
/// One fetcher per provider: all quantities served by the provider must go
/// through the same instance so they share the spacing clock.
pub struct RateLimitedFetcher {
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedFetcher {
    pub fn new(provider: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            last_request: Mutex::new(None),
        }
    }

    /// Returns `None` once all attempts are used up; callers treat that as a
    /// normal outcome.
    pub async fn fetch(&self, quantity: &Quantity) -> Option<f64> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            self.wait_for_slot().await;

            let err = match self.provider.fetch(&quantity.id).await {
                Ok(value) => return Some(value),
                Err(err) => err,
            };

            logging::warn(
                "fetch.failed",
                "Quantity fetch attempt failed",
                json!({
                    "provider": self.provider.name(),
                    "quantity": quantity.label,
                    "attempt": attempt,
                    "max_attempts": max_attempts,
                    "error": err.to_string(),
                }),
            );

            if attempt == max_attempts {
                break;
            }

            let kind = if self.provider.probe().await {
                FailureKind::Transient
            } else {
                FailureKind::ProviderDown
            };
            let delay = self.policy.delay(attempt, kind);
            logging::info(
                "fetch.retry",
                match kind {
                    FailureKind::Transient => "Backing off before next attempt",
                    FailureKind::ProviderDown => "Provider unreachable, cooling down",
                },
                json!({
                    "provider": self.provider.name(),
                    "quantity": quantity.label,
                    "delay_secs": delay.as_secs(),
                }),
            );
            time::sleep(delay).await;
        }

        logging::warn(
            "fetch.exhausted",
            "Giving up on quantity for this cycle",
            json!({
                "provider": self.provider.name(),
                "quantity": quantity.label,
            }),
        );
        None
    }

    async fn wait_for_slot(&self) {
        // Held across the sleep so concurrent callers queue behind each other.
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.policy.min_spacing;
            if Instant::now() < ready_at {
                time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
