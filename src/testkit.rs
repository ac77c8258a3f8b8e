//! In-process stand-ins for upstream providers, used by tests and benches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ProviderError;
use crate::provider::Provider;

/// Serves whatever values the test last set. Quantities without a value
/// answer with an empty result; a down provider fails every request.
#[derive(Debug)]
pub struct StaticProvider {
    values: Mutex<HashMap<String, f64>>,
    healthy: AtomicBool,
    requests: Mutex<Vec<(String, Instant)>>,
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, quantity_id: &str, value: f64) {
        self.lock_values().insert(quantity_id.to_string(), value);
    }

    pub fn clear(&self, quantity_id: &str) {
        self.lock_values().remove(quantity_id);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Quantity ids and issue times of every fetch request so far.
    pub fn requests(&self) -> Vec<(String, Instant)> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_values(&self) -> std::sync::MutexGuard<'_, HashMap<String, f64>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn probe(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn fetch(&self, quantity_id: &str) -> Result<f64, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((quantity_id.to_string(), Instant::now()));

        if !self.healthy.load(Ordering::SeqCst) {
            return Err(ProviderError::Status(503));
        }
        self.lock_values()
            .get(quantity_id)
            .copied()
            .ok_or_else(|| ProviderError::Empty(quantity_id.to_string()))
    }
}
