use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::config::FamilyConfig;
use crate::error::CycleError;
use crate::ledger::{AppendOutcome, LedgerWriter, VersionedStore};
use crate::logging;
use crate::model::Sample;
use crate::pipeline::{is_novel, RateLimitedFetcher, SampleAggregator};
use crate::provider::Provider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    None,
    Requested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Persisted { rows: usize },
    /// The ledger already ended with this sample.
    AlreadyRecorded,
    /// The last ledger row is newer than the clock; nothing was written.
    Deferred,
    Unchanged,
}

/// Drives one indicator family: probe, aggregate, filter, append, on a fixed
/// cadence. Owns the last accepted sample; nothing else does.
pub struct Monitor {
    family: String,
    poll_interval: Duration,
    provider: Arc<dyn Provider>,
    aggregator: SampleAggregator,
    writer: LedgerWriter,
    last_accepted: Option<Sample>,
    state: MonitorState,
}

impl Monitor {
    pub fn new(
        config: &FamilyConfig,
        provider: Arc<dyn Provider>,
        store: Arc<dyn VersionedStore>,
    ) -> Self {
        let fetcher = Arc::new(RateLimitedFetcher::new(
            Arc::clone(&provider),
            config.retry.clone(),
        ));
        let aggregator = SampleAggregator::new(fetcher, config.quantities.clone());

        let mut writer = LedgerWriter::new(
            store,
            config.name.clone(),
            config.ledger_path.clone(),
            config.labels(),
        )
        .with_conflict_retries(config.conflict_retries);
        if let Some(cache_path) = config.cache_path() {
            writer = writer.with_cache(cache_path);
        }

        Self {
            family: config.name.clone(),
            poll_interval: config.poll_interval,
            provider,
            aggregator,
            writer,
            last_accepted: None,
            state: MonitorState::Running,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn last_accepted(&self) -> Option<&Sample> {
        self.last_accepted.as_ref()
    }

    /// One full pass through the pipeline. Errors describe why nothing was
    /// written; they never leave the monitor in a broken state.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let sample = self.collect().await?;
        self.persist(sample).await
    }

    /// Runs cycles until shutdown is requested. A shutdown during probing or
    /// fetching abandons the cycle; a ledger write in progress completes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<ShutdownSignal>) -> MonitorState {
        logging::info(
            "monitor.start",
            "Indicator monitor started",
            json!({
                "family": self.family,
                "ledger": self.writer.path(),
                "interval_secs": self.poll_interval.as_secs(),
                "quantities": self
                    .aggregator
                    .quantities()
                    .iter()
                    .map(|q| q.to_string())
                    .collect::<Vec<_>>(),
            }),
        );

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            let collected = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                result = self.collect() => result,
            };

            let outcome = match collected {
                Ok(sample) => self.persist(sample).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                logging::warn(
                    err.event(),
                    "Cycle skipped",
                    json!({ "family": self.family, "error": err.to_string() }),
                );
            }
        }

        self.state = MonitorState::Stopped;
        logging::info(
            "monitor.stop",
            "Indicator monitor stopped",
            json!({ "family": self.family }),
        );
        self.state
    }

    async fn collect(&self) -> Result<Sample, CycleError> {
        if !self.provider.probe().await {
            return Err(CycleError::ProviderUnavailable {
                provider: self.provider.name().to_string(),
            });
        }
        self.aggregator.aggregate().await
    }

    async fn persist(&mut self, sample: Sample) -> Result<CycleOutcome, CycleError> {
        if !is_novel(&sample, self.last_accepted.as_ref()) {
            logging::info(
                "cycle.idle",
                "No change since last accepted sample",
                json!({ "family": self.family }),
            );
            return Ok(CycleOutcome::Unchanged);
        }

        let outcome = match self.writer.append(&sample).await? {
            AppendOutcome::Written { revision, rows } => {
                logging::info(
                    "ledger.written",
                    "Sample appended to ledger",
                    json!({
                        "family": self.family,
                        "revision": revision.0,
                        "rows": rows,
                        "sample": sample.to_metadata(),
                    }),
                );
                CycleOutcome::Persisted { rows }
            }
            AppendOutcome::Skipped => {
                logging::info(
                    "ledger.skipped",
                    "Ledger already ends with this sample",
                    json!({ "family": self.family }),
                );
                CycleOutcome::AlreadyRecorded
            }
            AppendOutcome::Behind { last } => {
                logging::warn(
                    "ledger.behind",
                    "Last ledger row is newer than the clock, waiting for it to pass",
                    json!({
                        "family": self.family,
                        "last_row": last,
                        "sample": sample.timestamp_text(),
                    }),
                );
                return Ok(CycleOutcome::Deferred);
            }
        };

        self.last_accepted = Some(sample);
        Ok(outcome)
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<ShutdownSignal>) {
    loop {
        if *shutdown.borrow_and_update() != ShutdownSignal::None {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::FamilyConfig;
    use crate::error::StoreError;
    use crate::ledger::{MemoryStore, Revision, Snapshot};
    use crate::testkit::StaticProvider;

    struct BrokenStore;

    #[async_trait]
    impl VersionedStore for BrokenStore {
        async fn read(&self, _path: &str) -> Result<Option<Snapshot>, StoreError> {
            Ok(None)
        }

        async fn create(
            &self,
            _path: &str,
            _content: &str,
            _message: &str,
        ) -> Result<Revision, StoreError> {
            Err(StoreError::Status {
                status: 500,
                body: "boom".into(),
            })
        }

        async fn update(
            &self,
            _path: &str,
            _content: &str,
            _message: &str,
            _expected: &Revision,
        ) -> Result<Revision, StoreError> {
            Err(StoreError::Status {
                status: 500,
                body: "boom".into(),
            })
        }
    }

    fn family() -> FamilyConfig {
        let mut config = FamilyConfig::indices();
        config.cache_dir = None;
        config
    }

    fn provider(dax: f64, spx: f64) -> Arc<StaticProvider> {
        logging::set_silent(true);
        let provider = Arc::new(StaticProvider::new());
        provider.set("^GDAXI", dax);
        provider.set("^GSPC", spx);
        provider
    }

    fn rows(store: &MemoryStore) -> usize {
        store
            .content("data.csv")
            .map(|text| text.lines().count().saturating_sub(1))
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_skips_cycle_and_recovers() {
        let provider = provider(18000.5, 5700.2);
        let store = Arc::new(MemoryStore::new());
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());

        provider.set_healthy(false);
        let err = monitor.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::ProviderUnavailable { .. }));
        assert_eq!(monitor.state(), MonitorState::Running);
        assert!(provider.requests().is_empty());
        assert_eq!(rows(&store), 0);

        provider.set_healthy(true);
        let outcome = monitor.run_cycle().await.expect("second cycle");
        assert_eq!(outcome, CycleOutcome::Persisted { rows: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_values_are_written_once() {
        let provider = provider(18000.5, 5700.2);
        let store = Arc::new(MemoryStore::new());
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());

        assert_eq!(
            monitor.run_cycle().await.expect("first"),
            CycleOutcome::Persisted { rows: 1 }
        );
        assert_eq!(
            monitor.run_cycle().await.expect("second"),
            CycleOutcome::Unchanged
        );
        assert_eq!(rows(&store), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_previous_baseline() {
        let provider = provider(18000.5, 5700.2);
        let mut monitor = Monitor::new(&family(), provider.clone(), Arc::new(BrokenStore));

        let err = monitor.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::WriteFailure(_)));
        assert!(monitor.last_accepted().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_sample_leaves_ledger_untouched() {
        let provider = provider(18000.5, 5700.2);
        provider.clear("^GSPC");
        let store = Arc::new(MemoryStore::new());
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());

        let err = monitor.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::PartialAggregation { missing } if missing == "S&P 500"));
        assert!(store.content("data.csv").is_none());
        assert!(monitor.last_accepted().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown_between_cycles() {
        let provider = provider(18000.5, 5700.2);
        let store = Arc::new(MemoryStore::new());
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);

        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

        // first cycle at t=0, second at t=900 with a new DAX level
        time::sleep(Duration::from_secs(600)).await;
        provider.set("^GDAXI", 18010.0);
        time::sleep(Duration::from_secs(1100)).await;

        shutdown_tx
            .send(ShutdownSignal::Requested)
            .expect("monitor listening");
        let state = handle.await.expect("monitor task");

        assert_eq!(state, MonitorState::Stopped);
        assert_eq!(rows(&store), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_shutdown_wins_over_ready_tick() {
        let provider = provider(18000.5, 5700.2);
        let store = Arc::new(MemoryStore::new());
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);
        shutdown_tx
            .send(ShutdownSignal::Requested)
            .expect("receiver alive");

        // the first tick is ready immediately; shutdown must still win
        for _ in 0..16 {
            assert_eq!(monitor.run(shutdown_rx.clone()).await, MonitorState::Stopped);
        }

        assert!(provider.requests().is_empty());
        assert!(store.content("data.csv").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_ledger_row_defers_cycle_and_keeps_baseline() {
        let provider = provider(18000.5, 5700.2);
        let store = Arc::new(MemoryStore::new());
        let ahead = (chrono::Local::now() + chrono::Duration::hours(1))
            .naive_local()
            .format(crate::constants::TIMESTAMP_FORMAT)
            .to_string();
        let seeded = format!("timestamp,DAX 40,S&P 500\n{ahead},17990,5690\n");
        store.put("data.csv", &seeded);
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());

        let outcome = monitor.run_cycle().await.expect("deferred, not failed");

        assert_eq!(outcome, CycleOutcome::Deferred);
        assert!(monitor.last_accepted().is_none());
        assert_eq!(store.content("data.csv"), Some(seeded));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_fetch_backoff() {
        let provider = provider(18000.5, 5700.2);
        provider.clear("^GDAXI");
        let store = Arc::new(MemoryStore::new());
        let mut monitor = Monitor::new(&family(), provider.clone(), store.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);

        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

        // first fetch fails at t=0, backoff runs until t=60
        time::sleep(Duration::from_secs(10)).await;
        shutdown_tx
            .send(ShutdownSignal::Requested)
            .expect("monitor listening");
        let started = time::Instant::now();
        let state = handle.await.expect("monitor task");

        assert_eq!(state, MonitorState::Stopped);
        assert!(time::Instant::now() - started < Duration::from_secs(1));
        assert!(store.content("data.csv").is_none());
    }
}
