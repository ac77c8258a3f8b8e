use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::config::{FamilyConfig, ServiceConfig, StoreSettings};
use crate::ledger::{GithubStore, MemoryStore, VersionedStore};
use crate::logging;
use crate::provider;
use crate::scheduler::{Monitor, ShutdownSignal};

/// Runs every configured family until SIGINT or SIGTERM. Families share
/// nothing but the shutdown signal.
pub async fn run_with_config(config: ServiceConfig) -> Result<()> {
    let client = provider::http_client().context("failed to build HTTP client")?;
    let store = build_store(&config.store, client.clone());

    let monitors: Vec<Monitor> = config
        .families
        .iter()
        .map(|family| {
            let provider = provider::build(&family.provider, client.clone());
            Monitor::new(family, provider, Arc::clone(&store))
        })
        .collect();

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);
    let signals_task = tokio::spawn(handle_signals(shutdown_tx));

    let handles: Vec<_> = monitors
        .into_iter()
        .map(|mut monitor| {
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { monitor.run(shutdown).await })
        })
        .collect();
    drop(shutdown_rx);

    let mut result = Ok(());
    for (family, handle) in config.families.iter().zip(handles) {
        if let Err(err) = handle.await {
            logging::error(
                "monitor.crashed",
                "Monitor task ended abnormally",
                json!({ "family": family.name, "error": err.to_string() }),
            );
            result = Err(err).context(format!("monitor task for {} failed", family.name));
        }
    }

    signals_task.abort();
    if let Ok(Err(err)) = signals_task.await {
        result = result.and(Err(err));
    }

    logging::info_simple("service.stop", "Monitoring finished, goodbye");
    result
}

fn build_store(settings: &StoreSettings, client: reqwest::Client) -> Arc<dyn VersionedStore> {
    match settings {
        StoreSettings::Github(github) => Arc::new(GithubStore::new(client, github.clone())),
        StoreSettings::Memory => {
            logging::warn_simple(
                "service.dry_run",
                "Dry run: ledger rows are kept in memory and the local cache only",
            );
            Arc::new(MemoryStore::new())
        }
    }
}

async fn handle_signals(shutdown_tx: watch::Sender<ShutdownSignal>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    logging::info(
        "signal.received",
        "Shutdown requested, stopping monitors",
        json!({ "signal": name }),
    );
    let _ = shutdown_tx.send(ShutdownSignal::Requested);
    Ok(())
}

/// Probes every family's provider once. Returns the families that are down.
pub async fn probe_all(families: &[FamilyConfig]) -> Result<Vec<String>> {
    let client = provider::http_client().context("failed to build HTTP client")?;
    let mut down = Vec::new();

    for family in families {
        let provider = provider::build(&family.provider, client.clone());
        let available = provider.probe().await;
        logging::info(
            "probe.result",
            if available {
                "Provider reachable"
            } else {
                "Provider unavailable"
            },
            json!({
                "family": family.name,
                "provider": provider.name(),
                "available": available,
            }),
        );
        if !available {
            down.push(family.name.clone());
        }
    }

    Ok(down)
}
