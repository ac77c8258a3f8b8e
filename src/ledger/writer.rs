use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use crate::error::{LedgerError, StoreError, WriteError};
use crate::logging;
use crate::model::Sample;

use super::store::{Revision, VersionedStore};
use super::{AppendStatus, Ledger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Written { revision: Revision, rows: usize },
    /// The ledger already ends with this exact sample.
    Skipped,
    /// The last row is newer than the sample, as after a DST fall-back. Nothing
    /// was written; later samples go through once the clock passes `last`.
    Behind { last: String },
}

enum Attempt {
    Done(AppendOutcome),
    Conflict,
}

/// Appends samples to one ledger path with read-modify-conditional-write.
/// Every attempt starts from a fresh read, so a stale revision is never
/// written against.
pub struct LedgerWriter {
    store: Arc<dyn VersionedStore>,
    family: String,
    path: String,
    columns: Vec<String>,
    cache_path: Option<PathBuf>,
    conflict_retries: u32,
}

impl LedgerWriter {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        family: impl Into<String>,
        path: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            store,
            family: family.into(),
            path: path.into(),
            columns,
            cache_path: None,
            conflict_retries: 0,
        }
    }

    pub fn with_cache(mut self, cache_path: PathBuf) -> Self {
        self.cache_path = Some(cache_path);
        self
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn append(&self, sample: &Sample) -> Result<AppendOutcome, WriteError> {
        let attempts = self.conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match self.try_append(sample).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Conflict => {
                    logging::warn(
                        "ledger.conflict",
                        "Ledger changed between read and write",
                        json!({
                            "family": self.family,
                            "path": self.path,
                            "attempt": attempt,
                            "max_attempts": attempts,
                        }),
                    );
                }
            }
        }

        Err(WriteError::Conflict { attempts })
    }

    async fn try_append(&self, sample: &Sample) -> Result<Attempt, WriteError> {
        let snapshot = self.store.read(&self.path).await.map_err(store_failure)?;
        let (mut ledger, revision) = match snapshot {
            Some(snapshot) => (
                Ledger::parse(&snapshot.content, &self.columns)?,
                Some(snapshot.revision),
            ),
            None => (Ledger::empty(&self.columns), None),
        };

        match ledger.append(sample) {
            Ok(AppendStatus::Appended) => {}
            Ok(AppendStatus::Duplicate) => return Ok(Attempt::Done(AppendOutcome::Skipped)),
            Err(LedgerError::OutOfOrder { last, .. }) => {
                return Ok(Attempt::Done(AppendOutcome::Behind { last }))
            }
            Err(err) => return Err(err.into()),
        }
        let content = ledger.render();

        if let Some(cache_path) = &self.cache_path {
            if let Err(err) = write_cache(cache_path, &content).await {
                logging::warn(
                    "ledger.cache_failed",
                    "Could not refresh local ledger copy",
                    json!({
                        "path": cache_path.display().to_string(),
                        "error": format!("{err:#}"),
                    }),
                );
            }
        }

        let result = match &revision {
            None => {
                let message = format!(
                    "Create {} ledger {}",
                    self.family,
                    sample.timestamp_text()
                );
                self.store.create(&self.path, &content, &message).await
            }
            Some(expected) => {
                let message = format!(
                    "Append {} sample {}",
                    self.family,
                    sample.timestamp_text()
                );
                self.store
                    .update(&self.path, &content, &message, expected)
                    .await
            }
        };

        match result {
            Ok(revision) => Ok(Attempt::Done(AppendOutcome::Written {
                revision,
                rows: ledger.len(),
            })),
            Err(StoreError::Conflict { .. }) => Ok(Attempt::Conflict),
            Err(err) => Err(store_failure(err)),
        }
    }
}

fn store_failure(err: StoreError) -> WriteError {
    WriteError::Failure(err.to_string())
}

/// Replaces the cache file atomically so a crash never leaves half a ledger.
async fn write_cache(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create cache dir {:?}", parent))?;
    }
    let tmp = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("failed to write {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move cache into place at {:?}", path))?;
    Ok(())
}
