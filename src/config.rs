use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    BACKOFF_STEP_SECS, CONFLICT_RETRIES, CURRENCIES_INTERVAL_SECS, CURRENCIES_LEDGER_PATH,
    DEFAULT_BRANCH, GITHUB_API_URL, INDICES_INTERVAL_SECS, INDICES_LEDGER_PATH,
    MAX_FETCH_ATTEMPTS, MIN_REQUEST_SPACING_SECS, NBP_BASE_URL, OUTAGE_COOLDOWN_SECS,
    YAHOO_BASE_URL,
};
use crate::model::Quantity;

/// Classification of a failed fetch attempt, decided by re-probing the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    ProviderDown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_spacing: Duration,
    pub backoff_step: Duration,
    pub outage_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_FETCH_ATTEMPTS,
            min_spacing: Duration::from_secs(MIN_REQUEST_SPACING_SECS),
            backoff_step: Duration::from_secs(BACKOFF_STEP_SECS),
            outage_cooldown: Duration::from_secs(OUTAGE_COOLDOWN_SECS),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::Transient => self.backoff_step.saturating_mul(attempt.max(1)),
            FailureKind::ProviderDown => self.outage_cooldown,
        }
    }
}

/// Which upstream API serves a family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Yahoo { base_url: String },
    Nbp { base_url: String },
}

/// One independently scheduled indicator family with its own ledger.
#[derive(Clone, Debug)]
pub struct FamilyConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub quantities: Vec<Quantity>,
    pub poll_interval: Duration,
    pub ledger_path: String,
    /// Directory for the local ledger copy; `None` disables it.
    pub cache_dir: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub conflict_retries: u32,
}

impl FamilyConfig {
    pub fn indices() -> Self {
        Self {
            name: "indices".to_string(),
            provider: ProviderKind::Yahoo {
                base_url: YAHOO_BASE_URL.to_string(),
            },
            quantities: vec![
                Quantity::new("^GDAXI", "DAX 40"),
                Quantity::new("^GSPC", "S&P 500"),
            ],
            poll_interval: Duration::from_secs(INDICES_INTERVAL_SECS),
            ledger_path: INDICES_LEDGER_PATH.to_string(),
            cache_dir: Some(PathBuf::from(".")),
            retry: RetryPolicy::default(),
            conflict_retries: CONFLICT_RETRIES,
        }
    }

    pub fn currencies() -> Self {
        Self {
            name: "currencies".to_string(),
            provider: ProviderKind::Nbp {
                base_url: NBP_BASE_URL.to_string(),
            },
            quantities: vec![
                Quantity::new("usd", "USD/PLN"),
                Quantity::new("chf", "CHF/PLN"),
            ],
            poll_interval: Duration::from_secs(CURRENCIES_INTERVAL_SECS),
            ledger_path: CURRENCIES_LEDGER_PATH.to_string(),
            cache_dir: Some(PathBuf::from(".")),
            retry: RetryPolicy::default(),
            conflict_retries: CONFLICT_RETRIES,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.quantities.iter().map(|q| q.label.clone()).collect()
    }

    /// Local cache file mirroring the remote ledger.
    pub fn cache_path(&self) -> Option<PathBuf> {
        let file_name = self
            .ledger_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.name);
        self.cache_dir.as_ref().map(|dir| dir.join(file_name))
    }
}

#[derive(Clone, Debug)]
pub struct GithubSettings {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
}

impl GithubSettings {
    /// Accepts the `owner/repo` form used by `GITHUB_REPO`.
    pub fn new(token: String, full_name: &str) -> Option<Self> {
        let (owner, repo) = full_name.trim().split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self {
            token,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            api_url: GITHUB_API_URL.to_string(),
        })
    }
}

/// Where accepted samples are persisted.
#[derive(Clone, Debug)]
pub enum StoreSettings {
    Github(GithubSettings),
    /// In-process store; nothing leaves the machine except the local cache.
    Memory,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub families: Vec<FamilyConfig>,
    pub store: StoreSettings,
}
