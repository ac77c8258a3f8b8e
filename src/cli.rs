use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{FamilyConfig, GithubSettings, ProviderKind, ServiceConfig, StoreSettings};
use crate::constants::{
    CONFLICT_RETRIES, CURRENCIES_LEDGER_PATH, DEFAULT_BRANCH, GITHUB_API_URL,
    INDICES_LEDGER_PATH, NBP_BASE_URL, YAHOO_BASE_URL,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Polls market indicators and appends changes to a ledger in a GitHub repository"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    args: RunArgs,
}

impl Cli {
    pub fn into_parts(self) -> (Command, RunArgs) {
        (self.command.unwrap_or_default(), self.args)
    }
}

#[derive(Debug, Subcommand, Default, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Monitor stock indices and exchange rates side by side
    #[default]
    Run,
    /// Monitor stock indices (DAX 40, S&P 500) only
    Indices,
    /// Monitor exchange rates (USD/PLN, CHF/PLN) only
    Currencies,
    /// Check once whether the upstream providers are reachable
    Probe,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// GitHub token with contents write access
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub github_token: Option<String>,

    /// Target repository as owner/name
    #[arg(long, env = "GITHUB_REPO", global = true)]
    pub github_repo: Option<String>,

    /// Branch the ledgers are committed to
    #[arg(long, default_value = DEFAULT_BRANCH, global = true)]
    pub branch: String,

    /// Override the polling interval of every family, in seconds
    #[arg(long, global = true)]
    pub interval_secs: Option<u64>,

    /// Ledger path of the index family inside the repository
    #[arg(long, default_value = INDICES_LEDGER_PATH, global = true)]
    pub indices_path: String,

    /// Ledger path of the currency family inside the repository
    #[arg(long, default_value = CURRENCIES_LEDGER_PATH, global = true)]
    pub currencies_path: String,

    /// Directory holding the local ledger copies
    #[arg(long, default_value = ".", global = true)]
    pub cache_dir: PathBuf,

    /// Do not keep local ledger copies
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// How often an append is retried after a revision conflict
    #[arg(long, default_value_t = CONFLICT_RETRIES, global = true)]
    pub conflict_retries: u32,

    /// Keep ledgers in memory instead of committing to GitHub
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[arg(long, default_value = GITHUB_API_URL, global = true, hide = true)]
    pub github_api_url: String,

    #[arg(long, default_value = YAHOO_BASE_URL, global = true, hide = true)]
    pub yahoo_url: String,

    #[arg(long, default_value = NBP_BASE_URL, global = true, hide = true)]
    pub nbp_url: String,
}

impl RunArgs {
    /// Family presets selected by `command`, with overrides applied.
    pub fn families(&self, command: Command) -> Vec<FamilyConfig> {
        let mut families = Vec::with_capacity(2);
        if matches!(command, Command::Run | Command::Indices | Command::Probe) {
            let mut indices = FamilyConfig::indices();
            indices.provider = ProviderKind::Yahoo {
                base_url: self.yahoo_url.clone(),
            };
            indices.ledger_path = self.indices_path.clone();
            families.push(indices);
        }
        if matches!(command, Command::Run | Command::Currencies | Command::Probe) {
            let mut currencies = FamilyConfig::currencies();
            currencies.provider = ProviderKind::Nbp {
                base_url: self.nbp_url.clone(),
            };
            currencies.ledger_path = self.currencies_path.clone();
            families.push(currencies);
        }

        for family in &mut families {
            if let Some(secs) = self.interval_secs {
                family.poll_interval = Duration::from_secs(secs.max(1));
            }
            family.cache_dir = (!self.no_cache).then(|| self.cache_dir.clone());
            family.conflict_retries = self.conflict_retries;
        }
        families
    }

    pub fn service_config(&self, command: Command) -> Result<ServiceConfig> {
        let store = if self.dry_run {
            StoreSettings::Memory
        } else {
            let (Some(token), Some(repo)) = (&self.github_token, &self.github_repo) else {
                bail!("set GITHUB_TOKEN and GITHUB_REPO (owner/name), or pass --dry-run");
            };
            let Some(mut settings) = GithubSettings::new(token.clone(), repo) else {
                bail!("GITHUB_REPO must look like owner/name, got {repo:?}");
            };
            settings.branch = self.branch.clone();
            settings.api_url = self.github_api_url.clone();
            StoreSettings::Github(settings)
        };

        Ok(ServiceConfig {
            families: self.families(command),
            store,
        })
    }
}
