pub const MIN_REQUEST_SPACING_SECS: u64 = 30;
pub const MAX_FETCH_ATTEMPTS: u32 = 3;
pub const BACKOFF_STEP_SECS: u64 = 60;
pub const OUTAGE_COOLDOWN_SECS: u64 = 300;
pub const CONFLICT_RETRIES: u32 = 3;

pub const INDICES_INTERVAL_SECS: u64 = 900;
pub const CURRENCIES_INTERVAL_SECS: u64 = 300;
pub const INDICES_LEDGER_PATH: &str = "data.csv";
pub const CURRENCIES_LEDGER_PATH: &str = "kursy_walut.csv";

pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const YAHOO_PROBE_SYMBOL: &str = "MSFT";
pub const NBP_BASE_URL: &str = "https://api.nbp.pl";
pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";

pub const HTTP_TIMEOUT_SECS: u64 = 20;
pub const USER_AGENT: &str = concat!("indicator-ledger/", env!("CARGO_PKG_VERSION"));

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
