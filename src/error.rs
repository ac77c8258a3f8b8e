use thiserror::Error;

/// Failure of a single provider request.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider answered with status {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("no records returned for {0}")]
    Empty(String),
}

/// Failure of a remote versioned store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("revision conflict on {path}")]
    Conflict { path: String },
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("cannot decode stored content: {0}")]
    Decode(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum LedgerError {
    #[error("ledger header {found:?} does not match expected {expected:?}")]
    HeaderMismatch { expected: String, found: String },
    #[error("malformed ledger row {line}: {reason}")]
    BadRow { line: usize, reason: String },
    #[error("sample at {sample} is older than last ledger row at {last}")]
    OutOfOrder { last: String, sample: String },
    #[error("sample columns {found:?} do not match ledger columns {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("revision conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error("ledger write failed: {0}")]
    Failure(String),
}

impl From<LedgerError> for WriteError {
    fn from(err: LedgerError) -> Self {
        WriteError::Failure(err.to_string())
    }
}

/// Why a monitoring cycle produced no ledger row. None of these stop the
/// scheduler loop. Exhausted fetches surface as `PartialAggregation`, exhausted
/// revision conflicts as `WriteFailure`.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("provider {provider} is unavailable")]
    ProviderUnavailable { provider: String },
    #[error("sample voided, {missing} could not be fetched")]
    PartialAggregation { missing: String },
    #[error("write failure: {0}")]
    WriteFailure(String),
}

impl CycleError {
    pub fn event(&self) -> &'static str {
        match self {
            CycleError::ProviderUnavailable { .. } => "probe.unavailable",
            CycleError::PartialAggregation { .. } => "aggregate.partial",
            CycleError::WriteFailure(_) => "ledger.write_failed",
        }
    }
}

impl From<WriteError> for CycleError {
    fn from(err: WriteError) -> Self {
        // Exhausted conflicts degrade to a plain write failure.
        match err {
            WriteError::Conflict { .. } => CycleError::WriteFailure(err.to_string()),
            WriteError::Failure(reason) => CycleError::WriteFailure(reason),
        }
    }
}
