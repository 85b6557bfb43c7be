use std::time::Duration;

/// Errors raised while resolving a single candidate link.
///
/// Only two levels matter to callers: transient failures are consumed by the
/// retry budget, fatal failures abort the whole run. The variants exist so
/// logs and `ResolutionResult::last_error` can say which kind of transient
/// failure exhausted the budget.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("network error: {0}")]
    Network(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ResolveError {
    /// Coarse classification carried into `ResolutionResult`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Network(_) => ErrorKind::Network,
            ResolveError::Navigation(_) => ErrorKind::Navigation,
            ResolveError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        ResolveError::Network(e.to_string())
    }
}

/// The transient-error kind recorded when a candidate exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Navigation,
    Timeout,
}

/// Errors that stop the run entirely.
///
/// Everything else is contained per candidate or per target; these propagate
/// to the operator.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("failed to provision browser session: {0}")]
    Session(String),

    #[error("ledger storage error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
