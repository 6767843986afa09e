use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaseScoutError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Unknown field '{0}' in sheet header")]
    UnknownField(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Typed failure classes for search backends. The funnel treats these
/// differently: auth failures disable the provider for the rest of the
/// run, rate limits and transient faults are retried with backoff, and
/// an empty result set is a normal outcome, not a fault.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("No results")]
    NoResults,
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::RateLimited | BackendError::Transient(_))
    }
}
