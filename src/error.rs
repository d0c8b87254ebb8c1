use thiserror::Error;

/// Failure categories for a pipeline run.
///
/// Transient HTTP trouble is consumed inside the pager (retried, then
/// degraded to a partial result), so `Http` rarely escapes it. Store and
/// configuration failures are fatal and abort the run.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Transport-level or decode-level request failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Store read or write failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Bad or missing configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}
