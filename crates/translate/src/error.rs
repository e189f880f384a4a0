use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rate limited")]
    RateLimited,

    #[error("provider upstream error {status}")]
    Upstream { status: u16 },

    /// Non-retryable provider rejection (bad language pair, blocked, ...).
    #[error("provider rejected request: {status}")]
    Rejected { status: u16 },

    #[error("malformed provider response")]
    Malformed,
}

impl Error {
    /// Transient failures worth retrying under the breaker. Everything else
    /// aborts the attempt loop immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited | Self::Upstream { .. }
        )
    }
}
