use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform rejected the call. `NotFound` is split out because
    /// delivery handles and edit targets key recovery behavior on it.
    #[error("not found: {context}")]
    NotFound { context: &'static str },

    #[error("api error {status} on {context}: {body}")]
    Api {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed payload on {context}")]
    Malformed { context: &'static str },

    #[error("gateway: {0}")]
    Gateway(String),
}

impl Error {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
