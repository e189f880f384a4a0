/// Crate-wide result type for quota operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed quota-store errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure talking to the store.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("quota store call {call} failed: status={status} body={body}")]
    Status {
        call: &'static str,
        status: u16,
        body: String,
    },

    /// The store answered with a payload we could not interpret.
    #[error("quota store call {call} returned malformed payload")]
    Malformed { call: &'static str },
}
