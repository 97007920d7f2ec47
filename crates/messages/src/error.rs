use std::error::Error as StdError;

/// Crate-wide result type for message store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed message store errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input record or parameter is invalid.
    #[error("invalid message input: {message}")]
    InvalidInput { message: String },

    /// Wrapped source error from the backing store.
    #[error("message store failed: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn storage(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
