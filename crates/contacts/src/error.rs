/// Crate-wide result type for contact resolution.
pub type Result<T> = std::result::Result<T, ContactError>;

/// Contact resolution failures.
///
/// A confirmed "no such contact" answer is not an error; it is
/// [`LookupOutcome::Absent`](crate::LookupOutcome::Absent). Every variant here
/// means the upstream state is unknown and must not be cached as absent.
///
/// `Clone` so one in-flight lookup's result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    /// The provider connection is not configured.
    #[error("contact lookup is not configured: {message}")]
    NotConfigured { message: String },

    /// Transport failure or timeout talking to the provider.
    #[error("contact lookup transport error: {message}")]
    Transport { message: String },

    /// The provider answered with a non-success status.
    #[error("contact lookup returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider's response body could not be decoded.
    #[error("contact lookup response was not understood: {message}")]
    Decode { message: String },

    /// The cache store failed.
    #[error("contact cache store failed: {message}")]
    Storage { message: String },

    /// The instance name cannot be addressed as a provider path segment.
    #[error("instance name '{name}' is not a valid path segment")]
    InvalidInstance { name: String },
}

impl ContactError {
    #[must_use]
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::NotConfigured {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn decode(message: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
            Self::Storage { .. } => "storage",
            Self::InvalidInstance { .. } => "invalid_instance",
        }
    }
}

impl From<reqwest::Error> for ContactError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err)
        } else {
            Self::transport(err)
        }
    }
}
