//! Configuration validation.
//!
//! Checks semantic constraints the schema cannot express (window ordering,
//! timeout bounds, origin syntax).

use crate::schema::SwitchboardConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "contacts.rate_limit_secs"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

const MIN_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 30;

/// Validate a loaded configuration.
#[must_use]
pub fn validate(config: &SwitchboardConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let contacts = &config.contacts;

    if contacts.rate_limit_secs == 0 {
        result.push(
            Severity::Warning,
            "contacts.rate_limit_secs",
            "rate limit disabled; stale entries refetch on every request",
        );
    }
    if contacts.rate_limit_secs > contacts.exists_ttl_secs {
        result.push(
            Severity::Error,
            "contacts.rate_limit_secs",
            format!(
                "rate-limit window ({}s) exceeds exists TTL ({}s)",
                contacts.rate_limit_secs, contacts.exists_ttl_secs
            ),
        );
    }
    if contacts.rate_limit_secs > contacts.absent_ttl_secs {
        result.push(
            Severity::Error,
            "contacts.rate_limit_secs",
            format!(
                "rate-limit window ({}s) exceeds absent TTL ({}s)",
                contacts.rate_limit_secs, contacts.absent_ttl_secs
            ),
        );
    }

    let timeout = config.provider.timeout_secs;
    if timeout == 0 {
        result.push(
            Severity::Error,
            "provider.timeout_secs",
            "outbound calls must carry a timeout",
        );
    } else if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
        result.push(
            Severity::Warning,
            "provider.timeout_secs",
            format!("{timeout}s is outside the recommended {MIN_TIMEOUT_SECS}-{MAX_TIMEOUT_SECS}s range"),
        );
    }

    if config.provider.base_url.trim().is_empty() {
        result.push(
            Severity::Warning,
            "provider.base_url",
            "not set; contact lookups will fail as upstream errors",
        );
    } else if url::Url::parse(&config.provider.base_url).is_err() {
        result.push(
            Severity::Error,
            "provider.base_url",
            format!("'{}' is not a valid URL", config.provider.base_url),
        );
    }

    for origin in &config.realtime.cors_origins {
        let valid = url::Url::parse(origin)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            result.push(
                Severity::Error,
                "realtime.cors_origins",
                format!("'{origin}' is not an http(s) origin"),
            );
        }
    }

    if config.realtime.max_payload_bytes == 0 {
        result.push(
            Severity::Error,
            "realtime.max_payload_bytes",
            "must be greater than zero",
        );
    }

    result
}
