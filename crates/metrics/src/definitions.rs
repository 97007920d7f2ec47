//! Metric name and label definitions.
//!
//! All metric names used throughout switchboard live here so dashboards have
//! one place to look.

/// Webhook ingress metrics
pub mod webhook {
    /// Delivery events accepted by the webhook endpoints
    pub const RECEIVED_TOTAL: &str = "switchboard_webhook_received_total";
    /// Message events the normalizer could not match to a known shape
    pub const REJECTED_TOTAL: &str = "switchboard_webhook_rejected_total";
    /// Time spent handling one delivery event end to end
    pub const HANDLE_DURATION_SECONDS: &str = "switchboard_webhook_handle_duration_seconds";
}

/// Message store metrics
pub mod store {
    /// Messages inserted as new rows
    pub const PERSISTED_TOTAL: &str = "switchboard_messages_persisted_total";
    /// Redelivered messages ignored by the insert
    pub const DUPLICATE_TOTAL: &str = "switchboard_messages_duplicate_total";
    /// Persistence failures (logged, not propagated)
    pub const ERRORS_TOTAL: &str = "switchboard_messages_persist_errors_total";
}

/// Real-time fan-out metrics
pub mod fanout {
    /// Frames handed to session write loops
    pub const FRAMES_SENT_TOTAL: &str = "switchboard_fanout_frames_sent_total";
    /// Broadcasts whose target room had no members
    pub const NO_RECIPIENTS_TOTAL: &str = "switchboard_fanout_no_recipients_total";
    /// Outbound echoes suppressed before reaching clients
    pub const SUPPRESSED_TOTAL: &str = "switchboard_fanout_suppressed_total";
}

/// WebSocket metrics
pub mod websocket {
    /// Total number of WebSocket sessions established
    pub const CONNECTIONS_TOTAL: &str = "switchboard_websocket_connections_total";
    /// Number of currently connected sessions
    pub const CONNECTIONS_ACTIVE: &str = "switchboard_websocket_connections_active";
    /// Client frames received
    pub const FRAMES_RECEIVED_TOTAL: &str = "switchboard_websocket_frames_received_total";
}

/// Contact resolution cache metrics
pub mod contacts {
    /// Resolutions served from a fresh cache entry
    pub const CACHE_HITS_TOTAL: &str = "switchboard_contacts_cache_hits_total";
    /// Resolutions served stale because a refetch was suppressed
    pub const RATE_LIMITED_TOTAL: &str = "switchboard_contacts_rate_limited_total";
    /// Numbers rejected by the validation policy
    pub const INVALID_TOTAL: &str = "switchboard_contacts_invalid_total";
    /// Upstream lookups issued
    pub const UPSTREAM_CALLS_TOTAL: &str = "switchboard_contacts_upstream_calls_total";
    /// Upstream lookups that failed (timeouts, non-2xx, bad bodies)
    pub const UPSTREAM_ERRORS_TOTAL: &str = "switchboard_contacts_upstream_errors_total";
    /// Callers that joined an in-flight lookup instead of issuing their own
    pub const COALESCED_TOTAL: &str = "switchboard_contacts_coalesced_total";
    /// Upstream lookup duration in seconds
    pub const UPSTREAM_DURATION_SECONDS: &str = "switchboard_contacts_upstream_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const EVENT: &str = "event";
    pub const SHAPE: &str = "shape";
    pub const REASON: &str = "reason";
    pub const OUTCOME: &str = "outcome";
}

/// Histogram bucket boundaries.
pub mod buckets {
    /// Request handling duration buckets (in seconds), 1ms to 30s
    pub const HANDLE_DURATION: &[f64] = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];

    /// Upstream lookup duration buckets (in seconds), 10ms to 30s
    pub const UPSTREAM_DURATION: &[f64] = &[
        0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 20.0, 30.0,
    ];
}
