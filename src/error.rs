// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for event replication.
//!
//! Errors are categorized by where they occur (encoding, transport, replay)
//! and carry enough context to tell which event or endpoint failed.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Encode` | No | Entity or event could not be serialized |
//! | `EventDecode` | No | Malformed `data:` line on the stream |
//! | `PayloadDecode` | No | `EventData` does not decode into the entity type |
//! | `ChecksumMismatch` | No | `EventSHA` does not match the event content |
//! | `Http` | Yes | Network errors, timeouts, connection refused |
//! | `UnexpectedStatus` | 5xx/429 only | Collector or stream answered with the wrong status |
//! | `StreamClosed` | Yes | Server ended the event stream |
//! | `StreamIdle` | Yes | No bytes arrived within the read deadline |
//! | `Timeout` | Yes | A request did not complete within its deadline |
//! | `NotConnected` | Yes | Stream read attempted without a live connection |
//! | `Repository` | Yes | Destination store failed |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Runner or service misuse |
//! | `Shutdown` | No | Shutdown signalled mid-operation |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! [`ReplicationError::is_retryable()`] tells the runner whether to reconnect
//! with backoff. [`ReplicationError::is_skippable()`] marks failures scoped to a
//! single event: the runner logs them and moves on to the next event.

use crate::repository::RepositoryError;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while publishing, streaming or replaying events.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Serialization of an entity or event failed.
    #[error("Encode error ({what}): {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A `data:` line could not be decoded into an event envelope.
    ///
    /// Scoped to one event; the stream itself is still usable.
    #[error("Event decode error: {message}")]
    EventDecode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// `EventData` could not be decoded into the entity type.
    #[error("Payload decode error ({event_type}): {source}")]
    PayloadDecode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The received `EventSHA` does not match the recomputed checksum.
    #[error("Checksum mismatch for event {event_id}: expected {expected}, got {computed}")]
    ChecksumMismatch {
        event_id: String,
        expected: String,
        computed: String,
    },

    /// HTTP client error (connect, send, body read).
    #[error("HTTP error ({operation}): {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Remote answered with a status we do not accept.
    #[error("Unexpected status ({operation}): {status}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    /// The server closed the event stream.
    #[error("Event stream closed by server")]
    StreamClosed,

    /// No data arrived on the event stream within the read deadline.
    #[error("Event stream idle for {idle_ms}ms")]
    StreamIdle { idle_ms: u64 },

    /// A request did not complete within its deadline.
    #[error("Timeout ({operation}) after {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    /// `next_event` was called without a connected stream.
    #[error("Event stream not connected")]
    NotConnected,

    /// The destination repository failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted in the wrong state.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown was signalled while the operation was in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create an HTTP error from a reqwest error.
    pub fn http(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Http { operation, source }
    }

    /// Create an event decode error without a JSON source.
    pub fn event_decode(message: impl Into<String>) -> Self {
        Self::EventDecode {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } => true, // Network errors are retryable
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            Self::StreamClosed => true,
            Self::StreamIdle { .. } => true,
            Self::Timeout { .. } => true,
            Self::NotConnected => true,
            Self::Repository(e) => e.is_retryable(),
            Self::Encode { .. } => false,
            Self::EventDecode { .. } => false, // Malformed at the source
            Self::PayloadDecode { .. } => false,
            Self::ChecksumMismatch { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error only affects a single event.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::EventDecode { .. } | Self::PayloadDecode { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
