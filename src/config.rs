// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for event replication.
//!
//! Configuration is passed to
//! [`HttpTransport::from_config`](crate::transport::HttpTransport::from_config) and
//! [`EventService::start_event_runner`](crate::service::EventService::start_event_runner),
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use event_replication::config::{ReplicationConfig, HttpTransportConfig};
//!
//! let config = ReplicationConfig {
//!     prefix: "order".into(),
//!     transport: HttpTransportConfig::for_testing(
//!         "http://collector:8080/events",
//!         "http://collector:8080/stream",
//!     ),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── prefix: String                  # Event type namespace for this entity kind
//! ├── transport: HttpTransportConfig  # Collector + stream endpoints
//! └── runner: RunnerConfig            # Reconnect and replay retry policy
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! prefix: "worklog"
//!
//! transport:
//!   post_url: "http://events:8080/events"
//!   stream_url: "http://events:8080/stream"
//!   max_retries: 10
//!   read_timeout: "90s"
//!
//! runner:
//!   reconnect: true
//!   backoff_max: "1m"
//! ```

use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level replication config for one entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Event type prefix, e.g. `"order"` → `"orderCreated"`.
    pub prefix: String,

    /// HTTP/SSE transport endpoints and timeouts.
    pub transport: HttpTransportConfig,

    /// Background runner policy.
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            prefix: "entity".to_string(),
            transport: HttpTransportConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl ReplicationConfig {
    /// Reject configs that cannot work at all.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(ReplicationError::Config("prefix must not be empty".to_string()));
        }
        self.transport.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HttpTransportConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP/SSE transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Collector endpoint receiving `POST`ed events.
    pub post_url: String,

    /// Server-sent events endpoint.
    pub stream_url: String,

    /// Attempts per publish/connect before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Timeout for a publish request and for establishing the stream,
    /// as a duration string (e.g., "30s").
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Longest silence tolerated on the stream before it is considered dead.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: String,

    /// Reject received events whose `EventSHA` does not match their content.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

fn default_max_retries() -> usize {
    10
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

fn default_read_timeout() -> String {
    "90s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            post_url: "http://localhost:8080/events".to_string(),
            stream_url: "http://localhost:8080/stream".to_string(),
            max_retries: 10,
            request_timeout: "30s".to_string(),
            read_timeout: "90s".to_string(),
            verify_checksums: true,
        }
    }
}

impl HttpTransportConfig {
    /// Create a transport config with fast timeouts for testing.
    pub fn for_testing(post_url: &str, stream_url: &str) -> Self {
        Self {
            post_url: post_url.to_string(),
            stream_url: stream_url.to_string(),
            max_retries: 1,
            request_timeout: "2s".to_string(),
            read_timeout: "2s".to_string(),
            verify_checksums: true,
        }
    }

    /// Parse request_timeout, falling back to 30 seconds.
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Parse read_timeout, falling back to 90 seconds.
    pub fn read_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.read_timeout).unwrap_or(Duration::from_secs(90))
    }

    /// Retry policy for publish and connect requests.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries.max(1),
            connection_timeout: self.request_timeout_duration(),
            ..RetryConfig::default()
        }
    }

    /// Reject endpoints that are not absolute URLs.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("post_url", &self.post_url), ("stream_url", &self.stream_url)] {
            url::Url::parse(value).map_err(|e| {
                ReplicationError::Config(format!("invalid {} '{}': {}", name, value, e))
            })?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RunnerConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Background runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Reconnect after retryable stream failures instead of terminating.
    #[serde(default = "default_true")]
    pub reconnect: bool,

    /// Consecutive failed connects before giving up (0 = never give up).
    #[serde(default)]
    pub max_reconnect_attempts: usize,

    /// First reconnect delay as a duration string.
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial: String,

    /// Ceiling for reconnect delay.
    #[serde(default = "default_backoff_max")]
    pub backoff_max: String,

    /// Multiplier applied to the delay after each failure.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Attempts to replay one event when the repository fails transiently.
    #[serde(default = "default_replay_attempts")]
    pub replay_attempts: usize,
}

fn default_backoff_initial() -> String {
    "500ms".to_string()
}

fn default_backoff_max() -> String {
    "30s".to_string()
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_replay_attempts() -> usize {
    3
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            max_reconnect_attempts: 0,
            backoff_initial: "500ms".to_string(),
            backoff_max: "30s".to_string(),
            backoff_factor: 2.0,
            replay_attempts: 3,
        }
    }
}

impl RunnerConfig {
    /// Fast backoff, bounded attempts.
    pub fn for_testing() -> Self {
        Self {
            reconnect: true,
            max_reconnect_attempts: 3,
            backoff_initial: "10ms".to_string(),
            backoff_max: "100ms".to_string(),
            backoff_factor: 2.0,
            replay_attempts: 2,
        }
    }

    /// Reconnect policy as a [`RetryConfig`].
    pub fn reconnect_retry(&self) -> RetryConfig {
        let max_attempts = if self.max_reconnect_attempts == 0 {
            usize::MAX
        } else {
            self.max_reconnect_attempts
        };
        RetryConfig {
            max_attempts,
            initial_delay: humantime::parse_duration(&self.backoff_initial)
                .unwrap_or(Duration::from_millis(500)),
            max_delay: humantime::parse_duration(&self.backoff_max)
                .unwrap_or(Duration::from_secs(30)),
            backoff_factor: self.backoff_factor,
            ..RetryConfig::default()
        }
    }

    /// Replay retry policy, sharing the reconnect delays.
    pub fn replay_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.replay_attempts.max(1),
            ..self.reconnect_retry()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
