//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - A recording repository with failure injection
//! - An in-process loopback transport
//! - Entity helpers

#![allow(dead_code)]

pub mod channel_transport;
pub mod mock_repo;

pub use channel_transport::*;
pub use mock_repo::*;

use event_replication::BaseEntity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Entity used throughout the tests.
pub type Item = BaseEntity<u32>;

/// A domain entity embedding the common fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worklog {
    #[serde(flatten)]
    pub base: BaseEntity<String>,
    pub description: String,
    pub hours: f32,
}

impl Worklog {
    pub fn new(id: &str, description: &str, hours: f32) -> Self {
        Self {
            base: BaseEntity::new(id.to_string()),
            description: description.to_string(),
            hours,
        }
    }
}

impl event_replication::Entity for Worklog {
    type Id = String;

    fn id(&self) -> String {
        self.base.id.clone()
    }

    fn creation_date(&self) -> chrono::DateTime<chrono::Utc> {
        self.base.creation_date
    }

    fn last_update_date(&self) -> chrono::DateTime<chrono::Utc> {
        self.base.last_update_date
    }

    fn version(&self) -> i64 {
        self.base.version
    }

    fn set_version(&mut self, version: i64) {
        self.base.version = version;
    }

    fn set_last_update_date(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.base.last_update_date = at;
    }

    fn set_creation_date(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.base.creation_date = at;
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
