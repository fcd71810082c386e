// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event-sourced service for one entity kind.
//!
//! [`EventService`] composes a [`Repository`] with a [`Transport`]:
//!
//! - Mutations (`create`, `save`, `delete`) are **published**, not applied.
//!   The local store changes only when the event comes back through the
//!   stream and is replayed, so every replica (including this one)
//!   converges through the same path.
//! - Reads (`get`, `get_all`, `exists`, `get_id`) go straight to the
//!   repository.
//! - Received events are replayed idempotently by the service's
//!   [`Replayer`], either directly via [`EventService::handle_event`] or by
//!   the background runner from [`EventService::start_event_runner`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> event_replication::Result<()> {
//! use event_replication::{BaseEntity, EventService, HttpTransport, InMemoryRepository};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! let repo = Arc::new(InMemoryRepository::<BaseEntity<u64>>::new());
//! let transport = Arc::new(HttpTransport::new(
//!     "http://collector:8080/events",
//!     "http://collector:8080/stream",
//!     10,
//! )?);
//! let service: EventService<BaseEntity<u64>, _, _> = EventService::new(repo, transport, "order");
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let runner = service.start_event_runner(shutdown_rx);
//!
//! service.create(&BaseEntity::new(1)).await?;
//!
//! shutdown_tx.send(true).ok();
//! runner.join().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ReplicationConfig, RunnerConfig};
use crate::error::Result;
use crate::event::{Event, EventVerb};
use crate::metrics;
use crate::replay::{ReplayOutcome, Replayer};
use crate::repository::{Entity, Repository};
use crate::runner::EventRunner;
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Publishes mutations of `T` and replays received ones into `R`.
pub struct EventService<T, R, Tr>
where
    T: Entity,
    R: Repository<T> + ?Sized,
    Tr: Transport + ?Sized,
{
    prefix: String,
    repository: Arc<R>,
    transport: Arc<Tr>,
    replayer: Arc<Replayer<T, R>>,
    runner_config: RunnerConfig,
}

impl<T, R, Tr> Clone for EventService<T, R, Tr>
where
    T: Entity,
    R: Repository<T> + ?Sized,
    Tr: Transport + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            repository: Arc::clone(&self.repository),
            transport: Arc::clone(&self.transport),
            replayer: Arc::clone(&self.replayer),
            runner_config: self.runner_config.clone(),
        }
    }
}

impl<T, R> EventService<T, R, HttpTransport>
where
    T: Entity,
    R: Repository<T> + ?Sized,
{
    /// Build a service with an [`HttpTransport`] from configuration.
    pub fn from_config(repository: Arc<R>, config: &ReplicationConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::from_config(config.transport.clone())?);
        Ok(Self::new(repository, transport, config.prefix.clone())
            .with_runner_config(config.runner.clone()))
    }
}

impl<T, R, Tr> EventService<T, R, Tr>
where
    T: Entity,
    R: Repository<T> + ?Sized,
    Tr: Transport + ?Sized,
{
    /// Create a service; builds the dispatch table for `prefix`.
    pub fn new(repository: Arc<R>, transport: Arc<Tr>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let replayer = Arc::new(Replayer::new(prefix.clone(), Arc::clone(&repository)));
        Self {
            prefix,
            repository,
            transport,
            replayer,
            runner_config: RunnerConfig::default(),
        }
    }

    /// Set the policy used by [`start_event_runner`](Self::start_event_runner).
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner_config = config;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn transport(&self) -> &Arc<Tr> {
        &self.transport
    }

    pub fn replayer(&self) -> &Arc<Replayer<T, R>> {
        &self.replayer
    }

    pub fn runner_config(&self) -> &RunnerConfig {
        &self.runner_config
    }

    // =========================================================================
    // Mutations (published, not applied locally)
    // =========================================================================

    /// Publish a `Created` event for `entity`.
    pub async fn create(&self, entity: &T) -> Result<()> {
        self.publish(EventVerb::Created, entity).await
    }

    /// Publish an `Updated` event for `entity`.
    pub async fn save(&self, entity: &T) -> Result<()> {
        self.publish(EventVerb::Updated, entity).await
    }

    /// Publish a `Deleted` event for `entity`.
    pub async fn delete(&self, entity: &T) -> Result<()> {
        self.publish(EventVerb::Deleted, entity).await
    }

    async fn publish(&self, verb: EventVerb, entity: &T) -> Result<()> {
        let start = Instant::now();
        let event = Event::for_entity(&self.prefix, verb, entity)?;
        let event_id = event.event_id.clone();
        let event_type = event.event_type.clone();

        let result = self.transport.post_event(event).await;

        metrics::record_event_published(&self.prefix, &event_type, result.is_ok());
        metrics::record_publish_latency(&self.prefix, start.elapsed());
        match &result {
            Ok(()) => debug!(
                prefix = %self.prefix,
                event_id = %event_id,
                event_type = %event_type,
                "Event published"
            ),
            Err(e) => warn!(
                prefix = %self.prefix,
                event_id = %event_id,
                event_type = %event_type,
                error = %e,
                "Event publish failed"
            ),
        }
        result
    }

    // =========================================================================
    // Reads (repository delegation)
    // =========================================================================

    pub async fn get(&self, id: T::Id) -> Result<Option<T>> {
        Ok(self.repository.get(id).await?)
    }

    pub async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self.repository.get_all().await?)
    }

    pub async fn exists(&self, id: T::Id) -> Result<bool> {
        Ok(self.repository.exists(id).await?)
    }

    pub async fn get_id(&self, entity: &T) -> Result<T::Id> {
        Ok(self.repository.get_id(entity).await?)
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Replay one received event into the repository.
    pub async fn handle_event(&self, event: &Event) -> Result<ReplayOutcome> {
        self.replayer.dispatch(event).await
    }

    /// Spawn the background runner with this service's runner policy.
    ///
    /// Returns immediately. Send `true` on the shutdown channel to stop it.
    pub fn start_event_runner(&self, shutdown: watch::Receiver<bool>) -> EventRunner {
        self.start_event_runner_with(shutdown, self.runner_config.clone())
    }

    /// Spawn the background runner with an explicit policy.
    pub fn start_event_runner_with(
        &self,
        shutdown: watch::Receiver<bool>,
        config: RunnerConfig,
    ) -> EventRunner {
        EventRunner::spawn(
            Arc::clone(&self.transport),
            Arc::clone(&self.replayer),
            shutdown,
            config,
        )
    }
}
