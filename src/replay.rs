// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Idempotent replay of received events.
//!
//! The [`Replayer`] owns the dispatch table (`prefix + verb` → verb) and the
//! destination repository. Dispatch is exact-match on `EventType`; anything
//! else is ignored so one stream can carry many entity kinds.
//!
//! # Policy
//!
//! | Verb | Stored? | Action | Outcome |
//! |------|---------|--------|---------|
//! | Created | yes | none | `SkippedExisting` |
//! | Created | no | `create` | `Applied` |
//! | Updated | yes | `save` | `Applied` |
//! | Updated | no | none | `SkippedMissing` |
//! | Deleted | yes | `delete` | `Applied` |
//! | Deleted | no | `delete` → `NotFound` tolerated | `SkippedMissing` |
//!
//! Replaying the same event any number of times leaves the store in the
//! same state as replaying it once.

use crate::error::{ReplicationError, Result};
use crate::event::{Event, EventVerb};
use crate::metrics;
use crate::repository::{Entity, Repository, RepositoryError};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// What replaying one event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The repository was mutated.
    Applied(EventVerb),
    /// Created for an id already stored.
    SkippedExisting,
    /// Updated or Deleted for an id not stored.
    SkippedMissing,
    /// Event type not in the dispatch table.
    Ignored,
}

impl ReplayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayOutcome::Applied(_) => "applied",
            ReplayOutcome::SkippedExisting => "skipped_existing",
            ReplayOutcome::SkippedMissing => "skipped_missing",
            ReplayOutcome::Ignored => "ignored",
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ReplayOutcome::Applied(_))
    }
}

impl std::fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayOutcome::Applied(verb) => write!(f, "applied({})", verb),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Dispatches events of one prefix onto one repository.
pub struct Replayer<T: Entity, R: Repository<T> + ?Sized> {
    prefix: String,
    repository: Arc<R>,
    table: HashMap<String, EventVerb>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, R: Repository<T> + ?Sized> Replayer<T, R> {
    /// Build the dispatch table for `prefix`.
    pub fn new(prefix: impl Into<String>, repository: Arc<R>) -> Self {
        let prefix = prefix.into();
        let table = EventVerb::ALL
            .into_iter()
            .map(|verb| (verb.event_type(&prefix), verb))
            .collect();
        Self {
            prefix,
            repository,
            table,
            _entity: PhantomData,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Verb registered for an event type, if any.
    pub fn verb_for(&self, event_type: &str) -> Option<EventVerb> {
        self.table.get(event_type).copied()
    }

    /// Registered event types.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Replay one event against the repository.
    pub async fn dispatch(&self, event: &Event) -> Result<ReplayOutcome> {
        let Some(verb) = self.verb_for(&event.event_type) else {
            trace!(
                prefix = %self.prefix,
                event_type = %event.event_type,
                "No handler for event type"
            );
            metrics::record_replay_outcome(&self.prefix, ReplayOutcome::Ignored.as_str());
            return Ok(ReplayOutcome::Ignored);
        };

        let start = Instant::now();
        let entity: T = serde_json::from_str(&event.event_data).map_err(|source| {
            ReplicationError::PayloadDecode {
                event_type: event.event_type.clone(),
                source,
            }
        })?;

        let outcome = match verb {
            EventVerb::Created => self.replay_created(entity).await?,
            EventVerb::Updated => self.replay_updated(entity).await?,
            EventVerb::Deleted => self.replay_deleted(entity).await?,
        };

        metrics::record_replay_outcome(&self.prefix, outcome.as_str());
        metrics::record_replay_latency(&self.prefix, start.elapsed());
        debug!(
            prefix = %self.prefix,
            event_id = %event.event_id,
            event_type = %event.event_type,
            outcome = %outcome,
            "Event replayed"
        );
        Ok(outcome)
    }

    async fn replay_created(&self, entity: T) -> Result<ReplayOutcome> {
        let id = self.repository.get_id(&entity).await?;
        if self.repository.exists(id).await? {
            return Ok(ReplayOutcome::SkippedExisting);
        }
        self.repository.create(entity).await?;
        Ok(ReplayOutcome::Applied(EventVerb::Created))
    }

    async fn replay_updated(&self, entity: T) -> Result<ReplayOutcome> {
        let id = self.repository.get_id(&entity).await?;
        if !self.repository.exists(id).await? {
            return Ok(ReplayOutcome::SkippedMissing);
        }
        self.repository.save(entity).await?;
        Ok(ReplayOutcome::Applied(EventVerb::Updated))
    }

    async fn replay_deleted(&self, entity: T) -> Result<ReplayOutcome> {
        match self.repository.delete(entity).await {
            Ok(()) => Ok(ReplayOutcome::Applied(EventVerb::Deleted)),
            Err(RepositoryError::NotFound(_)) => Ok(ReplayOutcome::SkippedMissing),
            Err(e) => Err(e.into()),
        }
    }
}
