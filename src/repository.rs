// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity and repository contracts.
//!
//! Defines what a replicated item must expose ([`Entity`]) and the store
//! capabilities the event layer needs ([`Repository`]). Backends implement
//! [`Repository`]; [`InMemoryRepository`] is the reference implementation.
//!
//! # Example
//!
//! ```rust,no_run
//! use event_replication::repository::{BoxFuture, Entity, Repository};
//!
//! struct MyBackend { /* ... */ }
//!
//! impl<T: Entity> Repository<T> for MyBackend {
//!     fn create(&self, _entity: T) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn save(&self, _entity: T) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn get(&self, _id: T::Id) -> BoxFuture<'_, Option<T>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn get_all(&self) -> BoxFuture<'_, Vec<T>> {
//!         Box::pin(async move { Ok(Vec::new()) })
//!     }
//!
//!     fn delete(&self, _entity: T) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn exists(&self, _id: T::Id) -> BoxFuture<'_, bool> {
//!         Box::pin(async move { Ok(false) })
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use tokio::sync::RwLock;

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = RepoResult<T>> + Send + 'a>>;

/// Errors reported by a repository backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// `create` was called for an id that is already stored.
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    /// `save` or `delete` was called for an id that is not stored.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// The backend itself failed (connection, storage, serialization).
    #[error("backend failure: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// Backend failures may succeed on retry; contract violations never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// A versioned, uniquely identified domain object.
///
/// The id is assigned before the entity reaches any repository and never
/// changes. The version is advanced by the owning store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Identity key.
    type Id: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
    fn creation_date(&self) -> DateTime<Utc>;
    fn last_update_date(&self) -> DateTime<Utc>;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn set_last_update_date(&mut self, at: DateTime<Utc>);
    fn set_creation_date(&mut self, at: DateTime<Utc>);
}

/// Common entity fields, usable on its own or embedded in a domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEntity<I> {
    pub id: I,
    pub last_update_date: DateTime<Utc>,
    pub creation_date: DateTime<Utc>,
    pub version: i64,
}

impl<I> BaseEntity<I> {
    /// New entity stamped with the current time and version 1.
    pub fn new(id: I) -> Self {
        let now = Utc::now();
        Self {
            id,
            last_update_date: now,
            creation_date: now,
            version: 1,
        }
    }
}

impl<I> Entity for BaseEntity<I>
where
    I: Serialize + DeserializeOwned + Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    type Id = I;

    fn id(&self) -> I {
        self.id.clone()
    }

    fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    fn last_update_date(&self) -> DateTime<Utc> {
        self.last_update_date
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn set_last_update_date(&mut self, at: DateTime<Utc>) {
        self.last_update_date = at;
    }

    fn set_creation_date(&mut self, at: DateTime<Utc>) {
        self.creation_date = at;
    }
}

/// CRUD store for one entity kind.
///
/// This is everything the event layer needs from storage:
/// 1. Apply replicated changes (`create`, `save`, `delete`)
/// 2. Probe for idempotency (`exists`, `get_id`)
/// 3. Serve reads through the service (`get`, `get_all`)
///
/// Cancellation is expressed by dropping the returned future.
pub trait Repository<T: Entity>: Send + Sync + 'static {
    /// Store a new entity. Fails with [`RepositoryError::AlreadyExists`] if the id is taken.
    fn create(&self, entity: T) -> BoxFuture<'_, ()>;

    /// Replace a stored entity. Fails with [`RepositoryError::NotFound`] if absent.
    fn save(&self, entity: T) -> BoxFuture<'_, ()>;

    /// Fetch by id. Absence is `Ok(None)`, never an error.
    fn get(&self, id: T::Id) -> BoxFuture<'_, Option<T>>;

    /// Fetch everything currently stored.
    fn get_all(&self) -> BoxFuture<'_, Vec<T>>;

    /// Remove the entity with the same id as `entity`.
    fn delete(&self, entity: T) -> BoxFuture<'_, ()>;

    /// Check whether an id is stored.
    fn exists(&self, id: T::Id) -> BoxFuture<'_, bool>;

    /// Derive the storage key for an entity.
    ///
    /// Default implementation returns [`Entity::id`].
    fn get_id(&self, entity: &T) -> BoxFuture<'_, T::Id> {
        let id = entity.id();
        Box::pin(async move { Ok(id) })
    }
}

/// In-process repository backed by a `HashMap`.
///
/// `save` advances the stored version by one and stamps `last_update_date`.
pub struct InMemoryRepository<T: Entity> {
    entities: RwLock<HashMap<T::Id, T>>,
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entities.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn create(&self, entity: T) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let id = entity.id();
            let mut entities = self.entities.write().await;
            if entities.contains_key(&id) {
                return Err(RepositoryError::AlreadyExists(format!("{:?}", id)));
            }
            tracing::trace!(id = ?id, "InMemory: created entity");
            entities.insert(id, entity);
            Ok(())
        })
    }

    fn save(&self, mut entity: T) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let id = entity.id();
            let mut entities = self.entities.write().await;
            let Some(stored) = entities.get(&id) else {
                return Err(RepositoryError::NotFound(format!("{:?}", id)));
            };
            entity.set_version(stored.version() + 1);
            entity.set_last_update_date(Utc::now());
            tracing::trace!(id = ?id, version = entity.version(), "InMemory: saved entity");
            entities.insert(id, entity);
            Ok(())
        })
    }

    fn get(&self, id: T::Id) -> BoxFuture<'_, Option<T>> {
        Box::pin(async move { Ok(self.entities.read().await.get(&id).cloned()) })
    }

    fn get_all(&self) -> BoxFuture<'_, Vec<T>> {
        Box::pin(async move { Ok(self.entities.read().await.values().cloned().collect()) })
    }

    fn delete(&self, entity: T) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let id = entity.id();
            match self.entities.write().await.remove(&id) {
                Some(_) => Ok(()),
                None => Err(RepositoryError::NotFound(format!("{:?}", id))),
            }
        })
    }

    fn exists(&self, id: T::Id) -> BoxFuture<'_, bool> {
        Box::pin(async move { Ok(self.entities.read().await.contains_key(&id)) })
    }
}
