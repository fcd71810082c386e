//! Recording repository for testing.
//!
//! Wraps an [`InMemoryRepository`] and records every call so tests can
//! assert exactly what replay did. Mutating calls can be made to fail
//! with a retryable backend error.

use event_replication::repository::{BoxFuture, Entity, InMemoryRepository, Repository, RepositoryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A recorded repository call, e.g. `("create", "1")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCall {
    pub op: &'static str,
    pub id: String,
}

/// Recording repository with failure injection.
///
/// # Example
/// ```rust,ignore
/// let repo = MockRepository::<Item>::new();
/// repo.fail_next_writes(2);
/// // ... replay events ...
/// assert_eq!(repo.calls_for("create").len(), 1);
/// ```
pub struct MockRepository<T: Entity> {
    inner: InMemoryRepository<T>,
    calls: Mutex<Vec<RepoCall>>,
    /// Remaining writes to fail with `Backend`
    failing_writes: AtomicUsize,
}

impl<T: Entity> Default for MockRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MockRepository<T> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            calls: Mutex::new(Vec::new()),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` create/save/delete calls with a backend error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of one operation.
    pub fn calls_for(&self, op: &str) -> Vec<RepoCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Direct access to the backing store, bypassing recording.
    pub fn inner(&self) -> &InMemoryRepository<T> {
        &self.inner
    }

    fn record(&self, op: &'static str, id: &T::Id) {
        self.calls.lock().unwrap().push(RepoCall {
            op,
            id: format!("{:?}", id).trim_matches('"').to_string(),
        });
    }

    fn injected_failure(&self) -> Option<RepositoryError> {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| RepositoryError::Backend("injected failure".to_string()))
    }
}

impl<T: Entity> Repository<T> for MockRepository<T> {
    fn create(&self, entity: T) -> BoxFuture<'_, ()> {
        self.record("create", &entity.id());
        Box::pin(async move {
            if let Some(err) = self.injected_failure() {
                return Err(err);
            }
            self.inner.create(entity).await
        })
    }

    fn save(&self, entity: T) -> BoxFuture<'_, ()> {
        self.record("save", &entity.id());
        Box::pin(async move {
            if let Some(err) = self.injected_failure() {
                return Err(err);
            }
            self.inner.save(entity).await
        })
    }

    fn get(&self, id: T::Id) -> BoxFuture<'_, Option<T>> {
        self.record("get", &id);
        self.inner.get(id)
    }

    fn get_all(&self) -> BoxFuture<'_, Vec<T>> {
        self.calls.lock().unwrap().push(RepoCall {
            op: "get_all",
            id: String::new(),
        });
        self.inner.get_all()
    }

    fn delete(&self, entity: T) -> BoxFuture<'_, ()> {
        self.record("delete", &entity.id());
        Box::pin(async move {
            if let Some(err) = self.injected_failure() {
                return Err(err);
            }
            self.inner.delete(entity).await
        })
    }

    fn exists(&self, id: T::Id) -> BoxFuture<'_, bool> {
        self.record("exists", &id);
        self.inner.exists(id)
    }
}
