//! # Event Replication
//!
//! Event-sourced replication of repositories between replicas over an
//! HTTP collector and a server-sent events stream.
//!
//! ## Architecture
//!
//! Mutations are published as events; every replica (including the
//! publisher) applies them when they come back through the stream:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                           event-replication                            │
//! │                                                                        │
//! │  create/save/delete                                                    │
//! │         │                                                              │
//! │         ▼                                                              │
//! │  ┌──────────────┐  Event   ┌───────────────┐   POST   ┌────────────┐   │
//! │  │ EventService │────────► │ HttpTransport │────────► │ collector  │   │
//! │  └──────────────┘          └───────────────┘          └─────┬──────┘   │
//! │         ▲                          ▲                        │          │
//! │  get/get_all/exists                │ SSE (Last-Event-ID)    │          │
//! │         │                          │                        ▼          │
//! │  ┌──────────────┐  replay  ┌───────┴───────┐          ┌────────────┐   │
//! │  │  Repository  │◄──────── │  EventRunner  │◄──────── │   stream   │   │
//! │  │  (any store) │ Replayer └───────────────┘          └────────────┘   │
//! │  └──────────────┘                                                      │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotent Replay
//!
//! Events may be delivered more than once (reconnects resume from the last
//! seen id). Replay is idempotent: a duplicate `Created` is skipped, an
//! `Updated` for an unknown id is skipped, and a `Deleted` for an unknown
//! id is tolerated.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_replication::{BaseEntity, EventService, InMemoryRepository, ReplicationConfig};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> event_replication::Result<()> {
//!     let config = ReplicationConfig::default();
//!     let repo = Arc::new(InMemoryRepository::<BaseEntity<u64>>::new());
//!     let service: EventService<BaseEntity<u64>, _, _> = EventService::from_config(repo, &config)?;
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let runner = service.start_event_runner(shutdown_rx);
//!
//!     service.create(&BaseEntity::new(7)).await?;
//!
//!     // Runner replays until shutdown signal
//!     shutdown_tx.send(true).ok();
//!     runner.join().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod replay;
pub mod repository;
pub mod resilience;
pub mod runner;
pub mod service;
pub mod transport;

// Re-exports for convenience
pub use config::{HttpTransportConfig, ReplicationConfig, RunnerConfig};
pub use error::{ReplicationError, Result};
pub use event::{Event, EventVerb, EVENT_VERSION};
pub use replay::{ReplayOutcome, Replayer};
pub use repository::{BaseEntity, Entity, InMemoryRepository, Repository, RepositoryError};
pub use runner::{EventRunner, RunnerState};
pub use service::EventService;
pub use transport::{HttpTransport, Transport};
