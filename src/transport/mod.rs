// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event transport abstraction.
//!
//! A [`Transport`] moves [`Event`]s between replicas: `post_event` publishes
//! one event to a remote collector, `next_event` yields events from a live
//! inbound stream in order.
//!
//! # Implementing
//!
//! Methods take `&self` and return boxed futures, so a transport can be
//! shared behind an `Arc` and used as `dyn Transport`. Implementations
//! keep their connection state behind interior mutability.
//!
//! Publishing may be shared by any number of services. The inbound stream
//! has a single consumer: start at most one runner per transport, since
//! a second `connect` replaces the first runner's stream.
//!
//! ```rust,no_run
//! use event_replication::event::Event;
//! use event_replication::transport::{Transport, TransportFuture};
//! use tokio::sync::watch;
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     fn connect(&self, _shutdown: watch::Receiver<bool>) -> TransportFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//!     fn post_event(&self, _event: Event) -> TransportFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//!     fn next_event(&self) -> TransportFuture<'_, Option<Event>> {
//!         Box::pin(async { Ok(None) })
//!     }
//! }
//! ```

pub mod http;
pub mod sse;

pub use http::HttpTransport;

use crate::error::Result;
use crate::event::Event;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Publishes events and yields events from an inbound stream.
pub trait Transport: Send + Sync + 'static {
    /// Establish (or resume) the inbound stream.
    ///
    /// The shutdown receiver is kept and raced against every later read.
    fn connect(&self, shutdown: watch::Receiver<bool>) -> TransportFuture<'_, ()>;

    /// Publish one event. Resolves once the collector has answered.
    fn post_event(&self, event: Event) -> TransportFuture<'_, ()>;

    /// Wait for the next event. `Ok(None)` means shutdown was signalled.
    fn next_event(&self) -> TransportFuture<'_, Option<Event>>;

    /// Drop the inbound stream.
    fn disconnect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn connect(&self, shutdown: watch::Receiver<bool>) -> TransportFuture<'_, ()> {
        (**self).connect(shutdown)
    }

    fn post_event(&self, event: Event) -> TransportFuture<'_, ()> {
        (**self).post_event(event)
    }

    fn next_event(&self) -> TransportFuture<'_, Option<Event>> {
        (**self).next_event()
    }

    fn disconnect(&self) -> TransportFuture<'_, ()> {
        (**self).disconnect()
    }
}

/// Resolve once `true` has been sent on the shutdown channel.
///
/// If every sender is dropped without signalling, this never resolves.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
