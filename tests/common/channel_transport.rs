//! In-process loopback transport for testing.
//!
//! `post_event` records the event and feeds it straight back into the
//! inbound queue, so a service replays its own mutations the way it would
//! through a real collector. Tests can also inject events and errors.

use event_replication::event::Event;
use event_replication::transport::{Transport, TransportFuture};
use event_replication::ReplicationError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, watch, Mutex};

enum Inbound {
    Event(Event),
    Error(ReplicationError),
}

/// Loopback transport with scripted failures.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Inbound>,
    rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    shutdown: StdMutex<Option<watch::Receiver<bool>>>,
    posted: StdMutex<Vec<Event>>,
    loopback: bool,
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    /// Remaining connects to fail with `StreamClosed`
    failing_connects: AtomicUsize,
    /// Status returned by every publish when set
    post_status: StdMutex<Option<u16>>,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTransport {
    /// Loopback: every posted event is also delivered inbound.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            shutdown: StdMutex::new(None),
            posted: StdMutex::new(Vec::new()),
            loopback: true,
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            failing_connects: AtomicUsize::new(0),
            post_status: StdMutex::new(None),
        }
    }

    /// Posted events are recorded but not delivered inbound.
    pub fn sink() -> Self {
        Self {
            loopback: false,
            ..Self::new()
        }
    }

    /// Deliver an event on the inbound stream.
    pub fn inject(&self, event: Event) {
        let _ = self.tx.send(Inbound::Event(event));
    }

    /// Deliver an error from the next read.
    pub fn inject_error(&self, err: ReplicationError) {
        let _ = self.tx.send(Inbound::Error(err));
    }

    /// Fail the next `n` connects.
    pub fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make every publish fail with `status`.
    pub fn reject_posts_with(&self, status: u16) {
        *self.post_status.lock().unwrap() = Some(status);
    }

    pub fn posted(&self) -> Vec<Event> {
        self.posted.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

async fn signalled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Transport for ChannelTransport {
    fn connect(&self, shutdown: watch::Receiver<bool>) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failing_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(ReplicationError::StreamClosed);
            }
            *self.shutdown.lock().unwrap() = Some(shutdown);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn post_event(&self, mut event: Event) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if let Some(status) = *self.post_status.lock().unwrap() {
                return Err(ReplicationError::UnexpectedStatus {
                    operation: "post_event",
                    status,
                });
            }
            event.seal()?;
            self.posted.lock().unwrap().push(event.clone());
            if self.loopback {
                let _ = self.tx.send(Inbound::Event(event));
            }
            Ok(())
        })
    }

    fn next_event(&self) -> TransportFuture<'_, Option<Event>> {
        Box::pin(async move {
            let mut shutdown = self
                .shutdown
                .lock()
                .unwrap()
                .clone()
                .ok_or(ReplicationError::NotConnected)?;
            let mut rx = self.rx.lock().await;

            tokio::select! {
                biased;

                _ = signalled(&mut shutdown) => {
                    self.connected.store(false, Ordering::SeqCst);
                    Ok(None)
                }
                inbound = rx.recv() => match inbound {
                    Some(Inbound::Event(event)) => Ok(Some(event)),
                    Some(Inbound::Error(err)) => Err(err),
                    None => Err(ReplicationError::StreamClosed),
                },
            }
        })
    }

    fn disconnect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}
