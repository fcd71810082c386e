// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP collector + server-sent events transport.
//!
//! Publishing `POST`s the event JSON to the collector, which must answer
//! `201 Created`. Receiving holds one streaming `GET` open against the
//! stream endpoint and parses it as server-sent events.
//!
//! # Resume
//!
//! Every `id:` line is remembered. A reconnect sends it as `Last-Event-ID`
//! so the server can replay what this replica missed.
//!
//! # Cancellation
//!
//! Each chunk read races the shutdown receiver passed to `connect`. When
//! shutdown wins, the response body is dropped (closing the connection)
//! and `next_event` returns `Ok(None)`. A chunk read that exceeds
//! `read_timeout` drops the connection and reports `StreamIdle`.
//!
//! # Locking
//!
//! A pending read checks the connection out of the shared state and holds
//! no lock while waiting on the network. `disconnect` or a new `connect`
//! bumps the stream epoch, which wakes the reader and makes it discard the
//! connection it holds.

use super::sse::{parse_line, LineBuffer, SseLine};
use super::{wait_for_shutdown, Transport, TransportFuture};
use crate::config::HttpTransportConfig;
use crate::error::{ReplicationError, Result};
use crate::event::Event;
use crate::metrics;
use crate::resilience::RetryConfig;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, trace, warn};

/// Header carrying the resume position on reconnect.
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// An open event stream.
struct SseConnection {
    response: reqwest::Response,
    lines: LineBuffer,
}

/// Inbound stream bookkeeping. Never held across network I/O.
#[derive(Default)]
struct StreamState {
    /// Idle connection, or `None` while a reader has it checked out.
    connection: Option<SseConnection>,
    reading: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl StreamState {
    fn is_open(&self) -> bool {
        self.connection.is_some() || self.reading
    }
}

/// Wait until the stream epoch moves past `epoch`.
async fn wait_for_replacement(epochs: &mut watch::Receiver<u64>, epoch: u64) {
    let replaced = epochs.wait_for(|current| *current != epoch).await.is_ok();
    if !replaced {
        std::future::pending::<()>().await;
    }
}

/// Transport over HTTP `POST` (publish) and SSE (receive).
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
    retry: RetryConfig,
    read_timeout: Duration,
    stream: Mutex<StreamState>,
    /// Survives reconnects.
    last_event_id: Mutex<Option<String>>,
    /// One `next_event` at a time.
    read_lock: Mutex<()>,
    /// Bumped whenever the stream is dropped or replaced.
    epoch: watch::Sender<u64>,
}

impl HttpTransport {
    /// Create a transport with default timeouts.
    pub fn new(post_url: &str, stream_url: &str, max_retries: usize) -> Result<Self> {
        Self::from_config(HttpTransportConfig {
            post_url: post_url.to_string(),
            stream_url: stream_url.to_string(),
            max_retries,
            ..Default::default()
        })
    }

    /// Create a transport from configuration.
    pub fn from_config(config: HttpTransportConfig) -> Result<Self> {
        config.validate()?;
        let retry = config.retry_config();
        let client = reqwest::Client::builder()
            .connect_timeout(retry.connection_timeout)
            .build()
            .map_err(|e| ReplicationError::http("build_client", e))?;
        let (epoch, _) = watch::channel(0);

        Ok(Self {
            client,
            retry,
            read_timeout: config.read_timeout_duration(),
            config,
            stream: Mutex::new(StreamState::default()),
            last_event_id: Mutex::new(None),
            read_lock: Mutex::new(()),
            epoch,
        })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Last `id:` seen on the stream, sent as `Last-Event-ID` on reconnect.
    pub async fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().await.clone()
    }

    /// Override the resume position (e.g. from a persisted checkpoint).
    pub async fn set_last_event_id(&self, id: Option<String>) {
        *self.last_event_id.lock().await = id;
    }

    /// Whether a stream is currently open, including one being read.
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_open()
    }

    /// Drop the stream and wake any pending read. Caller holds the state lock.
    fn drop_stream(&self, state: &mut StreamState) {
        state.connection = None;
        state.reading = false;
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Return a checked-out connection, unless the stream was dropped or
    /// replaced while it was out.
    async fn check_in(&self, connection: Option<SseConnection>, epoch: u64) {
        let mut state = self.stream.lock().await;
        let current = *self.epoch.borrow();
        if current == epoch {
            state.connection = connection;
            state.reading = false;
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => {
                    if tries > 1 {
                        info!(operation, attempt = tries, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && self.retry.allows_retry(tries) => {
                    let delay = self.retry.delay_for_attempt(tries);
                    warn!(
                        operation,
                        attempt = tries,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    metrics::record_http_retry(operation);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(&self.config.post_url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.retry.connection_timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| ReplicationError::http("post_event", e))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(ReplicationError::UnexpectedStatus {
                operation: "post_event",
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn publish(&self, mut event: Event) -> Result<()> {
        event.seal()?;
        let body = event.encode()?;

        self.with_retry("post_event", || self.post_once(body.clone()))
            .await?;

        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Event posted"
        );
        Ok(())
    }

    async fn open_once(&self, last_event_id: Option<String>) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .get(&self.config.stream_url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID, id);
        }

        // Not RequestBuilder::timeout: that would also bound the body, which never ends
        let timeout = self.retry.connection_timeout;
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| ReplicationError::Timeout {
                operation: "connect",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| ReplicationError::http("connect", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplicationError::UnexpectedStatus {
                operation: "connect",
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn open_stream(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        {
            let mut state = self.stream.lock().await;
            self.drop_stream(&mut state);
            state.shutdown = Some(shutdown.clone());
        }
        let last_event_id = self.last_event_id().await;

        info!(
            url = %self.config.stream_url,
            last_event_id = last_event_id.as_deref().unwrap_or(""),
            "Connecting to event stream"
        );

        let mut shutdown = shutdown;
        let result = tokio::select! {
            biased;

            _ = wait_for_shutdown(&mut shutdown) => Err(ReplicationError::Shutdown),
            result = self.with_retry("connect", || self.open_once(last_event_id.clone())) => result,
        };

        match result {
            Ok(response) => {
                metrics::record_stream_connection(true);
                info!(url = %response.url(), "Connected to event stream");
                self.stream.lock().await.connection = Some(SseConnection {
                    response,
                    lines: LineBuffer::new(),
                });
                Ok(())
            }
            Err(e) => {
                metrics::record_stream_connection(false);
                Err(e)
            }
        }
    }

    fn decode_data(&self, data: &str) -> Result<Event> {
        let event = if self.config.verify_checksums {
            Event::decode_verified(data)?
        } else {
            Event::decode(data)?
        };
        metrics::record_event_received(&event.event_type);
        trace!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Received event"
        );
        Ok(event)
    }

    async fn read_event(&self) -> Result<Option<Event>> {
        let _reader = self.read_lock.lock().await;

        let (mut conn, epoch, mut shutdown) = {
            let mut state = self.stream.lock().await;
            let shutdown = state
                .shutdown
                .clone()
                .ok_or(ReplicationError::NotConnected)?;
            let signalled = *shutdown.borrow();
            if signalled {
                if state.is_open() {
                    debug!("Shutdown signalled, closing event stream");
                    self.drop_stream(&mut state);
                }
                return Ok(None);
            }

            let conn = state
                .connection
                .take()
                .ok_or(ReplicationError::NotConnected)?;
            state.reading = true;
            let epoch = *self.epoch.borrow();
            (conn, epoch, shutdown)
        };
        let mut epochs = self.epoch.subscribe();

        loop {
            let signalled = *shutdown.borrow();
            if signalled {
                debug!("Shutdown signalled, closing event stream");
                self.check_in(None, epoch).await;
                return Ok(None);
            }

            while let Some(line) = conn.lines.next_line() {
                match parse_line(&line) {
                    SseLine::Data(data) => {
                        let result = self.decode_data(data);
                        self.check_in(Some(conn), epoch).await;
                        return result.map(Some);
                    }
                    SseLine::Id(id) => {
                        trace!(id, "Event id");
                        *self.last_event_id.lock().await = Some(id.to_string());
                    }
                    SseLine::Event(name) => trace!(event = name, "Event type"),
                    SseLine::Retry(hint) => trace!(retry = hint, "Server retry hint ignored"),
                    SseLine::Comment(_) | SseLine::Blank => {}
                    SseLine::Unknown(field) => trace!(field, "Unknown SSE field"),
                }
            }

            let read = tokio::select! {
                biased;

                // Loop top sees the signal and closes
                _ = wait_for_shutdown(&mut shutdown) => continue,
                _ = wait_for_replacement(&mut epochs, epoch) => {
                    debug!("Event stream dropped during read");
                    return Err(ReplicationError::NotConnected);
                }
                chunk = tokio::time::timeout(self.read_timeout, conn.response.chunk()) => chunk,
            };

            match read {
                Err(_elapsed) => {
                    self.check_in(None, epoch).await;
                    warn!(
                        idle_ms = self.read_timeout.as_millis() as u64,
                        "Event stream idle, dropping connection"
                    );
                    return Err(ReplicationError::StreamIdle {
                        idle_ms: self.read_timeout.as_millis() as u64,
                    });
                }
                Ok(Err(e)) => {
                    self.check_in(None, epoch).await;
                    return Err(ReplicationError::http("next_event", e));
                }
                Ok(Ok(None)) => {
                    self.check_in(None, epoch).await;
                    info!("Event stream closed by server");
                    return Err(ReplicationError::StreamClosed);
                }
                Ok(Ok(Some(bytes))) => {
                    metrics::record_stream_bytes(bytes.len());
                    conn.lines.push(&bytes);
                }
            }
        }
    }

    async fn close_stream(&self) -> Result<()> {
        let mut state = self.stream.lock().await;
        if state.is_open() {
            info!(url = %self.config.stream_url, "Disconnecting from event stream");
        }
        self.drop_stream(&mut state);
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn connect(&self, shutdown: watch::Receiver<bool>) -> TransportFuture<'_, ()> {
        Box::pin(self.open_stream(shutdown))
    }

    fn post_event(&self, event: Event) -> TransportFuture<'_, ()> {
        Box::pin(self.publish(event))
    }

    fn next_event(&self) -> TransportFuture<'_, Option<Event>> {
        Box::pin(self.read_event())
    }

    fn disconnect(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.close_stream())
    }
}
