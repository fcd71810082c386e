// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background event runner.
//!
//! Connects the transport and replays inbound events until shutdown.
//!
//! # State Transitions
//!
//! ```text
//!          spawn
//! Idle ───────────→ Connecting ──────→ Streaming ────────→ Stopped
//!                      ↑   │  (ok)        │     (shutdown)    ↑
//!                      │   │              │ (retryable error) │
//!                      │   └──→ Backoff ←─┘                   │
//!                      └─────────┘  │ ────────────────────────┘
//!                                   │        (shutdown)
//!                                   ↓
//!                                 Failed  (fatal error, reconnect disabled,
//!                                          or attempts exhausted)
//! ```
//!
//! # Error Handling
//!
//! - Per-event failures (malformed data, bad checksum, undecodable payload)
//!   are logged and the event is skipped.
//! - Repository failures during replay are retried with backoff, then the
//!   event is skipped.
//! - Retryable stream failures trigger a reconnect with exponential backoff;
//!   the transport resumes from the last seen event id.
//! - Anything else ends the runner in `Failed`; [`EventRunner::join`]
//!   returns the error.

use crate::config::RunnerConfig;
use crate::error::{ReplicationError, Result};
use crate::event::Event;
use crate::metrics;
use crate::replay::Replayer;
use crate::repository::{Entity, Repository};
use crate::resilience::RetryConfig;
use crate::transport::{wait_for_shutdown, Transport};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// State of an event runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Spawned, not yet connecting.
    Idle,

    /// Establishing the inbound stream.
    Connecting,

    /// Reading and replaying events.
    Streaming,

    /// Waiting before a reconnect.
    Backoff,

    /// Shut down cleanly. The stream is closed.
    Stopped,

    /// Terminated by an error. See [`EventRunner::join`].
    Failed,
}

impl RunnerState {
    /// Whether the runner task has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunnerState::Stopped | RunnerState::Failed)
    }
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "Idle"),
            RunnerState::Connecting => write!(f, "Connecting"),
            RunnerState::Streaming => write!(f, "Streaming"),
            RunnerState::Backoff => write!(f, "Backoff"),
            RunnerState::Stopped => write!(f, "Stopped"),
            RunnerState::Failed => write!(f, "Failed"),
        }
    }
}

/// Handle to a running event runner.
///
/// Dropping the handle detaches the task; it keeps running until the
/// shutdown signal it was started with fires.
pub struct EventRunner {
    prefix: String,
    state_rx: watch::Receiver<RunnerState>,
    handle: JoinHandle<Result<()>>,
}

impl EventRunner {
    /// Spawn the runner loop on the current tokio runtime.
    pub fn spawn<T, R, Tr>(
        transport: Arc<Tr>,
        replayer: Arc<Replayer<T, R>>,
        shutdown: watch::Receiver<bool>,
        config: RunnerConfig,
    ) -> Self
    where
        T: Entity,
        R: Repository<T> + ?Sized,
        Tr: Transport + ?Sized,
    {
        let prefix = replayer.prefix().to_string();
        let (state_tx, state_rx) = watch::channel(RunnerState::Idle);
        metrics::set_runner_state(&prefix, "Idle");

        let run_loop = RunLoop {
            prefix: prefix.clone(),
            transport,
            replayer,
            reconnect_retry: config.reconnect_retry(),
            replay_retry: config.replay_retry(),
            reconnect: config.reconnect,
            state_tx,
            shutdown,
        };

        let span = info_span!("event_runner", prefix = %prefix);
        let handle = tokio::spawn(run_loop.run().instrument(span));

        Self {
            prefix,
            state_rx,
            handle,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes.
    pub fn state_receiver(&self) -> watch::Receiver<RunnerState> {
        self.state_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the runner to end.
    ///
    /// `Ok(())` after a clean shutdown; the terminating error otherwise.
    pub async fn join(self) -> Result<()> {
        self.handle
            .await
            .map_err(|e| ReplicationError::Internal(format!("event runner task failed: {}", e)))?
    }

    /// Abort the task without a clean disconnect.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

enum AfterFailure {
    Reconnect,
    Stop,
}

struct RunLoop<T: Entity, R: Repository<T> + ?Sized, Tr: Transport + ?Sized> {
    prefix: String,
    transport: Arc<Tr>,
    replayer: Arc<Replayer<T, R>>,
    reconnect_retry: RetryConfig,
    replay_retry: RetryConfig,
    reconnect: bool,
    state_tx: watch::Sender<RunnerState>,
    shutdown: watch::Receiver<bool>,
}

impl<T, R, Tr> RunLoop<T, R, Tr>
where
    T: Entity,
    R: Repository<T> + ?Sized,
    Tr: Transport + ?Sized,
{
    fn set_state(&self, state: RunnerState) {
        metrics::set_runner_state(&self.prefix, &state.to_string());
        let _ = self.state_tx.send(state);
    }

    fn shutdown_signalled(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run(mut self) -> Result<()> {
        info!("Event runner starting");
        // Consecutive failures since the last successful connect
        let mut failures = 0usize;

        loop {
            if self.shutdown_signalled() {
                return self.stop().await;
            }

            self.set_state(RunnerState::Connecting);
            match self.transport.connect(self.shutdown.clone()).await {
                Ok(()) => {
                    if failures > 0 {
                        info!(attempts = failures, "Event stream reconnected");
                    }
                    failures = 0;
                }
                Err(e) => {
                    if self.shutdown_signalled() || matches!(e, ReplicationError::Shutdown) {
                        return self.stop().await;
                    }
                    failures += 1;
                    match self.after_failure(e, failures).await? {
                        AfterFailure::Reconnect => continue,
                        AfterFailure::Stop => return self.stop().await,
                    }
                }
            }

            self.set_state(RunnerState::Streaming);
            info!("Event runner streaming");
            match self.stream().await {
                Ok(()) => return self.stop().await,
                Err(e) => {
                    failures += 1;
                    match self.after_failure(e, failures).await? {
                        AfterFailure::Reconnect => continue,
                        AfterFailure::Stop => return self.stop().await,
                    }
                }
            }
        }
    }

    /// Read and replay until shutdown (`Ok`) or a stream error (`Err`).
    async fn stream(&mut self) -> Result<()> {
        loop {
            if self.shutdown_signalled() {
                return Ok(());
            }

            let event = match self.transport.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) if e.is_skippable() => {
                    warn!(error = %e, "Dropping undecodable event");
                    metrics::record_event_dropped(&self.prefix, "decode");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.replay(&event).await;
        }
    }

    /// Replay one event, retrying transient repository failures.
    ///
    /// Never fails the runner: an event that cannot be applied is skipped.
    async fn replay(&mut self, event: &Event) {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let err = match self.replayer.dispatch(event).await {
                Ok(_) => return,
                Err(e) => e,
            };

            if err.is_retryable() && self.replay_retry.allows_retry(attempt) {
                let delay = self.replay_retry.delay_for_attempt(attempt);
                warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Replay failed, retrying"
                );
                tokio::select! {
                    biased;

                    _ = wait_for_shutdown(&mut self.shutdown) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            let reason = if err.is_skippable() {
                "payload"
            } else if err.is_retryable() {
                "replay_exhausted"
            } else {
                "replay_rejected"
            };
            error!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                attempt,
                reason,
                error = %err,
                "Skipping event"
            );
            metrics::record_event_dropped(&self.prefix, reason);
            return;
        }
    }

    /// Decide between backoff-then-reconnect and failing.
    async fn after_failure(
        &mut self,
        err: ReplicationError,
        attempt: usize,
    ) -> Result<AfterFailure> {
        let exhausted = !self.reconnect_retry.allows_retry(attempt - 1);
        if !err.is_retryable() || !self.reconnect || exhausted {
            error!(
                attempt,
                retryable = err.is_retryable(),
                reconnect = self.reconnect,
                error = %err,
                "Event runner failed"
            );
            metrics::record_error(&self.prefix, "runner_failed");
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Disconnect after failure also failed");
            }
            self.set_state(RunnerState::Failed);
            return Err(err);
        }

        let delay = self.reconnect_retry.delay_for_attempt(attempt);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Event stream lost, reconnecting after backoff"
        );
        metrics::record_reconnect(&self.prefix);
        self.set_state(RunnerState::Backoff);

        tokio::select! {
            biased;

            _ = wait_for_shutdown(&mut self.shutdown) => Ok(AfterFailure::Stop),
            _ = tokio::time::sleep(delay) => Ok(AfterFailure::Reconnect),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        debug!("Shutdown signalled, disconnecting transport");
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Disconnect on shutdown failed");
        }
        self.set_state(RunnerState::Stopped);
        info!("Event runner stopped");
        Ok(())
    }
}
