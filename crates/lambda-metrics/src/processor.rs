// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point: accepts observations and owns the background flush loop.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──start()──> Running ──stop()──> Stopped
//!     │                                     ^
//!     └───────────────stop()────────────────┘
//! ```
//!
//! Observations are accepted while `Idle` or `Running`. While running, the open batch is
//! closed and shipped on every tick of the time service ticker and whenever it reaches the
//! configured number of points. `stop()` closes the batch one last time and does not return
//! until that delivery, retries included, has finished.
//!
//! # Flush boundary
//!
//! The open batch lives behind a single mutex. Merging an observation and swapping the open
//! batch for an empty one both happen under that lock, so an observation lands in exactly one
//! batch and a closed batch is never written to again. Delivery runs after the lock is
//! released; producers keep filling the next batch while the previous one is in flight.

use crate::batch::Batch;
use crate::client::Client;
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
use crate::error::ProcessorError;
use crate::metric::Distribution;
use crate::retry::{DeliveryStatsSnapshot, FailureHook, Retrier, RetryStrategy};
use crate::time::{unix_seconds, Ticker, TimeService};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone)]
pub struct ProcessorConfig {
    /// Period of the scheduled flush.
    pub flush_interval: Duration,
    /// Points in the open batch that trigger an out-of-cycle flush.
    pub batch_size_limit: usize,
    pub retry_strategy: RetryStrategy,
    /// Called for every batch dropped after its last failed attempt.
    pub on_failure: Option<FailureHook>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch_size_limit: DEFAULT_BATCH_SIZE,
            retry_strategy: RetryStrategy::default(),
            on_failure: None,
        }
    }
}

impl Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("flush_interval", &self.flush_interval)
            .field("batch_size_limit", &self.batch_size_limit)
            .field("retry_strategy", &self.retry_strategy)
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

struct OpenBatch {
    batch: Batch,
    /// Set by the final flush; no observation is merged afterwards.
    closed: bool,
}

struct Shared {
    open: Mutex<OpenBatch>,
    time_service: Arc<dyn TimeService>,
    retrier: Retrier,
    batch_size_limit: usize,
    size_limit_reached: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, OpenBatch> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps the open batch for an empty one and returns the closed batch.
    fn detach(&self, close: bool) -> Batch {
        let mut open = self.lock();
        open.closed |= close;
        std::mem::take(&mut open.batch)
    }

    fn limit_reached(&self) -> bool {
        self.lock().batch.point_count() >= self.batch_size_limit
    }

    async fn flush(&self, close: bool) {
        self.deliver(self.detach(close)).await;
    }

    async fn deliver(&self, batch: Batch) {
        if batch.is_empty() {
            debug!("METRICS | Nothing to flush");
            return;
        }
        debug!(
            "METRICS | Flushing {} series ({} points)",
            batch.len(),
            batch.point_count()
        );
        let metrics = batch.into_metrics();
        self.retrier.deliver(&metrics).await;
    }
}

struct Lifecycle {
    status: Status,
    cancel_token: Option<CancellationToken>,
    flush_task: Option<JoinHandle<()>>,
}

pub struct Processor {
    shared: Arc<Shared>,
    flush_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl Processor {
    /// Builds a processor with the default flush interval.
    ///
    /// `should_retry` selects between three attempts per batch and a single attempt.
    pub fn new(
        client: Arc<dyn Client>,
        time_service: Arc<dyn TimeService>,
        batch_size_limit: usize,
        should_retry: bool,
    ) -> Self {
        Self::with_config(
            client,
            time_service,
            ProcessorConfig {
                batch_size_limit,
                retry_strategy: RetryStrategy::from_flag(should_retry),
                ..ProcessorConfig::default()
            },
        )
    }

    /// Builds a processor from a full configuration.
    ///
    /// A `batch_size_limit` of 0 is raised to 1, so every accepted point triggers a flush.
    pub fn with_config(
        client: Arc<dyn Client>,
        time_service: Arc<dyn TimeService>,
        config: ProcessorConfig,
    ) -> Self {
        if config.batch_size_limit == 0 {
            warn!("METRICS | Batch size limit of 0 raised to 1");
        }
        let retrier =
            Retrier::new(client, config.retry_strategy).with_failure_hook(config.on_failure);
        Self {
            shared: Arc::new(Shared {
                open: Mutex::new(OpenBatch {
                    batch: Batch::new(),
                    closed: false,
                }),
                time_service,
                retrier,
                batch_size_limit: config.batch_size_limit.max(1),
                size_limit_reached: Notify::new(),
            }),
            flush_interval: config.flush_interval,
            lifecycle: Mutex::new(Lifecycle {
                status: Status::Idle,
                cancel_token: None,
                flush_task: None,
            }),
        }
    }

    /// Merges `distribution` into the open batch, stamping its points with the current time.
    ///
    /// Accepted before `start()`; rejected once `stop()` has closed the last batch.
    pub fn add_metric(&self, distribution: Distribution) -> Result<(), ProcessorError> {
        let limit_reached = {
            let mut open = self.shared.lock();
            if open.closed {
                drop(open);
                warn!(
                    "METRICS | Dropping metric {} recorded after shutdown",
                    distribution.name
                );
                return Err(ProcessorError::Stopped);
            }
            let timestamp = unix_seconds(self.shared.time_service.now());
            open.batch.add(&distribution, timestamp);
            open.batch.point_count() >= self.shared.batch_size_limit
        };

        if limit_reached {
            self.shared.size_limit_reached.notify_one();
        }
        Ok(())
    }

    /// Spawns the flush loop on the current tokio runtime.
    pub fn start(&self) -> Result<(), ProcessorError> {
        let mut lifecycle = self.lifecycle();
        match lifecycle.status {
            Status::Running => return Err(ProcessorError::AlreadyStarted),
            Status::Stopped => return Err(ProcessorError::Stopped),
            Status::Idle => {}
        }

        let ticker = self.shared.time_service.new_ticker(self.flush_interval);
        let cancel_token = CancellationToken::new();
        let flush_task = tokio::spawn(run_flush_loop(
            Arc::clone(&self.shared),
            ticker,
            cancel_token.clone(),
        ));

        lifecycle.status = Status::Running;
        lifecycle.cancel_token = Some(cancel_token);
        lifecycle.flush_task = Some(flush_task);
        debug!(
            "METRICS | Processor started, flushing every {:?}",
            self.flush_interval
        );
        Ok(())
    }

    /// Flushes whatever is still open and waits for its delivery to finish.
    pub async fn stop(&self) -> Result<(), ProcessorError> {
        let (cancel_token, flush_task) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.status == Status::Stopped {
                return Err(ProcessorError::Stopped);
            }
            lifecycle.status = Status::Stopped;
            (lifecycle.cancel_token.take(), lifecycle.flush_task.take())
        };

        if let Some(cancel_token) = cancel_token {
            cancel_token.cancel();
        }

        match flush_task {
            Some(flush_task) => {
                if let Err(e) = flush_task.await {
                    error!("METRICS | Flush loop exited abnormally: {e}");
                    self.shared.flush(true).await;
                }
            }
            // Never started: flush inline.
            None => self.shared.flush(true).await,
        }

        debug!("METRICS | Processor stopped");
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.lifecycle().status
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.shared.retrier.stats()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        // The loop still ships the open batch on its way out.
        if let Some(cancel_token) = self.lifecycle().cancel_token.take() {
            cancel_token.cancel();
        }
    }
}

async fn run_flush_loop(
    shared: Arc<Shared>,
    mut ticker: Box<dyn Ticker>,
    cancel_token: CancellationToken,
) {
    debug!("METRICS | Flush loop started");

    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => break,
            tick = ticker.tick() => {
                let batch = shared.detach(false);
                // Points added from here on belong to the next batch.
                tick.handled();
                shared
                    .deliver(batch)
                    .instrument(debug_span!("flush", reason = "tick"))
                    .await;
            }
            () = shared.size_limit_reached.notified() => {
                // The wakeup may predate a tick flush that already took those points.
                if !shared.limit_reached() {
                    debug!("METRICS | Size limit no longer reached, skipping flush");
                    continue;
                }
                shared
                    .flush(false)
                    .instrument(debug_span!("flush", reason = "size_limit"))
                    .await;
            }
        }
    }

    shared
        .flush(true)
        .instrument(debug_span!("flush", reason = "shutdown"))
        .await;
    debug!("METRICS | Flush loop stopped");
}
