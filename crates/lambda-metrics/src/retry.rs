// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retries around a single batch delivery.
//!
//! Failures stop here. Once every attempt is spent the batch is dropped, and the loss is
//! reported through the error log, the [`DeliveryStats`] counters, and an optional
//! [`FailureHook`]. Producers and the processor lifecycle never see delivery errors.

use crate::client::Client;
use crate::constants::DEFAULT_MAX_ATTEMPTS;
use crate::metric::APIMetric;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// One attempt per batch.
    Disabled,
    /// Up to N attempts in total, back to back.
    Immediate(u32),
    /// Up to N attempts in total, sleeping the given milliseconds between attempts.
    LinearBackoff(u32, u64),
}

impl RetryStrategy {
    #[must_use]
    pub fn from_flag(should_retry: bool) -> Self {
        if should_retry {
            Self::Immediate(DEFAULT_MAX_ATTEMPTS)
        } else {
            Self::Disabled
        }
    }

    /// Total attempts, including the first. Never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Disabled => 1,
            Self::Immediate(attempts) | Self::LinearBackoff(attempts, _) => (*attempts).max(1),
        }
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        match self {
            Self::LinearBackoff(_, delay_ms) => Duration::from_millis(*delay_ms),
            Self::Disabled | Self::Immediate(_) => Duration::ZERO,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Immediate(DEFAULT_MAX_ATTEMPTS)
    }
}

/// A batch that could not be delivered and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub attempts: u32,
    pub series: usize,
    pub points: usize,
    pub last_error: String,
}

pub type FailureHook = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Dropped(DeliveryFailure),
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    attempts: AtomicU64,
    delivered_batches: AtomicU64,
    dropped_batches: AtomicU64,
    dropped_points: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    pub attempts: u64,
    pub delivered_batches: u64,
    pub dropped_batches: u64,
    pub dropped_points: u64,
}

impl DeliveryStats {
    #[must_use]
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered_batches: self.delivered_batches.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
            dropped_points: self.dropped_points.load(Ordering::Relaxed),
        }
    }
}

pub struct Retrier {
    client: Arc<dyn Client>,
    strategy: RetryStrategy,
    stats: DeliveryStats,
    on_failure: Option<FailureHook>,
}

impl Retrier {
    pub fn new(client: Arc<dyn Client>, strategy: RetryStrategy) -> Self {
        Self {
            client,
            strategy,
            stats: DeliveryStats::default(),
            on_failure: None,
        }
    }

    #[must_use]
    pub fn with_failure_hook(mut self, hook: Option<FailureHook>) -> Self {
        self.on_failure = hook;
        self
    }

    #[must_use]
    pub fn strategy(&self) -> RetryStrategy {
        self.strategy
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Ships `metrics`, retrying the same slice per the strategy.
    pub async fn deliver(&self, metrics: &[APIMetric]) -> DeliveryOutcome {
        let max_attempts = self.strategy.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            match self.client.send_metrics(metrics).await {
                Ok(()) => {
                    self.stats.delivered_batches.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "METRICS | Delivered {} series after {} attempt(s)",
                        metrics.len(),
                        attempts
                    );
                    return DeliveryOutcome::Delivered { attempts };
                }
                Err(e) if attempts >= max_attempts => {
                    let failure = DeliveryFailure {
                        attempts,
                        series: metrics.len(),
                        points: metrics.iter().map(|m| m.points.len()).sum(),
                        last_error: e.to_string(),
                    };
                    self.report(&failure);
                    return DeliveryOutcome::Dropped(failure);
                }
                Err(e) => {
                    debug!(
                        "METRICS | Failed to ship batch (attempt {}/{}): {}",
                        attempts, max_attempts, e
                    );
                    let backoff = self.strategy.backoff();
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }

    fn report(&self, failure: &DeliveryFailure) {
        self.stats.dropped_batches.fetch_add(1, Ordering::Relaxed);
        self.stats
            .dropped_points
            .fetch_add(failure.points as u64, Ordering::Relaxed);
        error!(
            "METRICS | Dropping {} series ({} points) after {} attempt(s): {}",
            failure.series, failure.points, failure.attempts, failure.last_error
        );
        if let Some(hook) = &self.on_failure {
            hook(failure);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::ShippingError;
    use crate::metric::{MetricId, Point};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyClient {
        failures: u32,
        calls: AtomicU32,
        seen: Mutex<Vec<Vec<APIMetric>>>,
    }

    impl FlakyClient {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Client for FlakyClient {
        async fn send_metrics(&self, metrics: &[APIMetric]) -> Result<(), ShippingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(metrics.to_vec());
            if call <= self.failures {
                Err(ShippingError::Destination(None, "connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn batch() -> Vec<APIMetric> {
        let mut metric = APIMetric::new(MetricId {
            name: "metric-1".to_string(),
            tags: vec![],
        });
        metric.points.extend([
            Point {
                timestamp: 1,
                value: 1.0,
            },
            Point {
                timestamp: 1,
                value: 2.0,
            },
        ]);
        vec![metric]
    }

    #[test]
    fn strategy_attempts() {
        assert_eq!(RetryStrategy::from_flag(true).max_attempts(), 3);
        assert_eq!(RetryStrategy::from_flag(false).max_attempts(), 1);
        assert_eq!(RetryStrategy::Immediate(0).max_attempts(), 1);
        assert_eq!(
            RetryStrategy::LinearBackoff(5, 250).backoff(),
            Duration::from_millis(250)
        );
        assert_eq!(RetryStrategy::Immediate(5).backoff(), Duration::ZERO);
    }

    #[tokio::test]
    async fn always_failing_client_is_called_three_times_with_retry() {
        let client = FlakyClient::new(u32::MAX);
        let retrier = Retrier::new(client.clone(), RetryStrategy::from_flag(true));

        let outcome = retrier.deliver(&batch()).await;

        assert_eq!(client.calls(), 3);
        assert!(matches!(
            outcome,
            DeliveryOutcome::Dropped(DeliveryFailure {
                attempts: 3,
                series: 1,
                points: 2,
                ..
            })
        ));
        let stats = retrier.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.dropped_batches, 1);
        assert_eq!(stats.dropped_points, 2);
        assert_eq!(stats.delivered_batches, 0);
    }

    #[tokio::test]
    async fn always_failing_client_is_called_once_without_retry() {
        let client = FlakyClient::new(u32::MAX);
        let retrier = Retrier::new(client.clone(), RetryStrategy::from_flag(false));

        retrier.deliver(&batch()).await;

        assert_eq!(client.calls(), 1);
        assert_eq!(retrier.stats().attempts, 1);
    }

    #[tokio::test]
    async fn retries_resend_the_same_batch_until_success() {
        let client = FlakyClient::new(2);
        let retrier = Retrier::new(client.clone(), RetryStrategy::Immediate(5));

        let outcome = retrier.deliver(&batch()).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|sent| *sent == batch()));
        assert_eq!(retrier.stats().delivered_batches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn linear_backoff_waits_between_attempts() {
        let client = FlakyClient::new(u32::MAX);
        let retrier = Retrier::new(client.clone(), RetryStrategy::LinearBackoff(3, 500));

        let start = tokio::time::Instant::now();
        retrier.deliver(&batch()).await;

        assert_eq!(client.calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn failure_hook_receives_dropped_batch() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let hook: FailureHook = Arc::new(move |failure: &DeliveryFailure| {
            sink.lock().unwrap().push(failure.clone());
        });

        let retrier = Retrier::new(FlakyClient::new(u32::MAX), RetryStrategy::Immediate(2))
            .with_failure_hook(Some(hook));
        retrier.deliver(&batch()).await;

        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].attempts, 2);
        assert!(reported[0].last_error.contains("connection reset"));
    }

    #[tokio::test]
    #[traced_test]
    async fn dropped_batch_is_logged() {
        let retrier = Retrier::new(FlakyClient::new(u32::MAX), RetryStrategy::Disabled);
        retrier.deliver(&batch()).await;

        assert!(logs_contain(
            "METRICS | Dropping 1 series (2 points) after 1 attempt(s)"
        ));
    }
}
