// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Clock and periodic signal sources.
//!
//! The processor never reads the system clock directly. It stamps points with
//! [`TimeService::now`] and drives scheduled flushes from a [`Ticker`] obtained through
//! [`TimeService::new_ticker`], so tests can swap in [`ManualTimeService`] and decide
//! exactly when time moves and when a flush happens.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub trait TimeService: Send + Sync {
    fn now(&self) -> SystemTime;

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// A recurring signal.
#[async_trait]
pub trait Ticker: Send {
    /// Resolves on the next signal.
    async fn tick(&mut self) -> Tick;
}

/// One fired signal.
///
/// The receiver calls [`Tick::handled`] once it has acted on the signal; a sender that
/// waits for delivery resumes at that point.
#[derive(Debug, Default)]
pub struct Tick {
    handled: Option<oneshot::Sender<()>>,
}

impl Tick {
    pub fn handled(self) {
        if let Some(handled) = self.handled {
            let _ = handled.send(());
        }
    }
}

/// Seconds since the Unix epoch. Times before the epoch are clamped to zero.
#[must_use]
pub fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Wall clock and tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        // First tick one full period after creation, not immediately.
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(IntervalTicker { interval })
    }
}

struct IntervalTicker {
    interval: Interval,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Tick {
        self.interval.tick().await;
        Tick::default()
    }
}

/// A settable clock whose ticker only fires when [`ManualTimeService::tick`] is called.
///
/// Only the first ticker handed out is connected; later ones never fire.
#[derive(Debug)]
pub struct ManualTimeService {
    now: Mutex<SystemTime>,
    tick_tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
    tick_rx: Mutex<Option<mpsc::UnboundedReceiver<oneshot::Sender<()>>>>,
}

impl ManualTimeService {
    #[must_use]
    pub fn new(now: SystemTime) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            now: Mutex::new(now),
            tick_tx,
            tick_rx: Mutex::new(Some(tick_rx)),
        }
    }

    pub fn set_now(&self, now: SystemTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Emits one signal and waits until the connected ticker's owner has handled it.
    ///
    /// Returns at once when the connected ticker has been dropped. Before any ticker is
    /// created or polled, the signal waits for it.
    pub async fn tick(&self) {
        let (handled_tx, handled_rx) = oneshot::channel();
        // The receiver only goes away once the connected ticker is dropped.
        if self.tick_tx.send(handled_tx).is_err() {
            return;
        }
        // A dropped `Tick` counts as handled.
        let _ = handled_rx.await;
    }
}

impl TimeService for ManualTimeService {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_ticker(&self, _period: Duration) -> Box<dyn Ticker> {
        let rx = self
            .tick_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Box::new(ManualTicker { rx })
    }
}

struct ManualTicker {
    rx: Option<mpsc::UnboundedReceiver<oneshot::Sender<()>>>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Tick {
        if let Some(rx) = self.rx.as_mut() {
            if let Some(handled) = rx.recv().await {
                return Tick {
                    handled: Some(handled),
                };
            }
            self.rx = None;
        }
        std::future::pending().await
    }
}
