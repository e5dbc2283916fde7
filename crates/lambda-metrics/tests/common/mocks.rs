// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock delivery client for processor tests

use async_trait::async_trait;
use lambda_metrics::client::{Client, ShippingError};
use lambda_metrics::metric::APIMetric;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// Records every batch it is asked to send and optionally fails every call
pub struct MockClient {
    batches_tx: mpsc::UnboundedSender<Vec<APIMetric>>,
    batches_rx: Mutex<mpsc::UnboundedReceiver<Vec<APIMetric>>>,
    send_metrics_called_count: AtomicUsize,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl MockClient {
    pub fn new() -> Arc<Self> {
        let (batches_tx, batches_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            batches_tx,
            batches_rx: Mutex::new(batches_rx),
            send_metrics_called_count: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn failing() -> Arc<Self> {
        let client = Self::new();
        client.fail.store(true, Ordering::SeqCst);
        client
    }

    pub fn send_metrics_called_count(&self) -> usize {
        self.send_metrics_called_count.load(Ordering::SeqCst)
    }

    /// Waits for the next batch handed to `send_metrics`
    pub async fn next_batch(&self) -> Vec<APIMetric> {
        timeout(Duration::from_secs(2), self.batches_rx.lock().await.recv())
            .await
            .expect("timed out waiting for a batch")
            .expect("batch channel closed")
    }

    /// Returns a batch only if one was already sent
    pub async fn try_next_batch(&self) -> Option<Vec<APIMetric>> {
        self.batches_rx.lock().await.try_recv().ok()
    }
}

#[async_trait]
impl Client for MockClient {
    async fn send_metrics(&self, metrics: &[APIMetric]) -> Result<(), ShippingError> {
        self.send_metrics_called_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.batches_tx.send(metrics.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            Err(ShippingError::Destination(None, "Some error".to_string()))
        } else {
            Ok(())
        }
    }
}
