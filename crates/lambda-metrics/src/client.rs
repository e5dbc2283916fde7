// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::api_key::ApiKeyFactory;
use crate::constants::DISTRIBUTION_POINTS_PATH;
use crate::metric::APIMetric;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Ships one closed batch to a metrics backend.
///
/// Implementations own the wire format. Any `Err` is treated as a failed attempt by the
/// retrier, whatever its cause.
#[async_trait]
pub trait Client: Send + Sync {
    async fn send_metrics(&self, metrics: &[APIMetric]) -> Result<(), ShippingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    #[error("Failed to ship to destination: {0:?} {1}")]
    Destination(Option<StatusCode>, String),

    #[error("Failed to resolve API key")]
    ApiKey,
}

pub struct DatadogClientConfig {
    pub api_key_factory: Arc<ApiKeyFactory>,
    /// Datadog site, e.g. `datadoghq.com`.
    pub site: String,
    /// Replaces `https://api.{site}`; used to point at a local intake in tests.
    pub url_prefix_override: Option<String>,
    pub https_proxy: Option<String>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct SeriesPayload<'a> {
    series: &'a [APIMetric],
}

/// Posts batches as JSON to the distribution points intake.
#[derive(Debug, Clone)]
pub struct DatadogClient {
    client: reqwest::Client,
    url: String,
    api_key_factory: Arc<ApiKeyFactory>,
}

impl DatadogClient {
    pub fn new(config: DatadogClientConfig) -> Result<Self, reqwest::Error> {
        let prefix = config
            .url_prefix_override
            .unwrap_or_else(|| format!("https://api.{}", config.site));
        let url = format!(
            "{}{DISTRIBUTION_POINTS_PATH}",
            prefix.trim_end_matches('/')
        );

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy) = config.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            url,
            api_key_factory: config.api_key_factory,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Client for DatadogClient {
    async fn send_metrics(&self, metrics: &[APIMetric]) -> Result<(), ShippingError> {
        let api_key = self
            .api_key_factory
            .get_api_key()
            .await
            .ok_or(ShippingError::ApiKey)?;

        let body = serde_json::to_vec(&SeriesPayload { series: metrics })
            .map_err(|e| ShippingError::Payload(e.to_string()))?;

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("DD-API-KEY", api_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), e.to_string()))?;
        let elapsed = start.elapsed();

        let status = resp.status();
        if status.is_success() {
            debug!(
                "METRICS | Shipped {} series in {} ms",
                metrics.len(),
                elapsed.as_millis()
            );
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_default();
        Err(ShippingError::Destination(Some(status), text))
    }
}
