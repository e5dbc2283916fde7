// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The open batch: every series recorded since the last flush.
//!
//! A [`Batch`] keeps one [`APIMetric`] per [`MetricId`]. Observations for an identity that
//! is already present append their points to the existing series, so a flushed batch never
//! contains the same identity twice. Series are handed out in the order their identity was
//! first seen.
//!
//! The batch itself is not synchronized; the processor owns it behind a mutex so that a
//! merge and a flush-time swap can never interleave.

use crate::metric::{APIMetric, Distribution, MetricId};
use hashbrown::HashMap;

#[derive(Debug, Default)]
pub struct Batch {
    index: HashMap<MetricId, usize>,
    metrics: Vec<APIMetric>,
    point_count: usize,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges every value of `distribution` as a point stamped with `timestamp`.
    ///
    /// A distribution without values adds nothing, not even an empty series.
    pub fn add(&mut self, distribution: &Distribution, timestamp: i64) {
        if distribution.values.is_empty() {
            return;
        }

        let id = distribution.id();
        let position = match self.index.get(&id) {
            Some(&position) => position,
            None => {
                let position = self.metrics.len();
                self.metrics.push(APIMetric::new(id.clone()));
                self.index.insert(id, position);
                position
            }
        };

        self.metrics[position]
            .points
            .extend(distribution.to_points(timestamp));
        self.point_count += distribution.values.len();
    }

    /// Total number of points across all series.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Number of distinct series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &MetricId) -> Option<&APIMetric> {
        self.index.get(id).map(|&position| &self.metrics[position])
    }

    /// Closes the batch, yielding its series in first-seen order.
    #[must_use]
    pub fn into_metrics(self) -> Vec<APIMetric> {
        self.metrics
    }
}
