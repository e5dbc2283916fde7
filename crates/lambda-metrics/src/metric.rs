// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

/// A set of raw samples for one metric, all recorded at the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub name: String,
    /// Tag order is part of the metric identity.
    pub tags: Vec<String>,
    pub values: Vec<f64>,
}

impl Distribution {
    pub fn new(name: impl Into<String>, tags: Vec<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            tags,
            values,
        }
    }

    #[must_use]
    pub fn id(&self) -> MetricId {
        MetricId {
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Points for every sample, all stamped with `timestamp`.
    pub fn to_points(&self, timestamp: i64) -> impl Iterator<Item = Point> + '_ {
        self.values.iter().map(move |&value| Point { timestamp, value })
    }
}

/// Aggregation key: name plus the ordered tag sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Distribution,
}

/// A single sample. Serialized as `[timestamp, value]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Unix seconds at which the owning observation was recorded.
    pub timestamp: i64,
    pub value: f64,
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.timestamp)?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

/// One aggregated series in a batch, in the shape the intake expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct APIMetric {
    #[serde(rename = "metric")]
    pub name: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub points: Vec<Point>,
}

impl APIMetric {
    #[must_use]
    pub fn new(id: MetricId) -> Self {
        Self {
            name: id.name,
            tags: id.tags,
            metric_type: MetricType::Distribution,
            points: Vec::new(),
        }
    }
}
