// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric points and the batch builder.
//!
//! A [`BatchBuilder`] captures a single timestamp when it is created and stamps
//! every point added to it with that timestamp, so all points of one export are
//! directly comparable. Once finished, a [`Batch`] is immutable.

use crate::errors::MetricError;
use derive_more::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Aggregation semantics of a point, as understood by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MetricKind {
    /// Instantaneous value, last write wins downstream.
    #[display("gauge")]
    Gauge,
    /// Cumulative monotonic running total.
    #[display("sum")]
    Sum,
}

/// A numeric measurement accepted at the instrumentation boundary.
///
/// Integers and floats convert infallibly. Text only converts through
/// [`FromStr`], which rejects anything that is not a number.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Measurement(f64);

impl Measurement {
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

macro_rules! measurement_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Measurement {
                fn from(value: $t) -> Self {
                    Measurement(value as f64)
                }
            }
        )*
    };
}

measurement_from!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl From<bool> for Measurement {
    fn from(value: bool) -> Self {
        Measurement(if value { 1.0 } else { 0.0 })
    }
}

impl FromStr for Measurement {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<f64>()
            .map(Measurement)
            .map_err(|_| MetricError::UnparseableValue {
                value: s.to_string(),
            })
    }
}

/// One named measurement at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub captured_at_nanos: u64,
}

// Last timestamp handed out, so wall clock adjustments never move batches backwards.
static LAST_CAPTURE_NANOS: AtomicU64 = AtomicU64::new(0);

fn capture_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    let previous = LAST_CAPTURE_NANOS.fetch_max(now, Ordering::AcqRel);
    now.max(previous)
}

/// Accumulates points that share one capture timestamp.
#[derive(Debug)]
pub struct BatchBuilder {
    timestamp: u64,
    points: Vec<MetricPoint>,
}

impl Default for BatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self {
            timestamp: capture_timestamp(),
            points: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn add_gauge(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Measurement>,
    ) -> Result<&mut Self, MetricError> {
        self.add(name.into(), MetricKind::Gauge, value.into())
    }

    pub fn add_sum(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Measurement>,
    ) -> Result<&mut Self, MetricError> {
        self.add(name.into(), MetricKind::Sum, value.into())
    }

    /// Adds one point per entry, all of the same kind, in iteration order.
    ///
    /// Stops at the first invalid entry; points added before it are kept.
    pub fn add_many<I, N, V>(&mut self, entries: I, kind: MetricKind) -> Result<&mut Self, MetricError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Measurement>,
    {
        for (name, value) in entries {
            self.add(name.into(), kind, value.into())?;
        }
        Ok(self)
    }

    fn add(
        &mut self,
        name: String,
        kind: MetricKind,
        value: Measurement,
    ) -> Result<&mut Self, MetricError> {
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }
        let value = value.as_f64();
        if !value.is_finite() {
            return Err(MetricError::NonFiniteValue { name, value });
        }
        self.points.push(MetricPoint {
            name,
            kind,
            value,
            captured_at_nanos: self.timestamp,
        });
        Ok(self)
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    pub fn finish(self) -> Batch {
        Batch {
            timestamp: self.timestamp,
            points: self.points,
        }
    }
}

/// A finished, immutable set of points ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    timestamp: u64,
    points: Vec<MetricPoint>,
}

impl Batch {
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MetricPoint> {
        self.points.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_share_timestamp() {
        let mut builder = BatchBuilder::new();
        builder
            .add_gauge("cpuUsage", 12.5)
            .unwrap()
            .add_sum("pizzasPurchased", 3u64)
            .unwrap()
            .add_gauge("activeUsers", -1i64)
            .unwrap();

        let batch = builder.finish();
        assert_eq!(batch.len(), 3);
        assert!(batch
            .points()
            .iter()
            .all(|p| p.captured_at_nanos == batch.timestamp()));
    }

    #[test]
    fn test_successive_batches_are_non_decreasing() {
        let first = BatchBuilder::new();
        let second = BatchBuilder::new();
        let third = BatchBuilder::new();
        assert!(first.timestamp() <= second.timestamp());
        assert!(second.timestamp() <= third.timestamp());
        assert!(first.timestamp() > 0);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut builder = BatchBuilder::new();
        builder
            .add_many([("b", 2u32), ("a", 1u32), ("c", 3u32)], MetricKind::Sum)
            .unwrap();
        let names: Vec<&str> = builder.points().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(builder.points().iter().all(|p| p.kind == MetricKind::Sum));
    }

    #[test]
    fn test_numeric_text_parses() {
        let value: Measurement = "42.25".parse().unwrap();
        assert_eq!(value.as_f64(), 42.25);

        let value: Measurement = " 7 ".parse().unwrap();
        assert_eq!(value.as_f64(), 7.0);
    }

    #[test]
    fn test_non_numeric_text_is_rejected() {
        let result = "12 pizzas".parse::<Measurement>();
        assert_eq!(
            result,
            Err(MetricError::UnparseableValue {
                value: "12 pizzas".to_string()
            })
        );
    }

    #[test]
    fn test_non_finite_value_is_rejected() {
        let mut builder = BatchBuilder::new();
        let err = builder.add_gauge("latency", f64::NAN).unwrap_err();
        assert!(matches!(err, MetricError::NonFiniteValue { ref name, .. } if name == "latency"));

        let err = builder.add_sum("revenue", f64::INFINITY).unwrap_err();
        assert!(matches!(err, MetricError::NonFiniteValue { .. }));
        assert!(builder.points().is_empty());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut builder = BatchBuilder::new();
        assert_eq!(builder.add_gauge("", 1u8).unwrap_err(), MetricError::EmptyName);
    }

    #[test]
    fn test_add_many_stops_at_first_defect() {
        let mut builder = BatchBuilder::new();
        let result = builder.add_many(
            [("ok", 1.0), ("bad", f64::NAN), ("never", 2.0)],
            MetricKind::Gauge,
        );
        assert!(result.is_err());
        assert_eq!(builder.points().len(), 1);
        assert_eq!(builder.points()[0].name, "ok");
    }

    #[test]
    fn test_bool_measurement() {
        assert_eq!(Measurement::from(true).as_f64(), 1.0);
        assert_eq!(Measurement::from(false).as_f64(), 0.0);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!(MetricKind::Sum.to_string(), "sum");
    }
}
