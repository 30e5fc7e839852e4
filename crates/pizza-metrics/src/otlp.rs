// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OTLP/JSON metrics envelope.
//!
//! Only the subset of the OpenTelemetry metrics data model the collector needs:
//! one resource, one scope, and gauge or cumulative-sum points carrying a
//! single double each.

use crate::metric::{Batch, MetricKind, MetricPoint};
use serde::Serialize;

/// `AGGREGATION_TEMPORALITY_CUMULATIVE` in the OTLP protobuf enum.
pub const AGGREGATION_TEMPORALITY_CUMULATIVE: u8 = 2;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsRequest<'a> {
    pub resource_metrics: [ResourceMetrics<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics<'a> {
    pub scope_metrics: [ScopeMetrics<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct ScopeMetrics<'a> {
    pub metrics: Vec<Metric<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Metric<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Gauge {
        #[serde(rename = "dataPoints")]
        data_points: [NumberDataPoint; 1],
    },
    Sum {
        #[serde(rename = "aggregationTemporality")]
        aggregation_temporality: u8,
        #[serde(rename = "isMonotonic")]
        is_monotonic: bool,
        #[serde(rename = "dataPoints")]
        data_points: [NumberDataPoint; 1],
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    pub as_double: f64,
    pub time_unix_nano: u64,
}

impl<'a> From<&'a MetricPoint> for Metric<'a> {
    fn from(point: &'a MetricPoint) -> Self {
        let data_points = [NumberDataPoint {
            as_double: point.value,
            time_unix_nano: point.captured_at_nanos,
        }];
        let data = match point.kind {
            MetricKind::Gauge => MetricData::Gauge { data_points },
            MetricKind::Sum => MetricData::Sum {
                aggregation_temporality: AGGREGATION_TEMPORALITY_CUMULATIVE,
                is_monotonic: true,
                data_points,
            },
        };
        Metric {
            name: &point.name,
            data,
        }
    }
}

impl<'a> From<&'a Batch> for ExportMetricsRequest<'a> {
    fn from(batch: &'a Batch) -> Self {
        ExportMetricsRequest {
            resource_metrics: [ResourceMetrics {
                scope_metrics: [ScopeMetrics {
                    metrics: batch.points().iter().map(Metric::from).collect(),
                }],
            }],
        }
    }
}

/// Serializes a batch into the collector's JSON body.
pub fn to_body(batch: &Batch) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&ExportMetricsRequest::from(batch))
}
