// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metrics for the pizza storefront service.
//!
//! Request handlers record events on a shared [`registry::Registry`]. The
//! registry keeps the counters and hands finished batches to an
//! [`exporter::ExporterHandle`], which ships them to an OTLP/JSON collector in
//! the background. A [`scheduler::Scheduler`] exports host resource usage on a
//! fixed interval.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod errors;
pub mod exporter;
pub mod host;
pub mod metric;
pub mod otlp;
pub mod registry;
pub mod scheduler;
