// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide counters and gauges.
//!
//! The [`Registry`] owns every counter. Request handlers call its `record_*`
//! operations as a side effect of serving a request; the registry updates its
//! state under a single mutex and, for auth, user, purchase and chaos events,
//! immediately hands a freshly built batch to the exporter. None of the
//! operations fail or wait on the network.
//!
//! Purchase aggregates are exported as cumulative running totals. Revenue lost
//! on a failed order is the value of the cart that could not be fulfilled.

use crate::constants::{
    ACTIVE_USERS, AUTH_FAILURE, AUTH_SUCCESS, CHAOS_MODE, CPU_USAGE, DELETE_REQUESTS,
    GET_REQUESTS, LATENCY, MEMORY_USAGE, ORDER_FAILURES, OTHER_REQUESTS, PATCH_REQUESTS,
    PIZZAS_PURCHASED, PIZZA_REVENUE, POST_REQUESTS, PUT_REQUESTS, REVENUE_LOST, TOTAL_REQUESTS,
};
use crate::errors::MetricError;
use crate::exporter::ExporterHandle;
use crate::host::HostStats;
use crate::metric::{BatchBuilder, MetricKind};
use derive_more::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error};

const METHOD_COUNT: usize = 6;

/// HTTP verbs tracked by the traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum HttpMethod {
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("DELETE")]
    Delete,
    #[display("PATCH")]
    Patch,
    #[display("OTHER")]
    Other,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; METHOD_COUNT] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Other,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn metric_name(self) -> &'static str {
        match self {
            HttpMethod::Get => GET_REQUESTS,
            HttpMethod::Post => POST_REQUESTS,
            HttpMethod::Put => PUT_REQUESTS,
            HttpMethod::Delete => DELETE_REQUESTS,
            HttpMethod::Patch => PATCH_REQUESTS,
            HttpMethod::Other => OTHER_REQUESTS,
        }
    }
}

impl From<&str> for HttpMethod {
    fn from(method: &str) -> Self {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            _ => HttpMethod::Other,
        }
    }
}

impl From<&reqwest::Method> for HttpMethod {
    fn from(method: &reqwest::Method) -> Self {
        HttpMethod::from(method.as_str())
    }
}

/// One line of an order as seen by the order handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderItem {
    pub menu_id: Option<u64>,
    pub description: Option<String>,
    pub price: Option<f64>,
}

impl OrderItem {
    pub fn priced(price: f64) -> Self {
        Self {
            price: Some(price),
            ..Default::default()
        }
    }

    /// Missing or non-finite prices contribute nothing.
    fn price_or_zero(&self) -> f64 {
        self.price.filter(|p| p.is_finite()).unwrap_or(0.0)
    }
}

fn cart_value(items: &[OrderItem]) -> f64 {
    items.iter().map(OrderItem::price_or_zero).sum()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSnapshot {
    by_method: [u64; METHOD_COUNT],
    total: u64,
}

impl TrafficSnapshot {
    pub fn count(&self, method: HttpMethod) -> u64 {
        self.by_method[method.index()]
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub successful: u64,
    pub failed: u64,
    /// Signed in minus signed out; negative under misuse.
    pub active_users: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PurchaseSnapshot {
    pub pizzas_purchased: u64,
    pub revenue: f64,
    pub order_failures: u64,
    pub revenue_lost: f64,
    /// Latency of the most recent order, in milliseconds.
    pub latency_ms: f64,
}

#[derive(Debug, Default)]
struct RegistryState {
    traffic: TrafficSnapshot,
    auth: AuthSnapshot,
    purchases: PurchaseSnapshot,
    host: Option<HostStats>,
    chaos_mode: bool,
}

pub struct Registry {
    state: Mutex<RegistryState>,
    exporter: ExporterHandle,
}

impl Registry {
    pub fn new(exporter: ExporterHandle) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            exporter,
        }
    }

    // Poisoning is ignored: every update is a single arithmetic step.
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fills a batch and hands it to the exporter. A build defect is logged
    /// and the batch dropped; the counters already reflect the event.
    ///
    /// Callers create `builder` while still holding the state guard, so batch
    /// timestamps are ordered the same way as the totals they carry.
    fn export_with<F>(&self, mut builder: BatchBuilder, build: F)
    where
        F: FnOnce(&mut BatchBuilder) -> Result<(), MetricError>,
    {
        match build(&mut builder) {
            Ok(()) => self.exporter.export(builder.finish()),
            Err(e) => error!("Failed to build metrics batch, dropping it: {e}"),
        }
    }

    pub fn record_request(&self, method: impl Into<HttpMethod>) {
        let method = method.into();
        let mut state = self.state();
        state.traffic.by_method[method.index()] += 1;
        state.traffic.total += 1;
    }

    pub fn record_auth_success(&self) {
        let (builder, successful) = {
            let mut state = self.state();
            state.auth.successful += 1;
            (BatchBuilder::new(), state.auth.successful)
        };
        self.export_with(builder, |b| b.add_sum(AUTH_SUCCESS, successful).map(drop));
    }

    pub fn record_auth_failure(&self) {
        let (builder, failed) = {
            let mut state = self.state();
            state.auth.failed += 1;
            (BatchBuilder::new(), state.auth.failed)
        };
        self.export_with(builder, |b| b.add_sum(AUTH_FAILURE, failed).map(drop));
    }

    pub fn record_user_signed_in(&self) {
        self.adjust_active_users(1);
    }

    pub fn record_user_signed_out(&self) {
        self.adjust_active_users(-1);
    }

    fn adjust_active_users(&self, delta: i64) {
        let (builder, active_users) = {
            let mut state = self.state();
            state.auth.active_users = state.auth.active_users.saturating_add(delta);
            (BatchBuilder::new(), state.auth.active_users)
        };
        self.export_with(builder, |b| b.add_gauge(ACTIVE_USERS, active_users).map(drop));
    }

    /// Records the outcome of one order attempt and exports the purchase family.
    ///
    /// A successful order adds its item count and cart value to the purchase
    /// totals. A failed order counts one failure and adds the cart value to
    /// revenue lost. Latency is recorded either way.
    pub fn record_purchase(&self, success: bool, items: &[OrderItem], latency: Duration) {
        let value = cart_value(items);
        let (builder, snapshot) = {
            let mut state = self.state();
            let purchases = &mut state.purchases;
            if success {
                purchases.pizzas_purchased += items.len() as u64;
                purchases.revenue += value;
            } else {
                purchases.order_failures += 1;
                purchases.revenue_lost += value;
            }
            purchases.latency_ms = latency.as_micros() as f64 / 1000.0;
            (BatchBuilder::new(), *purchases)
        };
        debug!(
            "Order {} with {} items worth {value} in {}ms",
            if success { "fulfilled" } else { "failed" },
            items.len(),
            snapshot.latency_ms
        );

        self.export_with(builder, |b| {
            b.add_many(
                [
                    (PIZZAS_PURCHASED, snapshot.pizzas_purchased as f64),
                    (PIZZA_REVENUE, snapshot.revenue),
                    (ORDER_FAILURES, snapshot.order_failures as f64),
                    (REVENUE_LOST, snapshot.revenue_lost),
                ],
                MetricKind::Sum,
            )?
            .add_gauge(LATENCY, snapshot.latency_ms)?;
            Ok(())
        });
    }

    /// Starts timing an order; finish it with [`PurchaseTimer::complete`].
    pub fn begin_purchase(&self) -> PurchaseTimer<'_> {
        PurchaseTimer {
            registry: self,
            started: Instant::now(),
        }
    }

    pub fn set_chaos_mode(&self, enabled: bool) {
        let builder = {
            let mut state = self.state();
            state.chaos_mode = enabled;
            BatchBuilder::new()
        };
        self.export_with(builder, |b| b.add_gauge(CHAOS_MODE, enabled).map(drop));
    }

    /// Reads and zeroes the purchase aggregates in one step.
    ///
    /// Takes the same lock as [`Registry::record_purchase`], so every purchase
    /// lands either in the returned snapshot or in the counters left behind.
    pub fn snapshot_and_reset_purchase_aggregates(&self) -> PurchaseSnapshot {
        std::mem::take(&mut self.state().purchases)
    }

    pub fn traffic(&self) -> TrafficSnapshot {
        self.state().traffic
    }

    pub fn auth(&self) -> AuthSnapshot {
        self.state().auth
    }

    pub fn purchases(&self) -> PurchaseSnapshot {
        self.state().purchases
    }

    pub fn chaos_mode(&self) -> bool {
        self.state().chaos_mode
    }

    /// Exports request counts per verb and in total, auth totals and active users.
    pub fn export_counters(&self) {
        let (builder, traffic, auth) = {
            let state = self.state();
            (BatchBuilder::new(), state.traffic, state.auth)
        };
        self.export_with(builder, |b| {
            b.add_many(
                HttpMethod::ALL
                    .iter()
                    .map(|m| (m.metric_name(), traffic.count(*m))),
                MetricKind::Sum,
            )?
            .add_sum(TOTAL_REQUESTS, traffic.total())?
            .add_sum(AUTH_SUCCESS, auth.successful)?
            .add_sum(AUTH_FAILURE, auth.failed)?
            .add_gauge(ACTIVE_USERS, auth.active_users)?;
            Ok(())
        });
    }

    pub fn export_chaos_mode(&self) {
        let (builder, enabled) = {
            let state = self.state();
            (BatchBuilder::new(), state.chaos_mode)
        };
        self.export_with(builder, |b| b.add_gauge(CHAOS_MODE, enabled).map(drop));
    }

    /// Stores the latest host sample and exports it as a two-point gauge batch.
    pub fn record_host_stats(&self, stats: HostStats) {
        let builder = {
            let mut state = self.state();
            state.host = Some(stats);
            BatchBuilder::new()
        };
        self.export_with(builder, |b| {
            b.add_gauge(CPU_USAGE, stats.cpu_usage_pct)?
                .add_gauge(MEMORY_USAGE, stats.memory_usage_pct)?;
            Ok(())
        });
    }

    /// Most recent host sample, if any tick has succeeded yet.
    pub fn host_stats(&self) -> Option<HostStats> {
        self.state().host
    }
}

/// Measures the latency of one order attempt.
pub struct PurchaseTimer<'a> {
    registry: &'a Registry,
    started: Instant,
}

impl PurchaseTimer<'_> {
    pub fn complete(self, success: bool, items: &[OrderItem]) {
        self.registry
            .record_purchase(success, items, self.started.elapsed());
    }
}
