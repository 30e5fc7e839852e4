// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(3);
pub const MAX_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// Auth
pub const AUTH_SUCCESS: &str = "authSuccess";
pub const AUTH_FAILURE: &str = "authFailure";
pub const ACTIVE_USERS: &str = "activeUsers";

// Purchases
pub const PIZZAS_PURCHASED: &str = "pizzasPurchased";
pub const PIZZA_REVENUE: &str = "pizzaRevenue";
pub const ORDER_FAILURES: &str = "orderFailures";
pub const REVENUE_LOST: &str = "revenueLost";
pub const LATENCY: &str = "latency";

// Host resources
pub const CPU_USAGE: &str = "cpuUsage";
pub const MEMORY_USAGE: &str = "memoryUsage";

pub const CHAOS_MODE: &str = "chaosMode";

// Traffic
pub const GET_REQUESTS: &str = "GET_requests";
pub const POST_REQUESTS: &str = "POST_requests";
pub const PUT_REQUESTS: &str = "PUT_requests";
pub const DELETE_REQUESTS: &str = "DELETE_requests";
pub const PATCH_REQUESTS: &str = "PATCH_requests";
pub const OTHER_REQUESTS: &str = "OTHER_requests";
pub const TOTAL_REQUESTS: &str = "TOTAL_requests";
