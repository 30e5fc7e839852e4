// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use pizza_metrics::{
    config::MetricsConfig,
    exporter::{ExporterHandle, ExporterService},
    host::SystemHostStatsReader,
    registry::Registry,
    scheduler::Scheduler,
};

#[tokio::main]
pub async fn main() {
    let config = match MetricsConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading metrics configuration: {e}");
            return;
        }
    };

    let env_filter = format!(
        "h2=off,hyper=off,reqwest=off,rustls=off,{}",
        config.log_level
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let (exporter_handle, exporter_task) = start_exporter(&config);

    let registry = Arc::new(Registry::new(exporter_handle.clone()));
    let mut scheduler = Scheduler::start(
        Arc::clone(&registry),
        Arc::new(SystemHostStatsReader),
        config.scheduler(),
    );
    info!(
        "Metrics scheduler running every {}ms",
        config.interval.as_millis()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down metrics");

    scheduler.stop().await;

    // Push the final totals before the exporter drains and exits
    registry.export_counters();
    if let Some(task) = exporter_task {
        if let Err(e) = exporter_handle.shutdown().await {
            error!("Failed to stop exporter: {e}");
        } else if let Err(e) = task.await {
            error!("Exporter task failed: {e}");
        }
    }
}

fn start_exporter(config: &MetricsConfig) -> (ExporterHandle, Option<JoinHandle<()>>) {
    let Some(exporter_config) = config.exporter() else {
        error!("PIZZA_METRICS_URL or PIZZA_METRICS_API_KEY not set, won't export metrics");
        return (ExporterHandle::disabled(), None);
    };

    match ExporterService::new(exporter_config) {
        Ok((service, handle)) => {
            info!("Exporting metrics to {}", config.url.as_deref().unwrap_or_default());
            (handle, Some(tokio::spawn(service.run())))
        }
        Err(e) => {
            error!("Failed to create metrics exporter, won't export metrics: {e}");
            (ExporterHandle::disabled(), None)
        }
    }
}
