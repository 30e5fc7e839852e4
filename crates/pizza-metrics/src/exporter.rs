// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fire-and-forget export of metric batches to the collector.
//!
//! Callers hold a cheap, cloneable [`ExporterHandle`] and enqueue finished
//! batches without waiting. A single [`ExporterService`] task drains the queue
//! and POSTs each batch. Failures are logged and the batch is dropped; nothing
//! is retried and nothing is reported back to the caller.

use crate::constants::{DEFAULT_EXPORT_TIMEOUT, DEFAULT_QUEUE_CAPACITY};
use crate::errors::ExportError;
use crate::metric::Batch;
use crate::otlp;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Full collector URL the batches are POSTed to
    pub url: String,
    /// Sent as `Authorization: Bearer <api_key>`
    pub api_key: String,
    /// Upper bound for a single POST, connect included
    pub timeout: Duration,
    /// Batches waiting beyond this are dropped
    pub queue_capacity: usize,
}

impl ExporterConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_EXPORT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// HTTP client for the collector's metrics endpoint.
#[derive(Clone)]
pub struct CollectorClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl std::fmt::Debug for CollectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl CollectorClient {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ExportError::Client)?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    /// Sends one batch. Any 2xx status counts as accepted.
    pub async fn send(&self, batch: &Batch) -> Result<(), ExportError> {
        let body = otlp::to_body(batch)?;
        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ExportError::Status {
                status,
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

#[derive(Debug)]
pub enum ExportCommand {
    Export(Batch),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ExporterHandle {
    tx: mpsc::Sender<ExportCommand>,
}

impl ExporterHandle {
    /// Creates a handle over a fresh bounded queue and returns the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ExportCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// A handle whose batches are always discarded, for running without a collector.
    pub fn disabled() -> Self {
        let (handle, _rx) = Self::channel(1);
        handle
    }

    /// Enqueues a batch without waiting. Never fails from the caller's view.
    pub fn export(&self, batch: Batch) {
        match self.tx.try_send(ExportCommand::Export(batch)) {
            Ok(()) => {}
            Err(TrySendError::Full(ExportCommand::Export(batch))) => {
                warn!(
                    "Export queue full, dropping batch of {} metrics",
                    batch.len()
                );
            }
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {
                debug!("Exporter not running, dropping batch");
            }
        }
    }

    /// Asks the service to stop once the batches queued before this call are shipped.
    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<ExportCommand>> {
        self.tx.send(ExportCommand::Shutdown).await
    }
}

pub struct ExporterService {
    client: CollectorClient,
    rx: mpsc::Receiver<ExportCommand>,
}

impl ExporterService {
    pub fn new(config: ExporterConfig) -> Result<(Self, ExporterHandle), ExportError> {
        let client = CollectorClient::new(config.url, config.api_key, config.timeout)?;
        let (handle, rx) = ExporterHandle::channel(config.queue_capacity);
        Ok((Self { client, rx }, handle))
    }

    pub async fn run(mut self) {
        debug!("Exporter service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                ExportCommand::Export(batch) => self.ship(batch).await,
                ExportCommand::Shutdown => {
                    debug!("Exporter service shutting down");
                    break;
                }
            }
        }

        debug!("Exporter service stopped");
    }

    async fn ship(&self, batch: Batch) {
        let n_points = batch.len();
        match self.client.send(&batch).await {
            Ok(()) => debug!("Exported {n_points} metrics"),
            Err(ExportError::Payload(e)) => {
                error!("Failed to serialize batch of {n_points} metrics. Data dropped: {e}");
            }
            Err(e) => warn!("Failed to export {n_points} metrics, batch dropped: {e}"),
        }
    }
}
