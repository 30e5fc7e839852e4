// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic export of host resource metrics.
//!
//! A single background task ticks on a fixed interval, so ticks never overlap.
//! Each tick samples the host and exports the resource gauges, then optionally
//! the chaos flag and the request/auth counters.

use crate::constants::DEFAULT_EXPORT_INTERVAL;
use crate::host::HostStatsReader;
use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub interval: Duration,
    pub include_chaos_on_tick: bool,
    pub include_counters_on_tick: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_EXPORT_INTERVAL,
            include_chaos_on_tick: true,
            include_counters_on_tick: true,
        }
    }
}

pub struct Scheduler {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the ticking task on the current tokio runtime.
    pub fn start(
        registry: Arc<Registry>,
        reader: Arc<dyn HostStatsReader>,
        options: SchedulerOptions,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let task = tokio::spawn(async move {
            debug!("Metrics scheduler started, interval {:?}", options.interval);
            let mut ticker = interval(options.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // discard first tick, which is instantaneous

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick(&registry, &*reader, &options),
                }
            }
            debug!("Metrics scheduler stopped");
        });

        Self {
            cancel_token,
            task: Some(task),
        }
    }

    /// Cancels the timer and waits for an in-progress tick to finish.
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Metrics scheduler task failed: {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// One scheduler tick. A failed host sample skips only the resource batch.
pub fn tick(registry: &Registry, reader: &dyn HostStatsReader, options: &SchedulerOptions) {
    match reader.read() {
        Ok(stats) => registry.record_host_stats(stats),
        Err(e) => warn!("Skipping host resource metrics for this tick: {e}"),
    }
    if options.include_chaos_on_tick {
        registry.export_chaos_mode();
    }
    if options.include_counters_on_tick {
        registry.export_counters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CHAOS_MODE, CPU_USAGE, MEMORY_USAGE, TOTAL_REQUESTS};
    use crate::errors::SamplingError;
    use crate::exporter::{ExportCommand, ExporterHandle};
    use crate::host::HostStats;
    use crate::metric::Batch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::sleep;
    use tracing_test::traced_test;

    struct FakeReader {
        reads: AtomicUsize,
        fail: bool,
    }

    impl FakeReader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                reads: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl HostStatsReader for FakeReader {
        fn read(&self) -> Result<HostStats, SamplingError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SamplingError::Unsupported)
            } else {
                Ok(HostStats {
                    cpu_usage_pct: 25.0,
                    memory_usage_pct: 50.0,
                })
            }
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ExportCommand>) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Ok(command) = rx.try_recv() {
            if let ExportCommand::Export(batch) = command {
                batches.push(batch);
            }
        }
        batches
    }

    fn options(interval: Duration) -> SchedulerOptions {
        SchedulerOptions {
            interval,
            include_chaos_on_tick: false,
            include_counters_on_tick: false,
        }
    }

    #[test]
    fn test_tick_exports_resource_gauges() {
        let (handle, mut rx) = ExporterHandle::channel(64);
        let registry = Registry::new(handle);
        let reader = FakeReader::new(false);

        tick(&registry, &*reader, &options(Duration::from_secs(1)));

        let batches = drain(&mut rx);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(CPU_USAGE).map(|p| p.value), Some(25.0));
        assert_eq!(batch.get(MEMORY_USAGE).map(|p| p.value), Some(50.0));
        assert_eq!(batch.points()[0].captured_at_nanos, batch.points()[1].captured_at_nanos);
    }

    #[test]
    fn test_tick_with_chaos_and_counters() {
        let (handle, mut rx) = ExporterHandle::channel(64);
        let registry = Registry::new(handle);
        registry.record_request("GET");
        let reader = FakeReader::new(false);

        tick(
            &registry,
            &*reader,
            &SchedulerOptions {
                interval: Duration::from_secs(1),
                include_chaos_on_tick: true,
                include_counters_on_tick: true,
            },
        );

        let batches = drain(&mut rx);
        assert_eq!(batches.len(), 3);
        assert!(batches[0].get(CPU_USAGE).is_some());
        assert_eq!(batches[1].get(CHAOS_MODE).map(|p| p.value), Some(0.0));
        assert_eq!(batches[2].get(TOTAL_REQUESTS).map(|p| p.value), Some(1.0));
    }

    #[test]
    #[traced_test]
    fn test_sampling_failure_skips_resource_batch() {
        let (handle, mut rx) = ExporterHandle::channel(64);
        let registry = Registry::new(handle);
        let reader = FakeReader::new(true);

        tick(
            &registry,
            &*reader,
            &SchedulerOptions {
                include_chaos_on_tick: true,
                ..options(Duration::from_secs(1))
            },
        );

        let batches = drain(&mut rx);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].get(CHAOS_MODE).is_some());
        assert!(logs_contain("Skipping host resource metrics"));
    }

    #[tokio::test]
    async fn test_scheduler_ticks_until_stopped() {
        let (handle, mut rx) = ExporterHandle::channel(1024);
        let registry = Arc::new(Registry::new(handle));
        let reader = FakeReader::new(false);

        let mut scheduler = Scheduler::start(
            Arc::clone(&registry),
            reader.clone(),
            options(Duration::from_millis(20)),
        );
        assert!(scheduler.is_running());

        sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        let ticks = drain(&mut rx).len();
        assert!(ticks >= 2, "expected several ticks, got {ticks}");
        assert_eq!(reader.reads.load(Ordering::SeqCst), ticks);

        sleep(Duration::from_millis(100)).await;
        assert!(drain(&mut rx).is_empty());

        // Stopping twice is harmless
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_failing_sampler_keeps_timer_alive() {
        let (handle, mut rx) = ExporterHandle::channel(1024);
        let registry = Arc::new(Registry::new(handle));
        let reader = FakeReader::new(true);

        let mut scheduler = Scheduler::start(
            Arc::clone(&registry),
            reader.clone(),
            SchedulerOptions {
                include_chaos_on_tick: true,
                ..options(Duration::from_millis(20))
            },
        );

        sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        let reads = reader.reads.load(Ordering::SeqCst);
        assert!(reads >= 2, "expected several ticks, got {reads}");
        let batches = drain(&mut rx);
        assert_eq!(batches.len(), reads);
        assert!(batches.iter().all(|b| b.get(CHAOS_MODE).is_some()));
    }

    #[tokio::test]
    async fn test_first_tick_is_skipped() {
        let (handle, mut rx) = ExporterHandle::channel(16);
        let registry = Arc::new(Registry::new(handle));
        let reader = FakeReader::new(false);

        let mut scheduler = Scheduler::start(
            Arc::clone(&registry),
            reader.clone(),
            options(Duration::from_secs(60)),
        );
        sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).is_empty());
    }
}
