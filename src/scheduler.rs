//! Collection scheduling and the published metric set.

use crate::collector::Collector;
use crate::error::Result;
use crate::metrics::MetricSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Lifecycle of the current collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
    Published,
    Failed,
}

/// The most recently published metric set, shared with the HTTP server.
///
/// Empty until the first successful cycle. Publishing swaps the whole set,
/// so readers never see a partially built one.
#[derive(Debug, Default)]
pub struct PublishedMetrics {
    current: RwLock<Option<Arc<MetricSet>>>,
}

impl PublishedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, set: MetricSet) {
        *self.current.write().await = Some(Arc::new(set));
    }

    pub async fn current(&self) -> Option<Arc<MetricSet>> {
        self.current.read().await.clone()
    }
}

/// Runs collection cycles on a fixed interval, at most one at a time.
pub struct Scheduler {
    collector: Collector,
    published: Arc<PublishedMetrics>,
    interval: Duration,
    exit_on_error: bool,
    state: watch::Sender<CycleState>,
    /// Held for the duration of a cycle
    cycle: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        collector: Collector,
        published: Arc<PublishedMetrics>,
        interval: Duration,
        exit_on_error: bool,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            collector,
            published,
            interval,
            exit_on_error,
            state,
            cycle: Mutex::new(()),
        }
    }

    pub fn published(&self) -> Arc<PublishedMetrics> {
        Arc::clone(&self.published)
    }

    /// Receiver following the cycle state.
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Run one cycle and publish its result. On failure the previously
    /// published set stays visible. Concurrent calls wait for the running
    /// cycle to finish.
    pub async fn run_cycle(&self) -> Result<()> {
        let _cycle = self.cycle.lock().await;
        self.state.send_replace(CycleState::Running);
        info!("Starting collection cycle");
        let started = Instant::now();

        match self.collector.collect().await {
            Ok(set) => {
                let families = set.len();
                self.published.publish(set).await;
                self.state.send_replace(CycleState::Published);
                info!(
                    "Published {} metric families in {:.2}s",
                    families,
                    started.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(CycleState::Failed);
                error!(
                    "Collection cycle failed after {:.2}s: {}",
                    started.elapsed().as_secs_f64(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Run cycles until `shutdown` resolves. The first cycle starts
    /// immediately; a cycle overrunning the interval delays the next one
    /// instead of stacking. `Published` or `Failed` is kept until the next
    /// tick.
    ///
    /// Returns the failing cycle's error when exit-on-error is set.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Scheduler shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            self.state.send_replace(CycleState::Idle);

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, abandoning collection cycle");
                    self.state.send_replace(CycleState::Idle);
                    return Ok(());
                }
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        if self.exit_on_error {
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CycleRecords, MetricsAggregator, SNAPSHOTS_TOTAL};
    use crate::version::ToolVersion;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_published_metrics_swap() {
        let published = PublishedMetrics::new();
        assert!(published.current().await.is_none());

        let records = CycleRecords {
            tool_version: ToolVersion::Unknown,
            check: None,
            locks: None,
            repository_stats: None,
            snapshots: Vec::new(),
            backup_stats: HashMap::new(),
        };
        let set = MetricsAggregator::default().aggregate(&records, Duration::ZERO);
        published.publish(set).await;

        let current = published.current().await.unwrap();
        assert_eq!(current.gauge(SNAPSHOTS_TOTAL), Some(0.0));
    }
}
