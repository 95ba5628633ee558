//! Periodic creation and resolution loop

use super::event_creator::EventCreator;
use super::event_resolver::EventResolver;
use super::metrics::{AgentMetrics, MetricsSnapshot};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

pub struct Scheduler {
    creator: EventCreator,
    resolver: EventResolver,
    creation_interval: Duration,
    resolution_interval: Duration,
    metrics: AgentMetrics,
}

impl Scheduler {
    pub fn new(
        creator: EventCreator,
        resolver: EventResolver,
        creation_interval: Duration,
        resolution_interval: Duration,
        metrics: AgentMetrics,
    ) -> Self {
        Self {
            creator,
            resolver,
            creation_interval,
            resolution_interval,
            metrics,
        }
    }

    /// Run until `shutdown` completes. Resolution runs right away, creation
    /// waits one full period. Returns the final counters.
    pub async fn run<F>(mut self, shutdown: F) -> MetricsSnapshot
    where
        F: Future<Output = ()>,
    {
        info!(
            "Scheduler started: creation every {}s, resolution every {}s",
            self.creation_interval.as_secs(),
            self.resolution_interval.as_secs()
        );

        let mut resolution_tick = interval(self.resolution_interval);
        resolution_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut creation_tick =
            interval_at(Instant::now() + self.creation_interval, self.creation_interval);
        creation_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }

                _ = resolution_tick.tick() => {
                    info!("Running scheduled event resolution...");
                    let resolved = self.resolver.process_resolutions().await;
                    info!("Scheduled resolution resolved {} events", resolved);
                }

                _ = creation_tick.tick() => {
                    info!("Running scheduled event creation...");
                    match self.creator.create_prediction_event().await {
                        Some(event) => info!(
                            "Scheduled creation succeeded: event {} ({} today)",
                            event.id_display(),
                            self.creator.events_created_today()
                        ),
                        None => warn!("Scheduled creation produced no event"),
                    }
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!("Final metrics: {}", json),
            Err(_) => info!("Final metrics: {:?}", snapshot),
        }
        snapshot
    }
}
