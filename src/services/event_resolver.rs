//! Event resolution
//!
//! Walks the contract's active events and settles the ones whose deadline has
//! passed. The contract reads the oracle itself; the agent only decides when to
//! call `resolveEvent`, optionally after asking the verifier for a second opinion.

use super::metrics::AgentMetrics;
use super::{MarketGateway, OutcomeVerifier, PriceSource};
use crate::types::PendingEvent;
use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause after each attempted resolution
pub const DEFAULT_RESOLUTION_DELAY: Duration = Duration::from_secs(3);

/// Resolution is due once the deadline has passed and the event is still open
pub fn is_ready_for_resolution(event: &PendingEvent, now: DateTime<Utc>) -> bool {
    now.timestamp() >= event.deadline as i64 && !event.resolved
}

pub struct EventResolver {
    market: Arc<dyn MarketGateway>,
    prices: Arc<dyn PriceSource>,
    verifier: Option<Arc<dyn OutcomeVerifier>>,
    resolution_delay: Duration,
    metrics: AgentMetrics,
}

impl EventResolver {
    pub fn new(
        market: Arc<dyn MarketGateway>,
        prices: Arc<dyn PriceSource>,
        metrics: AgentMetrics,
    ) -> Self {
        Self {
            market,
            prices,
            verifier: None,
            resolution_delay: DEFAULT_RESOLUTION_DELAY,
            metrics,
        }
    }

    /// Consult `verifier` before every resolution
    pub fn with_verifier(mut self, verifier: Arc<dyn OutcomeVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_resolution_delay(mut self, delay: Duration) -> Self {
        self.resolution_delay = delay;
        self
    }

    /// Ids of unresolved events; empty when the contract cannot be reached
    pub async fn active_events(&self) -> Vec<U256> {
        match self.market.active_event_ids().await {
            Ok(ids) => {
                info!("Found {} active events", ids.len());
                ids
            }
            Err(e) => {
                error!("Error fetching active events: {:#}", e);
                Vec::new()
            }
        }
    }

    pub async fn event_details(&self, event_id: U256) -> Option<PendingEvent> {
        match self.market.get_event(event_id).await {
            Ok(event) => Some(event.into()),
            Err(e) => {
                error!("Error fetching event {}: {:#}", event_id, e);
                None
            }
        }
    }

    /// Send `resolveEvent`; `true` once the transaction is confirmed
    pub async fn resolve_event(&self, event_id: U256) -> bool {
        info!("Resolving event {}...", event_id);
        match self.market.resolve_event(event_id).await {
            Ok(resolved) => {
                info!("Event {} resolved successfully (tx {})", event_id, resolved.tx_hash);
                self.metrics.inc_resolutions_ok();
                true
            }
            Err(e) => {
                error!("Error resolving event {}: {:#}", event_id, e);
                self.metrics.inc_resolutions_failed();
                false
            }
        }
    }

    /// One pass over all active events; returns how many were resolved
    pub async fn process_resolutions(&self) -> usize {
        self.process_resolutions_at(Utc::now()).await
    }

    pub async fn process_resolutions_at(&self, now: DateTime<Utc>) -> usize {
        info!("Starting resolution process...");

        let event_ids = self.active_events().await;
        if event_ids.is_empty() {
            info!("No active events to check");
            return 0;
        }

        let mut resolved_count = 0;

        for event_id in event_ids {
            debug!("Checking event {}...", event_id);

            let Some(event) = self.event_details(event_id).await else {
                warn!("Could not fetch details for event {}", event_id);
                continue;
            };

            info!(
                "Event {}: \"{}\" deadline {}, resolved: {}",
                event_id,
                event.question,
                event
                    .deadline_time()
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| event.deadline.to_string()),
                event.resolved
            );

            if is_ready_for_resolution(&event, now) {
                if !self.verification_allows(&event).await {
                    continue;
                }

                info!("Event {} is ready for resolution", event_id);
                if self.resolve_event(event_id).await {
                    resolved_count += 1;
                }

                if !self.resolution_delay.is_zero() {
                    tokio::time::sleep(self.resolution_delay).await;
                }
            } else if event.resolved {
                info!("Event {} is already resolved", event_id);
            } else {
                let remaining = event.deadline as i64 - now.timestamp();
                info!(
                    "Event {} not ready yet ({} hours remaining)",
                    event_id,
                    remaining / 3600
                );
            }
        }

        info!("Resolution process complete. Resolved {} events.", resolved_count);
        resolved_count
    }

    /// `false` only when a verifier is configured and asks to wait
    async fn verification_allows(&self, event: &PendingEvent) -> bool {
        let Some(verifier) = &self.verifier else {
            return true;
        };

        let oracle_price = match self.market.onchain_price(event.feed_id).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("On-chain price unavailable for event {}: {:#}", event.id, e);
                None
            }
        };
        let market_price = self.prices.latest_price(event.feed_id).await;

        let (oracle_price, market_price) = match (oracle_price, market_price) {
            (Some(oracle), Some(market)) => (oracle, market),
            (Some(price), None) | (None, Some(price)) => (price, price),
            (None, None) => {
                warn!("No prices to verify event {}, resolving without verification", event.id);
                return true;
            }
        };

        match verifier
            .verify_event_outcome(&event.question, event.target_price_f64(), market_price, oracle_price)
            .await
        {
            Ok(verdict) if !verdict.should_resolve => {
                info!("Deferring event {}: {}", event.id, verdict.reasoning);
                self.metrics.inc_resolutions_deferred();
                false
            }
            Ok(verdict) => {
                info!(
                    "Verifier expects {} for event {}: {}",
                    if verdict.outcome { "YES" } else { "NO" },
                    event.id,
                    verdict.reasoning
                );
                true
            }
            Err(e) => {
                warn!("Verification failed for event {}, resolving anyway: {:#}", event.id, e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{FakeMarket, FakePrices, FakeVerifier};
    use alloy::primitives::B256;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn ts(offset_secs: i64) -> u64 {
        (now().timestamp() + offset_secs) as u64
    }

    fn resolver_for(market: Arc<FakeMarket>) -> EventResolver {
        EventResolver::new(market, Arc::new(FakePrices::standard()), AgentMetrics::new())
            .with_resolution_delay(Duration::ZERO)
    }

    fn pending(deadline: u64, resolved: bool) -> PendingEvent {
        PendingEvent {
            id: U256::from(1),
            question: "Will BTC reach $100,000?".to_string(),
            feed_id: B256::ZERO,
            target_price: 100_000_00000000,
            deadline,
            resolved,
        }
    }

    #[test]
    fn test_ready_for_resolution() {
        assert!(is_ready_for_resolution(&pending(ts(-1), false), now()));
        assert!(is_ready_for_resolution(&pending(ts(0), false), now()));
        assert!(!is_ready_for_resolution(&pending(ts(60), false), now()));
        assert!(!is_ready_for_resolution(&pending(ts(-60), true), now()));
    }

    #[tokio::test]
    async fn test_only_expired_open_events_are_resolved() {
        let market = Arc::new(
            FakeMarket::new()
                .with_event(1, "expired", ts(-3600), false)
                .with_event(2, "future", ts(3600), false)
                .with_event(3, "expired too", ts(-10), false),
        );
        let resolver = resolver_for(market.clone());

        assert_eq!(resolver.process_resolutions_at(now()).await, 2);
        assert_eq!(market.resolve_calls(), vec![U256::from(1), U256::from(3)]);

        // Next pass finds nothing left to do
        assert_eq!(resolver.process_resolutions_at(now()).await, 0);
        assert_eq!(market.resolve_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_resolution_is_not_counted() {
        let market = FakeMarket {
            failing_resolutions: [U256::from(1)].into_iter().collect(),
            ..FakeMarket::default()
        };
        let market = Arc::new(
            market
                .with_event(1, "reverts", ts(-10), false)
                .with_event(2, "fine", ts(-10), false),
        );
        let metrics = AgentMetrics::new();
        let resolver = EventResolver::new(market.clone(), Arc::new(FakePrices::standard()), metrics.clone())
            .with_resolution_delay(Duration::ZERO);

        assert_eq!(resolver.process_resolutions_at(now()).await, 1);
        assert_eq!(market.resolve_calls().len(), 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.resolutions_ok, 1);
        assert_eq!(snap.resolutions_failed, 1);
    }

    #[tokio::test]
    async fn test_unreachable_contract_yields_nothing() {
        let market = Arc::new(FakeMarket {
            fail_active_events: true,
            ..FakeMarket::default()
        });
        let resolver = resolver_for(market.clone());

        assert!(resolver.active_events().await.is_empty());
        assert_eq!(resolver.process_resolutions_at(now()).await, 0);
        assert!(resolver.event_details(U256::from(42)).await.is_none());
    }

    #[tokio::test]
    async fn test_verifier_can_defer_resolution() {
        let market = Arc::new(FakeMarket::new().with_event(1, "expired", ts(-10), false));
        let verifier = Arc::new(FakeVerifier::answering(false));
        let resolver = resolver_for(market.clone()).with_verifier(verifier.clone());

        assert_eq!(resolver.process_resolutions_at(now()).await, 0);
        assert!(market.resolve_calls().is_empty());
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verifier_approval_and_failure_both_resolve() {
        let approved_market = Arc::new(FakeMarket::new().with_event(1, "expired", ts(-10), false));
        let approving = resolver_for(approved_market.clone())
            .with_verifier(Arc::new(FakeVerifier::answering(true)));
        assert_eq!(approving.process_resolutions_at(now()).await, 1);
        assert_eq!(approved_market.resolve_calls(), vec![U256::from(1)]);

        let offline_market = Arc::new(FakeMarket::new().with_event(1, "expired", ts(-10), false));
        let failing = resolver_for(offline_market.clone()).with_verifier(Arc::new(FakeVerifier::failing()));
        assert_eq!(failing.process_resolutions_at(now()).await, 1);
        assert_eq!(offline_market.resolve_calls(), vec![U256::from(1)]);
    }

    #[tokio::test]
    async fn test_verifier_not_consulted_before_deadline() {
        let market = Arc::new(FakeMarket::new().with_event(1, "future", ts(600), false));
        let verifier = Arc::new(FakeVerifier::answering(true));
        let resolver = resolver_for(market.clone()).with_verifier(verifier.clone());

        assert_eq!(resolver.process_resolutions_at(now()).await, 0);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }
}
