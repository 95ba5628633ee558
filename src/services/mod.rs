//! Network clients and the agent's background services
//!
//! The orchestration services (`event_creator`, `event_resolver`, `scheduler`)
//! only see the collaborator traits below, so they run against in-memory fakes
//! in tests and against Pyth, ASI:One and the chain in production.

pub mod api_errors;
pub mod asi_one;
pub mod contracts;
pub mod event_creator;
pub mod event_resolver;
pub mod metrics;
pub mod pyth;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod fakes;

use crate::types::{CreatedEvent, MarketEvent, NewEvent, PriceBook, ResolvedEvent};
use alloy::primitives::{B256, U256};
use anyhow::Result;
use async_trait::async_trait;

pub use api_errors::ApiError;
pub use asi_one::{AsiOneClient, OutcomeVerdict, TrendAnalysis};
pub use contracts::MarketClient;
pub use event_creator::{CreatorSettings, DailyCounter, EventCreator};
pub use event_resolver::EventResolver;
pub use metrics::{AgentMetrics, MetricsSnapshot};
pub use pyth::PythClient;
pub use scheduler::Scheduler;

/// Off-chain price feed
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest price for one feed, `None` when it could not be fetched
    async fn latest_price(&self, feed_id: B256) -> Option<f64>;

    /// Latest prices for every configured feed
    async fn all_prices(&self) -> PriceBook;
}

/// Generator of candidate event questions
#[async_trait]
pub trait IdeaSource: Send + Sync {
    async fn generate_event_ideas(
        &self,
        prices: &PriceBook,
        existing_questions: &[String],
    ) -> Result<Vec<String>>;
}

/// Second opinion consulted before an event is resolved
#[async_trait]
pub trait OutcomeVerifier: Send + Sync {
    async fn verify_event_outcome(
        &self,
        question: &str,
        target_price: f64,
        market_price: f64,
        oracle_price: f64,
    ) -> Result<OutcomeVerdict>;
}

/// The prediction market contract, as seen by the agent
#[async_trait]
pub trait MarketGateway: Send + Sync {
    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent>;

    async fn resolve_event(&self, event_id: U256) -> Result<ResolvedEvent>;

    async fn get_event(&self, event_id: U256) -> Result<MarketEvent>;

    async fn active_event_ids(&self) -> Result<Vec<U256>>;

    /// Price the contract settles against
    async fn onchain_price(&self, feed_id: B256) -> Result<f64>;
}
