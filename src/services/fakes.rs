//! In-memory collaborators for orchestration tests

use super::{IdeaSource, MarketGateway, OutcomeVerdict, OutcomeVerifier, PriceSource};
use crate::config::FeedConfig;
use crate::types::{Asset, CreatedEvent, MarketEvent, NewEvent, PriceBook, ResolvedEvent};
use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub const BTC_FEED: &str = "0xe62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43";
pub const ETH_FEED: &str = "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace";
pub const SOL_FEED: &str = "0xef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d";

pub fn feed_id(hex: &str) -> B256 {
    B256::from_str(hex).unwrap()
}

pub fn test_feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig {
            asset: Asset::Btc,
            id: BTC_FEED.to_string(),
            symbol: "BTC/USD",
            description: "Bitcoin / US Dollar",
        },
        FeedConfig {
            asset: Asset::Eth,
            id: ETH_FEED.to_string(),
            symbol: "ETH/USD",
            description: "Ethereum / US Dollar",
        },
        FeedConfig {
            asset: Asset::Sol,
            id: SOL_FEED.to_string(),
            symbol: "SOL/USD",
            description: "Solana / US Dollar",
        },
    ]
}

/// Fixed prices keyed by asset and by feed id
pub struct FakePrices {
    book: PriceBook,
}

impl FakePrices {
    pub fn new(prices: &[(Asset, f64)]) -> Self {
        Self {
            book: prices.iter().copied().collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(&[(Asset::Btc, 100_000.0), (Asset::Eth, 3_500.0), (Asset::Sol, 200.0)])
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn latest_price(&self, feed_id: B256) -> Option<f64> {
        let asset = test_feeds()
            .into_iter()
            .find(|f| f.feed_id().ok() == Some(feed_id))?
            .asset;
        self.book.get(asset)
    }

    async fn all_prices(&self) -> PriceBook {
        self.book.clone()
    }
}

/// Scripted idea responses, consumed in order; empty once exhausted
#[derive(Default)]
pub struct FakeIdeas {
    responses: Mutex<VecDeque<Result<Vec<String>, String>>>,
    pub existing_seen: Mutex<Vec<Vec<String>>>,
}

impl FakeIdeas {
    pub fn new(responses: Vec<Result<Vec<&str>, &str>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|r| {
                r.map(|ideas| ideas.into_iter().map(str::to_string).collect())
                    .map_err(str::to_string)
            })
            .collect();
        Self {
            responses: Mutex::new(responses),
            existing_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IdeaSource for FakeIdeas {
    async fn generate_event_ideas(
        &self,
        _prices: &PriceBook,
        existing_questions: &[String],
    ) -> Result<Vec<String>> {
        self.existing_seen
            .lock()
            .unwrap()
            .push(existing_questions.to_vec());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(ideas)) => Ok(ideas),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(Vec::new()),
        }
    }
}

/// Verifier that always answers with the same verdict, or fails
pub struct FakeVerifier {
    verdict: Option<OutcomeVerdict>,
    pub calls: AtomicU32,
}

impl FakeVerifier {
    pub fn answering(should_resolve: bool) -> Self {
        Self {
            verdict: Some(OutcomeVerdict {
                should_resolve,
                outcome: true,
                reasoning: "scripted".to_string(),
            }),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: None,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl OutcomeVerifier for FakeVerifier {
    async fn verify_event_outcome(
        &self,
        _question: &str,
        _target_price: f64,
        _market_price: f64,
        _oracle_price: f64,
    ) -> Result<OutcomeVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.clone().ok_or_else(|| anyhow!("verifier offline"))
    }
}

/// Contract double holding events in memory
#[derive(Default)]
pub struct FakeMarket {
    pub events: Mutex<BTreeMap<U256, MarketEvent>>,
    pub created: Mutex<Vec<NewEvent>>,
    pub resolve_calls: Mutex<Vec<U256>>,
    pub failing_resolutions: HashSet<U256>,
    pub fail_active_events: bool,
    /// Create without emitting an id, like a receipt missing its log
    pub omit_event_ids: bool,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(self, id: u64, question: &str, deadline: u64, resolved: bool) -> Self {
        let event = MarketEvent {
            id: U256::from(id),
            question: question.to_string(),
            feed_id: feed_id(BTC_FEED),
            target_price: 100_000_00000000,
            deadline,
            total_yes: U256::ZERO,
            total_no: U256::ZERO,
            total_pool: U256::ZERO,
            resolved,
            outcome: false,
            creator: Address::ZERO,
            created_at: 0,
        };
        self.events.lock().unwrap().insert(event.id, event);
        self
    }

    pub fn created(&self) -> Vec<NewEvent> {
        self.created.lock().unwrap().clone()
    }

    pub fn resolve_calls(&self) -> Vec<U256> {
        self.resolve_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketGateway for FakeMarket {
    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent> {
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        let id = U256::from(created.len());
        Ok(CreatedEvent {
            event_id: (!self.omit_event_ids).then_some(id),
            tx_hash: B256::with_last_byte(created.len() as u8),
            block_number: Some(1),
        })
    }

    async fn resolve_event(&self, event_id: U256) -> Result<ResolvedEvent> {
        self.resolve_calls.lock().unwrap().push(event_id);
        if self.failing_resolutions.contains(&event_id) {
            return Err(anyhow!("execution reverted: event {} not ready", event_id));
        }
        let mut events = self.events.lock().unwrap();
        let event = events
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("no event {}", event_id))?;
        event.resolved = true;
        Ok(ResolvedEvent {
            tx_hash: B256::with_last_byte(0xaa),
            outcome: Some(true),
            final_price: Some(event.target_price),
        })
    }

    async fn get_event(&self, event_id: U256) -> Result<MarketEvent> {
        self.events
            .lock()
            .unwrap()
            .get(&event_id)
            .cloned()
            .ok_or_else(|| anyhow!("no event {}", event_id))
    }

    async fn active_event_ids(&self) -> Result<Vec<U256>> {
        if self.fail_active_events {
            return Err(anyhow!("rpc unavailable"));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.resolved)
            .map(|e| e.id)
            .collect())
    }

    async fn onchain_price(&self, _feed_id: B256) -> Result<f64> {
        Ok(100_500.0)
    }
}
