//! On-chain gateway for the prediction market
//!
//! Wraps the PredictionMarket contract, the PYUSD settlement token and the Pyth
//! contract behind one signing provider. Contract tuples are decoded here, by
//! field name, into the crate's own types.

use super::pyth::scale_price;
use super::MarketGateway;
use crate::config::Config;
use crate::types::{CreatedEvent, MarketEvent, NewEvent, ResolvedEvent, Side};
use alloy::network::EthereumWallet;
use alloy::primitives::utils::{format_ether, format_units};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol;
use alloy::sol_types::SolEvent;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::*;
use std::str::FromStr;
use tracing::{info, warn};

sol! {
    #[sol(rpc)]
    interface IPredictionMarket {
        function createEvent(string question, bytes32 pythFeedId, int64 targetPrice, uint256 deadline) external returns (uint256);
        function resolveEvent(uint256 eventId) external;
        function getEvent(uint256 eventId) external view returns (uint256 id, string question, bytes32 pythFeedId, int64 targetPrice, uint256 deadline, uint256 totalYes, uint256 totalNo, uint256 totalPool, bool resolved, bool outcome, address creator, uint256 createdAt);
        function getActiveEvents() external view returns (uint256[]);
        function eventCounter() external view returns (uint256);
        function enterMarket(uint256 eventId, bool prediction, uint256 amount) external;
        function claimWinnings(uint256 eventId) external;
        function getUserBet(address user, uint256 eventId) external view returns (uint256 amount, bool prediction);

        event EventCreated(uint256 indexed eventId, string question, bytes32 pythFeedId, int64 targetPrice, uint256 deadline, address indexed creator);
        event EventResolved(uint256 indexed eventId, bool outcome, int64 finalPrice);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface IPyth {
        struct Price {
            int64 price;
            uint64 conf;
            int32 expo;
            uint256 publishTime;
        }

        function getPriceUnsafe(bytes32 id) external view returns (Price memory price);
    }
}

/// A user's position in one event
#[derive(Debug, Clone, PartialEq)]
pub struct UserBet {
    pub amount: U256,
    pub prediction: Side,
}

/// Settlement token balance with its display metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub raw: U256,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenBalance {
    pub fn display(&self) -> String {
        let amount = format_units(self.raw, self.decimals).unwrap_or_else(|_| self.raw.to_string());
        format!("{} {}", amount, self.symbol)
    }
}

pub struct MarketClient {
    provider: DynProvider,
    agent: Address,
    market: IPredictionMarket::IPredictionMarketInstance<DynProvider>,
    token: IERC20::IERC20Instance<DynProvider>,
    pyth: IPyth::IPythInstance<DynProvider>,
}

impl MarketClient {
    /// Build a signing provider from the agent key and bind the three contracts
    pub fn connect(config: &Config) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .agent_private_key
            .parse()
            .context("Failed to parse AGENT_PRIVATE_KEY")?;
        let signer = signer.with_chain_id(Some(config.chain_id));
        let agent = signer.address();

        let rpc_url = config
            .rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC_URL '{}': {}", config.rpc_url, e))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();

        let market_address = Address::from_str(&config.prediction_market_address)
            .context("Invalid PREDICTION_MARKET_ADDRESS")?;
        let token_address = Address::from_str(&config.pyusd_address).context("Invalid PYUSD_ADDRESS")?;
        let pyth_address =
            Address::from_str(&config.pyth_oracle_address).context("Invalid PYTH_ORACLE_ADDRESS")?;

        info!("Agent wallet address: {}", agent);

        Ok(Self {
            market: IPredictionMarket::new(market_address, provider.clone()),
            token: IERC20::new(token_address, provider.clone()),
            pyth: IPyth::new(pyth_address, provider.clone()),
            provider,
            agent,
        })
    }

    pub fn agent_address(&self) -> Address {
        self.agent
    }

    pub fn market_address(&self) -> Address {
        *self.market.address()
    }

    pub async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent> {
        let pending = self
            .market
            .createEvent(
                event.question.clone(),
                event.feed_id,
                event.target_price,
                U256::from(event.deadline),
            )
            .send()
            .await
            .context("Failed to send createEvent transaction")?;

        info!("Event creation transaction sent: {}", pending.tx_hash());

        let receipt = pending
            .get_receipt()
            .await
            .context("Failed to get createEvent receipt")?;
        ensure_success(&receipt, "createEvent")?;

        info!("Event created in block {}", block_display(&receipt));

        let event_id = find_log::<IPredictionMarket::EventCreated>(&receipt).map(|e| e.eventId);
        if event_id.is_none() {
            warn!("Event created but could not extract event ID from logs");
        }

        Ok(CreatedEvent {
            event_id,
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }

    pub async fn resolve_event(&self, event_id: U256) -> Result<ResolvedEvent> {
        let pending = self
            .market
            .resolveEvent(event_id)
            .send()
            .await
            .with_context(|| format!("Failed to send resolveEvent({})", event_id))?;

        info!("Resolution transaction sent: {}", pending.tx_hash());

        let receipt = pending
            .get_receipt()
            .await
            .context("Failed to get resolveEvent receipt")?;
        ensure_success(&receipt, "resolveEvent")?;

        let resolved = find_log::<IPredictionMarket::EventResolved>(&receipt);
        if let Some(log) = &resolved {
            info!(
                "Event {} resolved with outcome: {}, final price: {}",
                event_id,
                if log.outcome { "YES" } else { "NO" },
                log.finalPrice
            );
        }

        Ok(ResolvedEvent {
            tx_hash: receipt.transaction_hash,
            outcome: resolved.as_ref().map(|l| l.outcome),
            final_price: resolved.as_ref().map(|l| l.finalPrice),
        })
    }

    pub async fn get_event(&self, event_id: U256) -> Result<MarketEvent> {
        let data = self
            .market
            .getEvent(event_id)
            .call()
            .await
            .with_context(|| format!("Failed to fetch event {}", event_id))?;

        Ok(MarketEvent {
            id: data.id,
            question: data.question,
            feed_id: data.pythFeedId,
            target_price: data.targetPrice,
            deadline: u64::try_from(data.deadline).context("Event deadline out of range")?,
            total_yes: data.totalYes,
            total_no: data.totalNo,
            total_pool: data.totalPool,
            resolved: data.resolved,
            outcome: data.outcome,
            creator: data.creator,
            created_at: u64::try_from(data.createdAt).context("Event creation time out of range")?,
        })
    }

    pub async fn active_event_ids(&self) -> Result<Vec<U256>> {
        self.market
            .getActiveEvents()
            .call()
            .await
            .context("Failed to fetch active events")
    }

    pub async fn event_counter(&self) -> Result<U256> {
        self.market
            .eventCounter()
            .call()
            .await
            .context("Failed to fetch event counter")
    }

    pub async fn user_bet(&self, event_id: U256) -> Result<UserBet> {
        let bet = self
            .market
            .getUserBet(self.agent, event_id)
            .call()
            .await
            .with_context(|| format!("Failed to fetch bet for event {}", event_id))?;

        Ok(UserBet {
            amount: bet.amount,
            prediction: if bet.prediction { Side::Yes } else { Side::No },
        })
    }

    /// Price the contract will settle against, read from the Pyth contract
    pub async fn onchain_price(&self, feed_id: B256) -> Result<f64> {
        let price = self
            .pyth
            .getPriceUnsafe(feed_id)
            .call()
            .await
            .with_context(|| format!("Failed to read on-chain Pyth price for {}", feed_id))?;
        scale_price(price.price, price.expo)
    }

    /// Agent gas balance in ETH
    pub async fn native_balance(&self) -> Result<String> {
        let wei = self
            .provider
            .get_balance(self.agent)
            .await
            .context("Failed to fetch wallet balance")?;
        Ok(format_ether(wei))
    }

    pub async fn token_balance(&self) -> Result<TokenBalance> {
        let raw = self
            .token
            .balanceOf(self.agent)
            .call()
            .await
            .context("Failed to fetch token balance")?;
        let decimals = self.token.decimals().call().await.context("Failed to fetch token decimals")?;
        let symbol = self
            .token
            .symbol()
            .call()
            .await
            .unwrap_or_else(|_| "PYUSD".to_string());

        Ok(TokenBalance { raw, decimals, symbol })
    }

    /// Stake `amount` whole tokens on `side`, approving the market first when
    /// the current allowance does not cover it
    pub async fn enter_market(&self, event_id: U256, side: Side, amount: Decimal) -> Result<B256> {
        let decimals = self.token.decimals().call().await.context("Failed to fetch token decimals")?;
        let raw_amount = to_raw_units(amount, decimals)?;
        let spender = self.market_address();

        let allowance = self
            .token
            .allowance(self.agent, spender)
            .call()
            .await
            .context("Failed to fetch allowance")?;

        if allowance < raw_amount {
            info!("Approving {} raw units for market {}", raw_amount, spender);
            let receipt = self
                .token
                .approve(spender, raw_amount)
                .send()
                .await
                .context("Failed to send approval transaction")?
                .get_receipt()
                .await
                .context("Failed to get approval receipt")?;
            ensure_success(&receipt, "approve")?;
        }

        let pending = self
            .market
            .enterMarket(event_id, side.as_bool(), raw_amount)
            .send()
            .await
            .with_context(|| format!("Failed to send enterMarket({})", event_id))?;

        info!("Bet transaction sent: {}", pending.tx_hash());

        let receipt = pending
            .get_receipt()
            .await
            .context("Failed to get enterMarket receipt")?;
        ensure_success(&receipt, "enterMarket")?;

        Ok(receipt.transaction_hash)
    }

    pub async fn claim_winnings(&self, event_id: U256) -> Result<B256> {
        let receipt = self
            .market
            .claimWinnings(event_id)
            .send()
            .await
            .with_context(|| format!("Failed to send claimWinnings({})", event_id))?
            .get_receipt()
            .await
            .context("Failed to get claimWinnings receipt")?;
        ensure_success(&receipt, "claimWinnings")?;

        Ok(receipt.transaction_hash)
    }
}

#[async_trait]
impl MarketGateway for MarketClient {
    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent> {
        MarketClient::create_event(self, event).await
    }

    async fn resolve_event(&self, event_id: U256) -> Result<ResolvedEvent> {
        MarketClient::resolve_event(self, event_id).await
    }

    async fn get_event(&self, event_id: U256) -> Result<MarketEvent> {
        MarketClient::get_event(self, event_id).await
    }

    async fn active_event_ids(&self) -> Result<Vec<U256>> {
        MarketClient::active_event_ids(self).await
    }

    async fn onchain_price(&self, feed_id: B256) -> Result<f64> {
        MarketClient::onchain_price(self, feed_id).await
    }
}

fn ensure_success(receipt: &TransactionReceipt, call: &str) -> Result<()> {
    if !receipt.status() {
        anyhow::bail!("{} transaction {} reverted", call, receipt.transaction_hash);
    }
    Ok(())
}

fn block_display(receipt: &TransactionReceipt) -> String {
    receipt
        .block_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "pending".to_string())
}

/// First log in the receipt that decodes as `E`
fn find_log<E: SolEvent>(receipt: &TransactionReceipt) -> Option<E> {
    receipt
        .inner
        .logs()
        .iter()
        .find_map(|log| log.log_decode::<E>().ok())
        .map(|decoded| decoded.inner.data)
}

/// Whole-token amount to raw token units, truncating dust below one unit
pub fn to_raw_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount <= Decimal::ZERO {
        anyhow::bail!("Amount must be positive, got {}", amount);
    }
    let factor = 10u64
        .checked_pow(decimals as u32)
        .filter(|_| decimals <= 18)
        .with_context(|| format!("Unsupported token decimals: {}", decimals))?;
    let raw = amount
        .checked_mul(Decimal::from(factor))
        .context("Amount too large")?
        .trunc()
        .to_u128()
        .context("Amount too large")?;
    if raw == 0 {
        anyhow::bail!("Amount {} is below the smallest token unit", amount);
    }
    Ok(U256::from(raw))
}
