//! Configuration management for the Fatecast agent

use crate::types::Asset;
use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Agent configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Network name, for display only
    pub network: String,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    pub chain_id: u64,

    /// Agent signing key (0x-prefixed hex)
    pub agent_private_key: String,

    pub prediction_market_address: String,

    /// Settlement token (PYUSD)
    pub pyusd_address: String,

    pub pyth_oracle_address: String,

    /// Pyth Hermes base URL
    pub pyth_hermes_url: String,

    pub pyth_network: String,

    /// ASI:One chat-completions endpoint
    pub asi_one_api_url: String,

    /// ASI:One API key (AGENT_API_KEY or ASI_ONE_API_KEY)
    pub asi_one_api_key: Option<String>,

    /// Event creation interval in milliseconds
    pub event_creation_interval_ms: u64,

    /// Event resolution interval in milliseconds
    pub event_resolution_interval_ms: u64,

    pub max_events_per_day: u32,

    /// Minimum event duration in seconds
    pub min_event_duration_secs: u64,

    /// Maximum event duration in seconds
    pub max_event_duration_secs: u64,

    pub log_level: String,

    /// Optional log file, mirrored from stdout
    pub log_file: Option<String>,

    /// Append-only file for raw generated ideas
    pub asi_response_log: Option<String>,

    /// Ask the LLM to confirm outcomes before resolving
    pub verify_resolutions: bool,

    pub feeds: Vec<FeedConfig>,
}

/// One Pyth price feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub asset: Asset,
    /// 32-byte feed id, 0x-prefixed hex
    pub id: String,
    pub symbol: &'static str,
    pub description: &'static str,
}

impl FeedConfig {
    pub fn feed_id(&self) -> Result<B256> {
        B256::from_str(&self.id).with_context(|| format!("Invalid feed id for {}: {}", self.asset, self.id))
    }
}

/// Default Pyth feeds, keyed by env override name
const DEFAULT_FEEDS: [(Asset, &str, &str, &str, &str); 3] = [
    (
        Asset::Btc,
        "PYTH_BTC_USD",
        "0xe62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
        "BTC/USD",
        "Bitcoin / US Dollar",
    ),
    (
        Asset::Eth,
        "PYTH_ETH_USD",
        "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
        "ETH/USD",
        "Ethereum / US Dollar",
    ),
    (
        Asset::Sol,
        "PYTH_SOL_USD",
        "0xef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d",
        "SOL/USD",
        "Solana / US Dollar",
    ),
];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup (env, map in tests)
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let var_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let parse_u64 = |key: &str, default: u64| -> Result<u64> {
            match var(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be an integer, got '{}'", key, v)),
                None => Ok(default),
            }
        };

        let feeds = DEFAULT_FEEDS
            .iter()
            .map(|(asset, env_key, default_id, symbol, description)| FeedConfig {
                asset: *asset,
                id: var_or(env_key, default_id),
                symbol: *symbol,
                description: *description,
            })
            .collect();

        let asi_one_api_key = var("AGENT_API_KEY").or_else(|| var("ASI_ONE_API_KEY"));

        let log_file = match lookup("LOG_FILE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => Some("./logs/agent.log".to_string()),
        };

        let asi_response_log = match lookup("ASI_RESPONSE_LOG") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => Some("./logs/asi_responses.log".to_string()),
        };

        let verify_resolutions = var("AI_VERIFY_RESOLUTIONS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            network: var_or("NETWORK", "sepolia"),
            rpc_url: var_or("RPC_URL", ""),
            chain_id: parse_u64("CHAIN_ID", 11_155_111)?,
            agent_private_key: var_or("AGENT_PRIVATE_KEY", ""),
            prediction_market_address: var_or("PREDICTION_MARKET_ADDRESS", ""),
            pyusd_address: var_or("PYUSD_ADDRESS", ""),
            pyth_oracle_address: var_or(
                "PYTH_ORACLE_ADDRESS",
                "0xDd24F84d36BF92C65F92307595335bdFab5Bbd21",
            ),
            pyth_hermes_url: var_or("PYTH_HERMES_URL", PythApi::DEFAULT_HERMES_URL),
            pyth_network: var_or("PYTH_NETWORK", "sepolia"),
            asi_one_api_url: var_or("ASI_ONE_API_URL", AsiOneApi::DEFAULT_URL),
            asi_one_api_key,
            event_creation_interval_ms: parse_u64("EVENT_CREATION_INTERVAL", 3_600_000)?,
            event_resolution_interval_ms: parse_u64("EVENT_RESOLUTION_INTERVAL", 300_000)?,
            max_events_per_day: u32::try_from(parse_u64("MAX_EVENTS_PER_DAY", 10)?)
                .context("MAX_EVENTS_PER_DAY is too large")?,
            min_event_duration_secs: parse_u64("MIN_EVENT_DURATION", 86_400)?,
            max_event_duration_secs: parse_u64("MAX_EVENT_DURATION", 2_592_000)?,
            log_level: var_or("LOG_LEVEL", "info"),
            log_file,
            asi_response_log,
            verify_resolutions,
            feeds,
        })
    }

    /// Fail fast on missing or malformed settings needed to touch the chain
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("RPC_URL", &self.rpc_url),
            ("AGENT_PRIVATE_KEY", &self.agent_private_key),
            ("PREDICTION_MARKET_ADDRESS", &self.prediction_market_address),
            ("PYUSD_ADDRESS", &self.pyusd_address),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(key, _)| *key)
            .collect();

        if !missing.is_empty() {
            anyhow::bail!("Missing required configuration: {}", missing.join(", "));
        }

        if !self.agent_private_key.starts_with("0x") {
            anyhow::bail!("Agent private key must start with 0x");
        }

        for (key, value) in [
            ("PREDICTION_MARKET_ADDRESS", &self.prediction_market_address),
            ("PYUSD_ADDRESS", &self.pyusd_address),
            ("PYTH_ORACLE_ADDRESS", &self.pyth_oracle_address),
        ] {
            Address::from_str(value).with_context(|| format!("{} is not a valid address: {}", key, value))?;
        }

        for feed in &self.feeds {
            feed.feed_id()?;
        }

        if self.min_event_duration_secs > self.max_event_duration_secs {
            anyhow::bail!(
                "MIN_EVENT_DURATION ({}) exceeds MAX_EVENT_DURATION ({})",
                self.min_event_duration_secs,
                self.max_event_duration_secs
            );
        }

        if self.event_creation_interval_ms == 0 || self.event_resolution_interval_ms == 0 {
            anyhow::bail!("Event creation and resolution intervals must be non-zero");
        }

        Ok(())
    }

    /// Feed configuration for an asset, if one is configured
    pub fn feed_for(&self, asset: Asset) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.asset == asset)
    }

    pub fn event_creation_interval(&self) -> Duration {
        Duration::from_millis(self.event_creation_interval_ms)
    }

    pub fn event_resolution_interval(&self) -> Duration {
        Duration::from_millis(self.event_resolution_interval_ms)
    }
}

/// Pyth Hermes API configuration
pub struct PythApi;

impl PythApi {
    pub const DEFAULT_HERMES_URL: &'static str = "https://hermes.pyth.network";

    pub fn latest_price_feeds_url(base: &str) -> String {
        format!("{}/api/latest_price_feeds", base.trim_end_matches('/'))
    }
}

/// ASI:One API configuration
pub struct AsiOneApi;

impl AsiOneApi {
    pub const DEFAULT_URL: &'static str = "https://api.asi1.ai/v1/chat/completions";
    pub const MODEL_MINI: &'static str = "asi1-mini";
    pub const MODEL_EXTENDED: &'static str = "asi1-extended";
}
