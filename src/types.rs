//! Core types for the Fatecast agent

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Assets the agent knows how to talk about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    Btc,
    Eth,
    Sol,
    Xrp,
}

impl Asset {
    /// Ticker symbol, e.g. "BTC"
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Sol => "SOL",
            Asset::Xrp => "XRP",
        }
    }

    /// Feed key used in configuration, e.g. "BTC_USD"
    pub fn feed_key(&self) -> String {
        format!("{}_USD", self.symbol())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Asset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BTC" | "BITCOIN" | "BTC_USD" => Ok(Asset::Btc),
            "ETH" | "ETHEREUM" | "ETH_USD" => Ok(Asset::Eth),
            "SOL" | "SOLANA" | "SOL_USD" => Ok(Asset::Sol),
            "XRP" | "RIPPLE" | "XRP_USD" => Ok(Asset::Xrp),
            other => anyhow::bail!("Unknown asset: {}", other),
        }
    }
}

/// Latest prices by asset, fetched from the oracle. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBook {
    prices: BTreeMap<Asset, f64>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: Asset, price: f64) {
        self.prices.insert(asset, price);
    }

    pub fn get(&self, asset: Asset) -> Option<f64> {
        self.prices.get(&asset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Asset, f64)> + '_ {
        self.prices.iter().map(|(a, p)| (*a, *p))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(Asset, f64)> for PriceBook {
    fn from_iter<I: IntoIterator<Item = (Asset, f64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Hermes price payload for one feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythPrice {
    pub id: String,
    pub price: PythPriceData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythPriceData {
    /// Integer mantissa as a decimal string
    pub price: String,
    pub conf: String,
    pub expo: i32,
    pub publish_time: i64,
}

/// Static template for price-threshold events
#[derive(Debug, Clone, PartialEq)]
pub struct EventTemplate {
    /// Question pattern with `[TARGET]` and `[DATE]` placeholders
    pub question: &'static str,
    pub asset: Asset,
    /// Signed percentage move applied to the current price
    pub percentage_change: f64,
    pub duration_days: u32,
}

/// Structured reading of a generated question
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestion {
    pub asset: Asset,
    pub target_price: f64,
    pub duration_days: u32,
}

/// Arguments for `createEvent`
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub question: String,
    pub feed_id: B256,
    /// Target price with 8 implied decimals
    pub target_price: i64,
    /// Unix seconds
    pub deadline: u64,
}

/// Result of a confirmed `createEvent` transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEvent {
    /// None when the receipt carried no `EventCreated` log
    pub event_id: Option<U256>,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

impl CreatedEvent {
    pub fn id_display(&self) -> String {
        self.event_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Result of a confirmed `resolveEvent` transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEvent {
    pub tx_hash: B256,
    pub outcome: Option<bool>,
    pub final_price: Option<i64>,
}

/// Full on-chain event, decoded by field name from `getEvent`
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pub id: U256,
    pub question: String,
    pub feed_id: B256,
    pub target_price: i64,
    pub deadline: u64,
    pub total_yes: U256,
    pub total_no: U256,
    pub total_pool: U256,
    pub resolved: bool,
    pub outcome: bool,
    pub creator: Address,
    pub created_at: u64,
}

impl MarketEvent {
    pub fn deadline_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.deadline as i64, 0)
    }

    /// Target price as a float (8 implied decimals)
    pub fn target_price_f64(&self) -> f64 {
        self.target_price as f64 / 1e8
    }

    /// Time left until the deadline: "Expired", "42s", "17m", "5h" or "3d"
    pub fn time_remaining_display(&self, now: DateTime<Utc>) -> String {
        let secs = self.deadline as i64 - now.timestamp();
        if secs < 0 {
            return "Expired".to_string();
        }
        if secs < 60 {
            return format!("{}s", secs);
        }
        let minutes = secs / 60;
        if minutes < 60 {
            return format!("{}m", minutes);
        }
        let hours = minutes / 60;
        if hours < 24 {
            return format!("{}h", hours);
        }
        format!("{}d", hours / 24)
    }
}

/// What the resolver needs to know about an event
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub id: U256,
    pub question: String,
    pub feed_id: B256,
    pub target_price: i64,
    pub deadline: u64,
    pub resolved: bool,
}

impl From<MarketEvent> for PendingEvent {
    fn from(event: MarketEvent) -> Self {
        Self {
            id: event.id,
            question: event.question,
            feed_id: event.feed_id,
            target_price: event.target_price,
            deadline: event.deadline,
            resolved: event.resolved,
        }
    }
}

impl PendingEvent {
    pub fn deadline_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.deadline as i64, 0)
    }

    pub fn target_price_f64(&self) -> f64 {
        self.target_price as f64 / 1e8
    }
}

/// Prediction side for `enterMarket`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_bool(&self) -> bool {
        matches!(self, Side::Yes)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "true" => Ok(Side::Yes),
            "no" | "n" | "false" => Ok(Side::No),
            other => anyhow::bail!("Side must be yes or no, got '{}'", other),
        }
    }
}

/// Compact number display: 1500 -> "1.5K", 2_300_000 -> "2.3M"
pub fn format_compact(num: f64) -> String {
    if num >= 1_000_000.0 {
        format!("{:.1}M", num / 1_000_000.0)
    } else if num >= 1_000.0 {
        format!("{:.1}K", num / 1_000.0)
    } else {
        format!("{:.2}", num)
    }
}

/// Shorten an address for display: 0x1234...abcd
pub fn truncate_address(address: &str, chars: usize) -> String {
    if address.len() <= chars * 2 + 2 {
        return address.to_string();
    }
    format!("{}...{}", &address[..chars + 2], &address[address.len() - chars..])
}

/// Price with thousands separators and two decimals: 121234.5 -> "121,234.50"
pub fn format_usd(price: f64) -> String {
    let fixed = format!("{:.2}", price.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_with_deadline(deadline: u64) -> MarketEvent {
        MarketEvent {
            id: U256::from(1),
            question: "Will BTC reach $100,000?".to_string(),
            feed_id: B256::ZERO,
            target_price: 100_000_00000000,
            deadline,
            total_yes: U256::ZERO,
            total_no: U256::ZERO,
            total_pool: U256::ZERO,
            resolved: false,
            outcome: false,
            creator: Address::ZERO,
            created_at: 0,
        }
    }

    #[test]
    fn test_asset_parsing() {
        assert_eq!("btc".parse::<Asset>().unwrap(), Asset::Btc);
        assert_eq!("Ethereum".parse::<Asset>().unwrap(), Asset::Eth);
        assert_eq!("SOL_USD".parse::<Asset>().unwrap(), Asset::Sol);
        assert!("doge".parse::<Asset>().is_err());
        assert_eq!(Asset::Xrp.feed_key(), "XRP_USD");
    }

    #[test]
    fn test_time_remaining_display() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let ts = now.timestamp() as u64;

        assert_eq!(event_with_deadline(ts - 1).time_remaining_display(now), "Expired");
        assert_eq!(event_with_deadline(ts + 30).time_remaining_display(now), "30s");
        assert_eq!(event_with_deadline(ts + 600).time_remaining_display(now), "10m");
        assert_eq!(event_with_deadline(ts + 5 * 3600).time_remaining_display(now), "5h");
        assert_eq!(event_with_deadline(ts + 3 * 86400).time_remaining_display(now), "3d");
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_usd(121234.5), "121,234.50");
        assert_eq!(format_usd(999.999), "1,000.00");
        assert_eq!(format_usd(12.0), "12.00");
        assert_eq!(format_compact(1500.0), "1.5K");
        assert_eq!(format_compact(2_300_000.0), "2.3M");
        assert_eq!(format_compact(12.0), "12.00");
        assert_eq!(
            truncate_address("0x1234567890abcdef1234567890abcdef12345678", 4),
            "0x1234...5678"
        );
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("YES".parse::<Side>().unwrap(), Side::Yes);
        assert_eq!("n".parse::<Side>().unwrap(), Side::No);
        assert!("maybe".parse::<Side>().is_err());
        assert!(Side::Yes.as_bool());
    }
}
