//! Pyth Hermes price client
//!
//! Fetches the latest off-chain price for each configured feed. Failed fetches
//! are retried with linear backoff and then reported as missing prices, never
//! as errors, so one bad feed does not block event creation for the others.

use super::api_errors::ApiError;
use super::metrics::AgentMetrics;
use super::retry::{with_retry, RetryConfig};
use super::PriceSource;
use crate::config::{FeedConfig, PythApi};
use crate::types::{PriceBook, PythPrice};
use alloy::primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::prelude::*;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pyth prices are submitted with 8 implied decimals
const PYTH_DECIMALS: u32 = 8;

pub struct PythClient {
    client: reqwest::Client,
    base_url: String,
    feeds: Vec<FeedConfig>,
    retry: RetryConfig,
    metrics: AgentMetrics,
}

impl PythClient {
    pub fn new(base_url: &str, feeds: Vec<FeedConfig>, metrics: AgentMetrics) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            feeds,
            retry: RetryConfig::default(),
            metrics,
        })
    }

    /// Single Hermes request for one feed
    pub async fn fetch_price(&self, feed_id: B256) -> Result<PythPrice, ApiError> {
        let url = PythApi::latest_price_feeds_url(&self.base_url);
        let id = feed_id.to_string();
        debug!("Fetching price from Pyth: {}?ids[]={}", url, id);

        let resp = self
            .client
            .get(&url)
            .query(&[("ids[]", id.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::from_network_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), &body));
        }

        let prices: Vec<PythPrice> = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        prices.into_iter().next().ok_or(ApiError::Empty)
    }

    /// Latest human-readable price, retried; `None` after the last attempt fails
    pub async fn latest_price(&self, feed_id: B256) -> Option<f64> {
        let op_name = format!("Pyth price {}", feed_id);
        let result = with_retry(&self.retry, &op_name, || self.fetch_price(feed_id)).await;

        let price = match result {
            Ok(data) => format_pyth_price(&data),
            Err(e) => Err(e.into()),
        };

        match price {
            Ok(price) => {
                info!("Fetched price for {}: ${:.2}", feed_id, price);
                Some(price)
            }
            Err(e) => {
                warn!("Failed to fetch price for {}: {}", feed_id, e);
                self.metrics.inc_price_fetch_failures();
                None
            }
        }
    }

    /// Prices for every configured feed; feeds that fail are left out
    pub async fn all_prices(&self) -> PriceBook {
        let lookups = self.feeds.iter().filter_map(|feed| match feed.feed_id() {
            Ok(id) => Some(async move { (feed.asset, self.latest_price(id).await) }),
            Err(e) => {
                warn!("{}", e);
                None
            }
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(asset, price)| price.map(|p| (asset, p)))
            .collect()
    }
}

#[async_trait]
impl PriceSource for PythClient {
    async fn latest_price(&self, feed_id: B256) -> Option<f64> {
        PythClient::latest_price(self, feed_id).await
    }

    async fn all_prices(&self) -> PriceBook {
        PythClient::all_prices(self).await
    }
}

/// `price × 10^expo` for a Hermes payload
pub fn format_pyth_price(data: &PythPrice) -> Result<f64> {
    let mantissa: i64 = data
        .price
        .price
        .trim()
        .parse()
        .with_context(|| format!("Invalid Pyth price mantissa '{}'", data.price.price))?;
    scale_price(mantissa, data.price.expo)
}

/// Apply a Pyth exponent to an integer mantissa
pub fn scale_price(mantissa: i64, expo: i32) -> Result<f64> {
    let mut value = Decimal::from(mantissa);
    if expo < 0 {
        value
            .set_scale(expo.unsigned_abs())
            .with_context(|| format!("Pyth exponent {} out of range", expo))?;
    } else {
        let factor = 10i64
            .checked_pow(expo as u32)
            .with_context(|| format!("Pyth exponent {} out of range", expo))?;
        value = value
            .checked_mul(Decimal::from(factor))
            .context("Pyth price overflow")?;
    }
    value.to_f64().context("Pyth price not representable as f64")
}

/// Target after a percentage move, e.g. `pct = -5.0` for 5% down
pub fn calculate_target_price(current: f64, percentage_change: f64) -> f64 {
    current * (1.0 + percentage_change / 100.0)
}

/// Contract representation of a price: floor(price × 1e8)
pub fn to_pyth_int64(price: f64) -> Option<i64> {
    // Go through the shortest round-trip text so 121234.56 stays 121234.56
    let value = Decimal::from_str(&price.to_string()).ok()?;
    value
        .checked_mul(Decimal::from(10i64.pow(PYTH_DECIMALS)))?
        .floor()
        .to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HERMES_SAMPLE: &str = r#"[{
        "id": "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
        "price": {"price": "6712345678901", "conf": "3456789", "expo": -8, "publish_time": 1760700000},
        "ema_price": {"price": "6700000000000", "conf": "3000000", "expo": -8, "publish_time": 1760700000}
    }]"#;

    #[test]
    fn test_decode_hermes_payload() {
        let prices: Vec<PythPrice> = serde_json::from_str(HERMES_SAMPLE).unwrap();
        assert_eq!(prices.len(), 1);
        let price = format_pyth_price(&prices[0]).unwrap();
        assert!((price - 67123.45678901).abs() < 1e-6);
        assert_eq!(prices[0].price.publish_time, 1760700000);
    }

    #[test]
    fn test_scale_price() {
        assert!((scale_price(12345, -2).unwrap() - 123.45).abs() < 1e-9);
        assert_eq!(scale_price(7, 3).unwrap(), 7000.0);
        assert_eq!(scale_price(-150, -1).unwrap(), -15.0);
        assert!(scale_price(1, -40).is_err());
    }

    #[test]
    fn test_target_price() {
        assert!((calculate_target_price(100_000.0, 10.0) - 110_000.0).abs() < 1e-6);
        assert!((calculate_target_price(3_500.0, -10.0) - 3_150.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_pyth_int64_is_exact() {
        assert_eq!(to_pyth_int64(121_234.56), Some(12_123_456_000_000));
        assert_eq!(to_pyth_int64(3_000.0), Some(300_000_000_000));
        assert_eq!(to_pyth_int64(0.123456789), Some(12_345_678));
        assert_eq!(to_pyth_int64(f64::NAN), None);
    }

    #[test]
    fn test_bad_mantissa_is_an_error() {
        let mut prices: Vec<PythPrice> = serde_json::from_str(HERMES_SAMPLE).unwrap();
        prices[0].price.price = "n/a".to_string();
        assert!(format_pyth_price(&prices[0]).is_err());
    }
}
