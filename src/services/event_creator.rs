//! Event creation
//!
//! Two ways to open a market: a random price-threshold template applied to the
//! current price, or a question generated by ASI:One and read back by the
//! parser. Both respect a per-day limit tracked by `DailyCounter`.

use super::metrics::AgentMetrics;
use super::pyth::{calculate_target_price, to_pyth_int64};
use super::{IdeaSource, MarketGateway, PriceSource};
use crate::config::{Config, FeedConfig};
use crate::parser::{guess_asset_from_text, parse_question, round_to, DEFAULT_DURATION_DAYS};
use crate::types::{format_usd, Asset, CreatedEvent, EventTemplate, NewEvent, PriceBook};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

const SECONDS_PER_DAY: u64 = 86_400;

/// Heuristic move applied when a generated question cannot be used as written
const FALLBACK_MOVE: f64 = 0.10;

/// An explicit target further than this factor from the current price is
/// treated as a misread
const MAX_TARGET_RATIO: f64 = 10.0;

pub static TEMPLATES: [EventTemplate; 6] = [
    EventTemplate {
        question: "Will BTC reach [TARGET] by [DATE]?",
        asset: Asset::Btc,
        percentage_change: 10.0,
        duration_days: 7,
    },
    EventTemplate {
        question: "Will BTC fall below [TARGET] by [DATE]?",
        asset: Asset::Btc,
        percentage_change: -5.0,
        duration_days: 3,
    },
    EventTemplate {
        question: "Will ETH surpass [TARGET] by [DATE]?",
        asset: Asset::Eth,
        percentage_change: 15.0,
        duration_days: 14,
    },
    EventTemplate {
        question: "Will ETH drop below [TARGET] by [DATE]?",
        asset: Asset::Eth,
        percentage_change: -10.0,
        duration_days: 7,
    },
    EventTemplate {
        question: "Will SOL reach [TARGET] by [DATE]?",
        asset: Asset::Sol,
        percentage_change: 20.0,
        duration_days: 7,
    },
    EventTemplate {
        question: "Will SOL trade below [TARGET] by [DATE]?",
        asset: Asset::Sol,
        percentage_change: -8.0,
        duration_days: 5,
    },
];

/// Events submitted on the current calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCounter {
    count: u32,
    day: NaiveDate,
}

impl DailyCounter {
    pub fn new(today: NaiveDate) -> Self {
        Self { count: 0, day: today }
    }

    /// Zero the count when `today` differs from the tracked day.
    /// Returns whether a reset happened.
    pub fn reset_if_new_day(&mut self, today: NaiveDate) -> bool {
        if today != self.day {
            self.count = 0;
            self.day = today;
            info!("Daily event counter reset");
            true
        } else {
            false
        }
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Debug, Clone)]
pub struct CreatorSettings {
    pub max_events_per_day: u32,
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
    /// Pause between batch items so nonces settle
    pub batch_delay: Duration,
    /// Append-only record of raw generated ideas
    pub idea_log: Option<PathBuf>,
}

impl CreatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_events_per_day: config.max_events_per_day,
            min_duration_secs: config.min_event_duration_secs,
            max_duration_secs: config.max_event_duration_secs,
            batch_delay: Duration::from_secs(5),
            idea_log: config.asi_response_log.as_ref().map(PathBuf::from),
        }
    }
}

pub struct EventCreator {
    prices: Arc<dyn PriceSource>,
    ideas: Arc<dyn IdeaSource>,
    market: Arc<dyn MarketGateway>,
    feeds: Vec<FeedConfig>,
    settings: CreatorSettings,
    counter: DailyCounter,
    metrics: AgentMetrics,
}

impl EventCreator {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        ideas: Arc<dyn IdeaSource>,
        market: Arc<dyn MarketGateway>,
        feeds: Vec<FeedConfig>,
        settings: CreatorSettings,
        metrics: AgentMetrics,
    ) -> Self {
        Self {
            prices,
            ideas,
            market,
            feeds,
            settings,
            counter: DailyCounter::new(Utc::now().date_naive()),
            metrics,
        }
    }

    pub fn events_created_today(&self) -> u32 {
        self.counter.count()
    }

    /// Template-based event at the current time
    pub async fn create_prediction_event(&mut self) -> Option<CreatedEvent> {
        self.create_prediction_event_at(Utc::now()).await
    }

    pub async fn create_prediction_event_at(&mut self, now: DateTime<Utc>) -> Option<CreatedEvent> {
        if !self.has_capacity(now) {
            return None;
        }

        info!("Fetching current prices...");
        let prices = self.prices.all_prices().await;

        let template = pick_template();
        info!("Selected template: {}", template.question);

        let Some(current) = prices.get(template.asset) else {
            error!("No price available for {}", template.asset.feed_key());
            self.metrics.inc_events_failed();
            return None;
        };

        let target = calculate_target_price(current, template.percentage_change);
        let duration = self.clamp_duration(template.duration_days as u64 * SECONDS_PER_DAY);
        let deadline = now + chrono::Duration::seconds(duration as i64);
        let question = format_event_question(template.question, target, deadline);

        info!(
            "Creating event: current ${:.2}, target ${:.2}, deadline {}",
            current,
            target,
            deadline.to_rfc3339()
        );

        self.submit(template.asset, question, target, deadline).await
    }

    /// Event built from the first idea ASI:One suggests, at the current time
    pub async fn create_asi_powered_event(&mut self) -> Option<CreatedEvent> {
        self.create_asi_powered_event_at(Utc::now()).await
    }

    pub async fn create_asi_powered_event_at(&mut self, now: DateTime<Utc>) -> Option<CreatedEvent> {
        if !self.has_capacity(now) {
            return None;
        }

        info!("Creating ASI-powered event...");
        let prices = self.prices.all_prices().await;
        let existing = self.existing_questions().await;

        info!("Asking ASI:One to generate prediction ideas...");
        let ideas = match self.ideas.generate_event_ideas(&prices, &existing).await {
            Ok(ideas) => ideas,
            Err(e) => {
                error!("Error generating event ideas: {:#}", e);
                self.metrics.inc_events_failed();
                return None;
            }
        };

        if let Some(path) = &self.settings.idea_log {
            if let Err(e) = append_idea_log(path, now, &ideas).await {
                warn!("Could not write ASI response to disk: {:#}", e);
            }
        }

        let Some(question) = ideas.into_iter().next() else {
            warn!("ASI:One returned no event ideas");
            return None;
        };
        info!("ASI:One suggested: \"{}\"", question);

        let (asset, target, days, question) = match plan_from_idea(&question, &prices, now) {
            Some(plan) => plan,
            None => {
                error!("Could not derive an event from \"{}\"; aborting creation", question);
                self.metrics.inc_events_failed();
                return None;
            }
        };

        if self.feed_for(asset).is_none() {
            warn!("Unknown asset {}, skipping", asset);
            return None;
        }

        let duration = self.clamp_duration(days as u64 * SECONDS_PER_DAY);
        let deadline = now + chrono::Duration::seconds(duration as i64);

        self.submit(asset, question, target, deadline).await
    }

    /// Sequential AI-powered creation; stops at the daily limit, keeps going
    /// past individual failures
    pub async fn create_batch_events(&mut self, count: usize) -> Vec<CreatedEvent> {
        let mut created = Vec::new();

        for i in 0..count {
            if !self.has_capacity(Utc::now()) {
                warn!("Daily limit reached, stopping batch creation");
                break;
            }

            info!("Creating event {}/{}...", i + 1, count);
            if let Some(event) = self.create_asi_powered_event().await {
                created.push(event);
            }

            if i + 1 < count && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        info!("Batch creation complete. Created {} events.", created.len());
        created
    }

    fn has_capacity(&mut self, now: DateTime<Utc>) -> bool {
        self.counter.reset_if_new_day(now.date_naive());
        if self.counter.count() >= self.settings.max_events_per_day {
            warn!("Daily event limit reached ({})", self.settings.max_events_per_day);
            return false;
        }
        true
    }

    fn feed_for(&self, asset: Asset) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.asset == asset)
    }

    fn clamp_duration(&self, secs: u64) -> u64 {
        let clamped = secs.clamp(self.settings.min_duration_secs, self.settings.max_duration_secs);
        if clamped != secs {
            warn!("Event duration {}s clamped to {}s", secs, clamped);
        }
        clamped
    }

    async fn existing_questions(&self) -> Vec<String> {
        let ids = match self.market.active_event_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Could not list active events: {:#}", e);
                return Vec::new();
            }
        };

        let mut questions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.market.get_event(id).await {
                Ok(event) => questions.push(event.question),
                Err(e) => warn!("Skipping event {} in duplicate check: {:#}", id, e),
            }
        }
        info!("Found {} active events", questions.len());
        questions
    }

    async fn submit(
        &mut self,
        asset: Asset,
        question: String,
        target: f64,
        deadline: DateTime<Utc>,
    ) -> Option<CreatedEvent> {
        let new_event = match self.build_new_event(asset, question, target, deadline) {
            Ok(event) => event,
            Err(e) => {
                error!("Error creating event: {:#}", e);
                self.metrics.inc_events_failed();
                return None;
            }
        };

        match self.market.create_event(&new_event).await {
            Ok(created) => {
                self.counter.increment();
                self.metrics.inc_events_created();
                info!(
                    "Event ID: {} (tx {}) \"{}\"",
                    created.id_display(),
                    created.tx_hash,
                    new_event.question
                );
                Some(created)
            }
            Err(e) => {
                error!("Error creating event: {:#}", e);
                self.metrics.inc_events_failed();
                None
            }
        }
    }

    fn build_new_event(
        &self,
        asset: Asset,
        question: String,
        target: f64,
        deadline: DateTime<Utc>,
    ) -> Result<NewEvent> {
        let feed = self
            .feed_for(asset)
            .with_context(|| format!("Feed configuration not found for {}", asset.feed_key()))?;

        Ok(NewEvent {
            question,
            feed_id: feed.feed_id()?,
            target_price: to_pyth_int64(target)
                .with_context(|| format!("Target price {} cannot be encoded", target))?,
            deadline: u64::try_from(deadline.timestamp()).context("Deadline before epoch")?,
        })
    }
}

fn pick_template() -> &'static EventTemplate {
    let mut rng = rand::thread_rng();
    TEMPLATES.choose(&mut rng).unwrap_or(&TEMPLATES[0])
}

/// Fill a template: `Will BTC reach $121,234.56 by Oct 24, 2026?`
pub fn format_event_question(pattern: &str, target: f64, deadline: DateTime<Utc>) -> String {
    pattern
        .replace("[TARGET]", &format!("${}", format_usd(target)))
        .replace("[DATE]", &deadline.format("%b %-d, %Y").to_string())
}

/// Asset, target, duration in days and final question text for a generated idea.
///
/// Uses the parsed reading when it is plausible; otherwise falls back to a 10%
/// move over the default duration and says so in the question.
pub fn plan_from_idea(
    question: &str,
    prices: &PriceBook,
    now: DateTime<Utc>,
) -> Option<(Asset, f64, u32, String)> {
    if let Some(parsed) = parse_question(question, prices, now) {
        let plausible = match prices.get(parsed.asset) {
            Some(current) => is_plausible_target(parsed.target_price, current),
            None => parsed.target_price > 0.0,
        };
        if plausible {
            return Some((
                parsed.asset,
                parsed.target_price,
                parsed.duration_days,
                question.to_string(),
            ));
        }
        warn!(
            "Parsed target ${} for {} is implausible; using heuristic fallback",
            parsed.target_price, parsed.asset
        );
    } else {
        warn!("Could not fully parse ASI question; attempting heuristic fallback");
    }

    let asset = guess_asset_from_text(question)?;
    let current = prices.get(asset)?;
    let target = round_to(current * (1.0 + FALLBACK_MOVE), 6);
    let inferred = format!(
        "{} (inferred target ${} in {} days)",
        question, target, DEFAULT_DURATION_DAYS
    );
    info!("Heuristic event: {} target {} over {} days", asset, target, DEFAULT_DURATION_DAYS);
    Some((asset, target, DEFAULT_DURATION_DAYS, inferred))
}

fn is_plausible_target(target: f64, current: f64) -> bool {
    target > 0.0 && target <= current * MAX_TARGET_RATIO && target >= current / MAX_TARGET_RATIO
}

async fn append_idea_log(path: &Path, now: DateTime<Utc>, ideas: &[String]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let line = format!("{} | {}\n", now.to_rfc3339(), serde_json::to_string(ideas)?);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{feed_id, test_feeds, FakeIdeas, FakeMarket, FakePrices, BTC_FEED, ETH_FEED};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn settings(max_per_day: u32) -> CreatorSettings {
        CreatorSettings {
            max_events_per_day: max_per_day,
            min_duration_secs: SECONDS_PER_DAY,
            max_duration_secs: 30 * SECONDS_PER_DAY,
            batch_delay: Duration::ZERO,
            idea_log: None,
        }
    }

    fn creator(ideas: FakeIdeas, market: Arc<FakeMarket>, settings: CreatorSettings) -> EventCreator {
        EventCreator::new(
            Arc::new(FakePrices::standard()),
            Arc::new(ideas),
            market,
            test_feeds(),
            settings,
            AgentMetrics::new(),
        )
    }

    #[test]
    fn test_daily_counter_resets_on_new_day() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let mut counter = DailyCounter::new(day);
        counter.increment();
        counter.increment();

        assert!(!counter.reset_if_new_day(day));
        assert_eq!(counter.count(), 2);

        assert!(counter.reset_if_new_day(day.succ_opt().unwrap()));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_format_event_question() {
        let deadline = Utc.with_ymd_and_hms(2026, 10, 24, 12, 0, 0).unwrap();
        assert_eq!(
            format_event_question("Will BTC reach [TARGET] by [DATE]?", 121_234.56, deadline),
            "Will BTC reach $121,234.56 by Oct 24, 2026?"
        );
        let deadline = Utc.with_ymd_and_hms(2026, 11, 3, 0, 0, 0).unwrap();
        assert_eq!(
            format_event_question("Will SOL trade below [TARGET] by [DATE]?", 184.0, deadline),
            "Will SOL trade below $184.00 by Nov 3, 2026?"
        );
    }

    #[test]
    fn test_templates_cover_feeds() {
        for template in TEMPLATES.iter() {
            assert!(test_feeds().iter().any(|f| f.asset == template.asset));
            assert!(template.question.contains("[TARGET]") && template.question.contains("[DATE]"));
        }
    }

    #[tokio::test]
    async fn test_template_event_matches_its_template() {
        let market = Arc::new(FakeMarket::new());
        let mut creator = creator(FakeIdeas::default(), market.clone(), settings(10));

        let created = creator.create_prediction_event_at(now()).await.unwrap();
        assert_eq!(created.event_id, Some(alloy::primitives::U256::from(1)));
        assert_eq!(creator.events_created_today(), 1);

        let submitted = market.created();
        assert_eq!(submitted.len(), 1);
        let event = &submitted[0];

        let template = TEMPLATES
            .iter()
            .find(|t| {
                let prefix = t.question.split("[TARGET]").next().unwrap();
                let secs = t.duration_days as u64 * SECONDS_PER_DAY;
                event.question.starts_with(prefix) && event.deadline == now().timestamp() as u64 + secs
            })
            .expect("submitted event comes from a template");

        let current = match template.asset {
            Asset::Btc => 100_000.0,
            Asset::Eth => 3_500.0,
            _ => 200.0,
        };
        let expected = to_pyth_int64(calculate_target_price(current, template.percentage_change)).unwrap();
        assert_eq!(event.target_price, expected);
    }

    #[tokio::test]
    async fn test_daily_limit_blocks_creation() {
        let market = Arc::new(FakeMarket::new());
        let mut creator = creator(FakeIdeas::default(), market.clone(), settings(1));

        assert!(creator.create_prediction_event_at(now()).await.is_some());
        assert!(creator.create_prediction_event_at(now()).await.is_none());
        assert_eq!(market.created().len(), 1);

        // A new day frees the limit again
        let tomorrow = now() + chrono::Duration::days(1);
        assert!(creator.create_prediction_event_at(tomorrow).await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_event_id_still_counts() {
        let market = Arc::new(FakeMarket {
            omit_event_ids: true,
            ..FakeMarket::default()
        });
        let mut creator = creator(FakeIdeas::default(), market.clone(), settings(10));

        let created = creator.create_prediction_event_at(now()).await.unwrap();
        assert_eq!(created.id_display(), "unknown");
        assert_eq!(creator.events_created_today(), 1);
    }

    #[tokio::test]
    async fn test_asi_event_uses_parsed_question() {
        let market = Arc::new(
            FakeMarket::new().with_event(9, "Will BTC reach $90,000 by Oct 20?", 0, false),
        );
        let ideas = FakeIdeas::new(vec![Ok(vec![
            "Will ETH reach $3,900 in 2 days?",
            "Will BTC reach $110,000 by Nov 10?",
        ])]);
        let mut creator = creator(ideas, market.clone(), settings(10));

        creator.create_asi_powered_event_at(now()).await.unwrap();

        let event = &market.created()[0];
        assert_eq!(event.question, "Will ETH reach $3,900 in 2 days?");
        assert_eq!(event.feed_id, feed_id(ETH_FEED));
        assert_eq!(event.target_price, 390_000_000_000);
        assert_eq!(event.deadline, now().timestamp() as u64 + 2 * SECONDS_PER_DAY);
    }

    #[tokio::test]
    async fn test_existing_questions_are_passed_to_generator() {
        let market = Arc::new(
            FakeMarket::new().with_event(9, "Will BTC reach $90,000 by Oct 20?", 0, false),
        );
        let ideas = Arc::new(FakeIdeas::default());
        let mut creator = EventCreator::new(
            Arc::new(FakePrices::standard()),
            ideas.clone(),
            market,
            test_feeds(),
            settings(10),
            AgentMetrics::new(),
        );

        assert!(creator.create_asi_powered_event_at(now()).await.is_none());
        let seen = ideas.existing_seen.lock().unwrap().clone();
        assert_eq!(seen, vec![vec!["Will BTC reach $90,000 by Oct 20?".to_string()]]);
    }

    #[tokio::test]
    async fn test_implausible_target_falls_back_to_heuristic() {
        let market = Arc::new(FakeMarket::new());
        let ideas = FakeIdeas::new(vec![Ok(vec!["Will BTC reach $12 by Nov 10?"])]);
        let mut creator = creator(ideas, market.clone(), settings(10));

        creator.create_asi_powered_event_at(now()).await.unwrap();

        let event = &market.created()[0];
        assert_eq!(
            event.question,
            "Will BTC reach $12 by Nov 10? (inferred target $110000 in 7 days)"
        );
        assert_eq!(event.feed_id, feed_id(BTC_FEED));
        assert_eq!(event.target_price, 11_000_000_000_000);
        assert_eq!(event.deadline, now().timestamp() as u64 + 7 * SECONDS_PER_DAY);
    }

    #[tokio::test]
    async fn test_asset_without_feed_is_skipped() {
        let market = Arc::new(FakeMarket::new());
        let ideas = FakeIdeas::new(vec![Ok(vec!["Will XRP reach $3 by Nov 10?"])]);
        let mut creator = creator(ideas, market.clone(), settings(10));

        assert!(creator.create_asi_powered_event_at(now()).await.is_none());
        assert!(market.created().is_empty());
    }

    #[tokio::test]
    async fn test_duration_is_clamped() {
        let market = Arc::new(FakeMarket::new());
        let ideas = FakeIdeas::new(vec![Ok(vec!["Will SOL reach $230 in 45 days?"])]);
        let mut creator = creator(ideas, market.clone(), settings(10));

        creator.create_asi_powered_event_at(now()).await.unwrap();
        assert_eq!(
            market.created()[0].deadline,
            now().timestamp() as u64 + 30 * SECONDS_PER_DAY
        );
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let market = Arc::new(FakeMarket::new());
        let ideas = FakeIdeas::new(vec![
            Ok(vec!["Will BTC reach $110,000 in 3 days?"]),
            Err("upstream 503"),
            Ok(vec!["Will SOL reach $230 in 3 days?"]),
        ]);
        let mut creator = creator(ideas, market.clone(), settings(10));

        let created = creator.create_batch_events(3).await;
        assert_eq!(created.len(), 2);
        assert_eq!(market.created().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_stops_at_daily_limit() {
        let market = Arc::new(FakeMarket::new());
        let ideas = FakeIdeas::new(vec![
            Ok(vec!["Will BTC reach $110,000 in 3 days?"]),
            Ok(vec!["Will ETH reach $3,800 in 3 days?"]),
            Ok(vec!["Will SOL reach $230 in 3 days?"]),
        ]);
        let mut creator = creator(ideas, market.clone(), settings(2));

        let created = creator.create_batch_events(5).await;
        assert_eq!(created.len(), 2);
        assert_eq!(creator.events_created_today(), 2);
    }

    #[tokio::test]
    async fn test_ideas_are_appended_to_log() {
        let dir = std::env::temp_dir().join(format!("fatecast-ideas-{}", std::process::id()));
        let path = dir.join("asi_responses.log");
        let _ = std::fs::remove_dir_all(&dir);

        let ideas = vec!["Will BTC reach $110,000 in 3 days?".to_string()];
        append_idea_log(&path, now(), &ideas).await.unwrap();
        append_idea_log(&path, now(), &[]).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "2026-10-17T12:00:00+00:00 | [\"Will BTC reach $110,000 in 3 days?\"]"
        );
        assert!(lines[1].ends_with("| []"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
