//! Free-text prediction parser
//!
//! Generated questions come back as prose, e.g. "Will BTC reach $120,000 by Nov 10?".
//! This module pulls out the asset, the target price and a duration in days so the
//! question can be turned into a `createEvent` call. Everything here is pure; the
//! reference time is passed in by the caller.

use crate::types::{Asset, ParsedQuestion, PriceBook};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Duration used when the question gives no usable deadline
pub const DEFAULT_DURATION_DAYS: u32 = 7;

/// Substring vocabulary, checked in order; the first hit wins
const ASSET_VOCABULARY: [(Asset, &[&str]); 4] = [
    (Asset::Btc, &["btc", "bitcoin"]),
    (Asset::Eth, &["eth", "ethereum"]),
    (Asset::Sol, &["sol", "solana"]),
    (Asset::Xrp, &["xrp", "ripple"]),
];

static DOLLAR_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([\d,]+(?:\.\d+)?)").expect("valid dollar regex"));

static NUMBER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").expect("valid number regex")
});

/// A number directly followed by a time unit is a duration, not a price
static UNIT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:minute|hour|day|week|month|year)s?\b").expect("valid unit regex")
});

/// Day-of-month or year that follows a month name ("Nov 10", "Nov 10, 2026")
static MONTH_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(?:\d{1,2}(?:st|nd|rd|th)?,?\s+)?$",
    )
    .expect("valid month prefix regex")
});

/// Day-of-month that precedes a month name ("10 November")
static MONTH_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:st|nd|rd|th)?\s+(?:of\s+)?(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b")
        .expect("valid month suffix regex")
});

static IN_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in\s+(\d+)\s+day").expect("valid days regex"));

static IN_WEEKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in\s+(\d+)\s+week").expect("valid weeks regex"));

static BY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bby\s+([A-Za-z0-9 ,\-\./]+?)\s*(?:\?|$)").expect("valid by-date regex")
});

static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)(?:st|nd|rd|th)\b").expect("valid ordinal regex"));

/// Date formats tried when the phrase carries a year
/// `%B` accepts both full and abbreviated month names
const DATED_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d %Y", "%d %B %Y"];

/// Formats tried after appending the current year to a year-less phrase
const UNDATED_FORMATS: [&str; 3] = ["%B %d %Y", "%d %B %Y", "%m/%d %Y"];

/// Guess which asset a free-form text is about
pub fn guess_asset_from_text(text: &str) -> Option<Asset> {
    let lower = text.to_lowercase();
    ASSET_VOCABULARY
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(asset, _)| *asset)
}

/// Parse a generated question into asset, target price and duration.
///
/// Returns `None` when no asset is recognized, or when no price is written in the
/// question and there is no current price to derive one from.
pub fn parse_question(
    question: &str,
    prices: &PriceBook,
    now: DateTime<Utc>,
) -> Option<ParsedQuestion> {
    let q = question.trim();
    let q_lower = q.to_lowercase();

    let asset = guess_asset_from_text(q)?;

    let target_price = match explicit_price(q) {
        Some(price) => price,
        None => heuristic_target(&q_lower, prices.get(asset)?),
    };

    let duration_days = extract_duration_days(q, &q_lower, now);

    Some(ParsedQuestion {
        asset,
        target_price,
        duration_days,
    })
}

/// First `$`-prefixed amount, else the first bare number that is not part of a
/// duration or a date
fn explicit_price(q: &str) -> Option<f64> {
    if let Some(caps) = DOLLAR_PRICE.captures(q) {
        if let Some(price) = parse_amount(&caps[1]) {
            return Some(price);
        }
    }

    NUMBER_TOKEN
        .find_iter(q)
        .filter(|m| is_standalone_number(q, m.start(), m.end()))
        .find_map(|m| parse_amount(m.as_str()))
}

fn is_standalone_number(q: &str, start: usize, end: usize) -> bool {
    let before = &q[..start];
    let after = &q[end..];

    let prev = before.chars().next_back();
    let next = after.chars().next();

    // Glued to letters ("asi1", "10th", "100k") or part of a numeric date
    if prev.is_some_and(|c| c.is_alphabetic() || c == '/' || c == '-') {
        return false;
    }
    if next.is_some_and(|c| c == '/' || c == '-') {
        return false;
    }
    if next.is_some_and(|c| c.is_alphabetic()) && !MONTH_SUFFIX.is_match(after) {
        return false;
    }

    !(UNIT_SUFFIX.is_match(after) || MONTH_PREFIX.is_match(before) || MONTH_SUFFIX.is_match(after))
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Derive a target from verb cues when the question names no price
fn heuristic_target(q_lower: &str, current: f64) -> f64 {
    let mut pct = 0.10;
    if ["surpass", "exceed", "reach"].iter().any(|w| q_lower.contains(w)) {
        pct = 0.10;
    }
    if ["rise", "gain"].iter().any(|w| q_lower.contains(w)) {
        pct = 0.12;
    }
    if ["fall", "drop", "below"].iter().any(|w| q_lower.contains(w)) {
        pct = -0.08;
    }
    round_to(current * (1.0 + pct), 6)
}

fn extract_duration_days(q: &str, q_lower: &str, now: DateTime<Utc>) -> u32 {
    if let Some(days) = IN_DAYS
        .captures(q_lower)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        return days;
    }

    if let Some(weeks) = IN_WEEKS
        .captures(q_lower)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        return weeks.saturating_mul(7);
    }

    if q_lower.contains("tomorrow") {
        return 1;
    }

    if let Some(date) = BY_DATE
        .captures(q)
        .and_then(|caps| parse_date_phrase(&caps[1], now))
    {
        return days_until(date, now);
    }

    if q_lower.contains("weekend") {
        3
    } else if q_lower.contains("week") {
        7
    } else if q_lower.contains("month") {
        30
    } else {
        DEFAULT_DURATION_DAYS
    }
}

/// Parse a calendar date phrase such as "Nov 10", "November 10th, 2026" or
/// "2026-11-10". Year-less dates that already passed roll into next year.
pub fn parse_date_phrase(phrase: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let without_ordinals = ORDINAL.replace_all(phrase, "$1");
    let cleaned = without_ordinals
        .replace(',', " ")
        .split_whitespace()
        .map(|word| {
            let word = word.trim_end_matches('.');
            if word.eq_ignore_ascii_case("sept") {
                "Sep"
            } else {
                word
            }
        })
        .filter(|word| !word.eq_ignore_ascii_case("the") && !word.eq_ignore_ascii_case("of"))
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        return None;
    }

    if let Some(date) = DATED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
    {
        return Some(date);
    }

    let today = now.date_naive();
    let with_year = format!("{} {}", cleaned, today.year());
    let date = UNDATED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())?;

    if date < today {
        date.with_year(today.year() + 1)
    } else {
        Some(date)
    }
}

/// Whole days from `now` until midnight UTC of `date`, rounded up, at least 1
pub fn days_until(date: NaiveDate, now: DateTime<Utc>) -> u32 {
    let target = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    let Some(target) = target else {
        return 1;
    };

    let secs = (target - now).num_seconds();
    if secs <= 0 {
        return 1;
    }
    let days = (secs + 86_399) / 86_400;
    days.clamp(1, u32::MAX as i64) as u32
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
