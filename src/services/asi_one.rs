//! ASI:One chat-completions client
//!
//! Generates event questions and second opinions on outcomes. Every reply is
//! free text; structured answers are pulled out of the first `{...}` span and
//! fall back to a plain price comparison when the model returns something else.

use super::api_errors::ApiError;
use super::metrics::AgentMetrics;
use super::{IdeaSource, OutcomeVerifier};
use crate::config::AsiOneApi;
use crate::types::{Asset, PriceBook};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ideas kept from a single generation call
pub const MAX_IDEAS: usize = 3;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid json span regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Model opinion on whether an expired event should be settled now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeVerdict {
    pub should_resolve: bool,
    pub outcome: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl OutcomeVerdict {
    /// Oracle-only verdict used when the model reply cannot be read
    pub fn fallback(oracle_price: f64, target_price: f64) -> Self {
        Self {
            should_resolve: true,
            outcome: oracle_price >= target_price,
            reasoning: "Fallback: using Pyth price comparison".to_string(),
        }
    }
}

/// Model opinion on whether to open an event for an asset right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub create_event: bool,
    pub suggested_target: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl TrendAnalysis {
    pub fn fallback(current_price: f64) -> Self {
        Self {
            create_event: true,
            suggested_target: current_price * 1.15,
            reasoning: "Fallback: using simple 15% target".to_string(),
        }
    }
}

pub struct AsiOneClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    /// Assets the agent has price feeds for; the only ones ideas may use
    supported_assets: Vec<Asset>,
    metrics: AgentMetrics,
}

impl AsiOneClient {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        supported_assets: Vec<Asset>,
        metrics: AgentMetrics,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
            supported_assets,
            metrics,
        })
    }

    /// Send a conversation and return the first choice's content
    pub async fn chat(&self, messages: &[ChatMessage], model: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("ASI:One API key not configured (set AGENT_API_KEY or ASI_ONE_API_KEY)")?;

        self.metrics.inc_llm_calls();

        let result = self.send_chat(api_key, messages, model).await;
        if let Err(e) = &result {
            self.metrics.inc_llm_errors();
            error!("Error calling ASI:One ({}): {}", model, e);
        }
        let (content, tokens) = result?;

        info!(
            "ASI:One response ({} tokens): {}...",
            tokens,
            content.chars().take(100).collect::<String>()
        );
        Ok(content)
    }

    async fn send_chat(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<(String, u64), ApiError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&ChatRequest { model, messages })
            .send()
            .await
            .map_err(|e| ApiError::from_network_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), &body));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        let tokens = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok((content, tokens))
    }

    /// Ask for up to three price-threshold questions
    pub async fn generate_event_ideas(
        &self,
        prices: &PriceBook,
        existing_questions: &[String],
    ) -> Result<Vec<String>> {
        let prompt = build_idea_prompt(&self.supported_assets, prices, existing_questions);
        let messages = [
            ChatMessage::system("You are a crypto market analyst creating prediction market events."),
            ChatMessage::user(prompt),
        ];

        let response = self.chat(&messages, AsiOneApi::MODEL_MINI).await?;
        let ideas = parse_idea_lines(&response);
        debug!("Parsed {} ideas from ASI:One", ideas.len());
        Ok(ideas)
    }

    /// Second opinion before settling an event
    pub async fn verify_event_outcome(
        &self,
        question: &str,
        target_price: f64,
        market_price: f64,
        oracle_price: f64,
    ) -> Result<OutcomeVerdict> {
        let prompt = format!(
            r#"You are verifying a prediction market event outcome.

Event question: "{question}"
Target price: ${target_price}
Current Pyth oracle price: ${oracle_price}
Current market price: ${market_price}

Should this event be resolved now? If yes, did it meet the target (YES) or not (NO)?

Consider:
1. Is the Pyth price reliable? (within 5% of market price)
2. Has the target been clearly met or missed?
3. Is there any ambiguity that requires waiting?

Respond in JSON format:
{{
  "shouldResolve": true/false,
  "outcome": true/false,
  "reasoning": "explanation"
}}"#
        );

        let messages = [
            ChatMessage::system("You are a prediction market oracle verifier."),
            ChatMessage::user(prompt),
        ];

        let response = self.chat(&messages, AsiOneApi::MODEL_EXTENDED).await?;
        Ok(extract_json(&response).unwrap_or_else(|| {
            warn!("Could not parse ASI:One verdict, using oracle comparison");
            OutcomeVerdict::fallback(oracle_price, target_price)
        }))
    }

    /// Whether now is a good time to open an event for `asset`, and at what target
    pub async fn analyze_market_trends(
        &self,
        asset: Asset,
        current_price: f64,
        price_history: Option<&[f64]>,
    ) -> Result<TrendAnalysis> {
        let history = match price_history {
            Some(history) if !history.is_empty() => format!(
                "Recent prices: {}",
                history
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => "No price history available".to_string(),
        };

        let prompt = format!(
            r#"Analyze {asset} market conditions:

Current price: ${current_price}
{history}

Should we create a prediction event now? If yes, suggest a good target price for a 24-48 hour prediction.

Respond in JSON:
{{
  "createEvent": true/false,
  "suggestedTarget": number,
  "reasoning": "explanation"
}}"#
        );

        let messages = [
            ChatMessage::system("You are a crypto market trend analyst."),
            ChatMessage::user(prompt),
        ];

        let response = self.chat(&messages, AsiOneApi::MODEL_MINI).await?;
        Ok(extract_json(&response).unwrap_or_else(|| {
            warn!("Could not parse market analysis response");
            TrendAnalysis::fallback(current_price)
        }))
    }
}

#[async_trait]
impl IdeaSource for AsiOneClient {
    async fn generate_event_ideas(
        &self,
        prices: &PriceBook,
        existing_questions: &[String],
    ) -> Result<Vec<String>> {
        AsiOneClient::generate_event_ideas(self, prices, existing_questions).await
    }
}

#[async_trait]
impl OutcomeVerifier for AsiOneClient {
    async fn verify_event_outcome(
        &self,
        question: &str,
        target_price: f64,
        market_price: f64,
        oracle_price: f64,
    ) -> Result<OutcomeVerdict> {
        AsiOneClient::verify_event_outcome(self, question, target_price, market_price, oracle_price)
            .await
    }
}

/// Prompt asking for questions about supported assets only
pub fn build_idea_prompt(
    supported: &[Asset],
    prices: &PriceBook,
    existing_questions: &[String],
) -> String {
    let asset_list = supported
        .iter()
        .map(|a| a.symbol())
        .collect::<Vec<_>>()
        .join(", ");

    let price_lines = supported
        .iter()
        .filter_map(|asset| prices.get(*asset).map(|p| format!("- {}: ${:.2}", asset, p)))
        .collect::<Vec<_>>()
        .join("\n");

    let existing = if existing_questions.is_empty() {
        "None".to_string()
    } else {
        existing_questions.join("\n")
    };

    format!(
        r#"You are an AI helping create interesting cryptocurrency prediction markets.

IMPORTANT: You can ONLY use these assets: {asset_list}

Current prices:
{price_lines}

Existing events (avoid duplicates):
{existing}

Generate 3 unique prediction questions using ONLY {asset_list}.
Format EXACTLY as: "Will [ASSET] reach $[PRICE] by [DATE]?"
Where [ASSET] must be one of {asset_list}.
Where [PRICE] is a realistic target (5-20% move from current).
Where [DATE] is 1-3 days from now.

Return ONLY the 3 questions, one per line. No numbering, no explanations."#
    )
}

/// Keep non-empty lines that read like a question, at most `MAX_IDEAS`
pub fn parse_idea_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains("Will"))
        .take(MAX_IDEAS)
        .map(str::to_string)
        .collect()
}

/// Decode the first `{...}` span of a model reply
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Option<T> {
    let span = JSON_OBJECT.find(response)?;
    serde_json::from_str(span.as_str()).ok()
}
