// src/strategies/llm.rs
use crate::config::AppConfig;
use crate::core::decision::Decision;
use crate::strategies::traits::DecisionProvider;
use crate::types::AdvisoryRequest;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const SYSTEM_PROMPT: &str = r#"You are an expert scalping trader, executing trades on multiple assets on the Binance exchange.
Your task is to analyze the current market data and your portfolio status to make a trade decision for the next cycle.

RULES:
1. Input: JSON with three parts: `portfolio_summary`, `market_data`, and `position_status`.
   - `portfolio_summary` holds your available balance, locked margin, equity and PnL.
   - `market_data` holds technical indicators (EMA 20, EMA 50, RSI 14, trend) for one asset.
   - `position_status` tells you whether you are 'long', 'short' or 'flat' on that asset.
2. Commands: 'long', 'short', 'hold', 'close'.
3. Leverage: 'long' and 'short' MUST carry a leverage between 10x and 50x, e.g. "long 25x" or "short 40x".
   You can only open a new position while 'flat' on that asset.
4. Margin: for 'long'/'short' set `trade_amount_usd` to the margin taken from `available_balance_usd`.
   Low confidence ~5% of balance, medium ~10%, high ~20%. Position size is margin times leverage.
5. With an open position answer 'hold' or 'close'. When flat, use trend and RSI to choose 'long' or 'short' (or 'hold').
6. OUTPUT: a single JSON object with exactly the keys "reasoning", "command" and "trade_amount_usd".
   `trade_amount_usd` may be 0 for 'hold' and 'close'. No text before or after the JSON.

Example:
{"reasoning": "Trend is bullish and RSI is strong.", "command": "long 25x", "trade_amount_usd": 200}"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Decision provider backed by an OpenAI-compatible chat completions API (Groq by default).
pub struct LlmAdvisor {
    http_client: Client,
    api_url: String,
    model: String,
    temperature: f64,
}

impl LlmAdvisor {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            api_url: config.llm_api_url.clone(),
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
        })
    }

    pub fn build_request(&self, request: &AdvisoryRequest) -> Result<ChatRequest> {
        let human_input = serde_json::to_string_pretty(request)?;
        Ok(ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: human_input,
                },
            ],
            temperature: self.temperature,
        })
    }
}

/// First completion's text, parsed into a decision.
pub fn decision_from_completion(response: ChatResponse) -> Result<Decision> {
    let content = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| anyhow!("completion has no choices"))?;
    Ok(Decision::from_response_text(content.trim()))
}

#[async_trait]
impl DecisionProvider for LlmAdvisor {
    fn name(&self) -> String {
        format!("llm:{}", self.model)
    }

    async fn decide(&self, request: &AdvisoryRequest, credential: &str) -> Result<Decision> {
        let body = self.build_request(request)?;
        debug!("[{}] Asking {}", request.market_data.symbol, self.model);

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await
            .context("Failed to decode chat completion")?;

        let decision = decision_from_completion(response)?;
        info!(
            "[AI Reasoning] [{}] {}",
            request.market_data.symbol, decision.reasoning
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::Action;
    use crate::types::{MarketSummary, PortfolioSummary, PositionStatus, Trend};
    use rust_decimal_macros::dec;

    fn request() -> AdvisoryRequest {
        AdvisoryRequest {
            portfolio_summary: PortfolioSummary {
                balance: dec!(1000),
                equity: dec!(1000),
                ..PortfolioSummary::default()
            },
            market_data: MarketSummary {
                symbol: "BTC/USDT".into(),
                current_price: dec!(68500.5),
                ema_20: 68450.0,
                ema_50: 68300.0,
                rsi_14: 62.0,
                market_trend: Trend::Bullish,
            },
            position_status: PositionStatus::flat(),
        }
    }

    #[test]
    fn request_carries_prompt_and_json_payload() {
        let advisor = LlmAdvisor::new(&AppConfig::default()).unwrap();
        let chat = advisor.build_request(&request()).unwrap();

        assert_eq!(chat.temperature, 0.7);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].role, "user");

        let payload: serde_json::Value = serde_json::from_str(&chat.messages[1].content).unwrap();
        assert_eq!(payload["position_status"]["side"], "flat");
        assert_eq!(payload["market_data"]["market_trend"], "bullish");
        assert_eq!(payload["portfolio_summary"]["available_balance_usd"], "1000");
    }

    #[test]
    fn completion_text_becomes_decision() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" {\"reasoning\":\"ok\",\"command\":\"short 40x\",\"trade_amount_usd\":100} "}}]}"#,
        )
        .unwrap();
        let decision = decision_from_completion(response).unwrap();
        assert_eq!(decision.action, Action::Short);
        assert_eq!(decision.leverage, Some(40));
        assert_eq!(decision.trade_amount_usd, dec!(100));
    }

    #[test]
    fn prose_completion_is_a_hold() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"I think you should buy."}}]}"#,
        )
        .unwrap();
        let decision = decision_from_completion(response).unwrap();
        assert_eq!(decision.action, Action::Hold);
    }

    #[test]
    fn empty_completion_is_an_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(decision_from_completion(response).is_err());
    }
}
