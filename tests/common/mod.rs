// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cycle_trader::config::{AppConfig, CredentialPool};
use cycle_trader::connectors::traits::MarketDataProvider;
use cycle_trader::core::decision::Decision;
use cycle_trader::core::engine::TradingEngine;
use cycle_trader::strategies::traits::DecisionProvider;
use cycle_trader::types::{AdvisoryRequest, MarketSummary, PortfolioSummary, PositionStatus, Trend};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Scripted prices. A symbol without a price fails both calls.
#[derive(Clone, Default)]
pub struct FakeMarket {
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
    no_data: Arc<Mutex<HashSet<String>>>,
}

impl FakeMarket {
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn remove_price(&self, symbol: &str) {
        self.prices.lock().unwrap().remove(symbol);
    }

    pub fn set_no_data(&self, symbol: &str) {
        self.no_data.lock().unwrap().insert(symbol.to_string());
    }

    fn price(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("exchange unreachable for {}", symbol))
    }
}

#[async_trait]
impl MarketDataProvider for FakeMarket {
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal> {
        self.price(symbol)
    }

    async fn market_summary(&self, symbol: &str) -> Result<Option<MarketSummary>> {
        if self.no_data.lock().unwrap().contains(symbol) {
            return Ok(None);
        }
        let current_price = self.price(symbol)?;
        Ok(Some(MarketSummary {
            symbol: symbol.to_string(),
            current_price,
            ema_20: 1.0,
            ema_50: 0.5,
            rsi_14: 55.0,
            market_trend: Trend::Bullish,
        }))
    }
}

pub enum Reply {
    Decision(Decision),
    Fail(String),
    Panic,
    /// Holds after taking this long.
    Slow(Duration),
}

#[derive(Debug, Clone)]
pub struct AdvisorCall {
    pub symbol: String,
    pub credential: String,
    pub at: Instant,
    pub portfolio: PortfolioSummary,
    pub position: PositionStatus,
}

/// Replies from a per-symbol queue, holding once the queue runs dry.
#[derive(Clone, Default)]
pub struct FakeAdvisor {
    script: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    calls: Arc<Mutex<Vec<AdvisorCall>>>,
}

impl FakeAdvisor {
    pub fn push(&self, symbol: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<AdvisorCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionProvider for FakeAdvisor {
    fn name(&self) -> String {
        "fake".to_string()
    }

    async fn decide(&self, request: &AdvisoryRequest, credential: &str) -> Result<Decision> {
        let symbol = request.market_data.symbol.clone();
        self.calls.lock().unwrap().push(AdvisorCall {
            symbol: symbol.clone(),
            credential: credential.to_string(),
            at: Instant::now(),
            portfolio: request.portfolio_summary.clone(),
            position: request.position_status.clone(),
        });

        let reply = self
            .script
            .lock()
            .unwrap()
            .get_mut(&symbol)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Reply::Decision(d)) => Ok(d),
            Some(Reply::Fail(msg)) => Err(anyhow!(msg)),
            Some(Reply::Panic) => panic!("advisor blew up on {}", symbol),
            Some(Reply::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Decision::hold("took a while"))
            }
            None => Ok(Decision::hold("nothing to do")),
        }
    }
}

pub fn config(symbols: &[&str]) -> AppConfig {
    AppConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..AppConfig::default()
    }
}

pub fn engine(
    symbols: &[&str],
    keys: &[&str],
    market: &FakeMarket,
    advisor: &FakeAdvisor,
) -> TradingEngine {
    let credentials =
        CredentialPool::new(keys.iter().map(|k| k.to_string()).collect()).unwrap();
    TradingEngine::new(
        config(symbols),
        credentials,
        Box::new(market.clone()),
        Box::new(advisor.clone()),
    )
}
