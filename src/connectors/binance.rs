// src/connectors/binance.rs
use crate::config::{AppConfig, MIN_KLINE_LIMIT};
use crate::connectors::messages::{parse_klines, BinanceTickerPrice};
use crate::connectors::traits::MarketDataProvider;
use crate::types::{MarketSummary, Trend};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex};
use ta::Next;
use tracing::{debug, warn};
use url::Url;

/// Public (unauthenticated) Binance REST market data.
pub struct BinanceMarketData {
    http_client: Client,
    base_rest_url: String,
    kline_interval: String,
    kline_limit: u32,
}

impl BinanceMarketData {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            base_rest_url: config.market_data_url.trim_end_matches('/').to_string(),
            kline_interval: config.kline_interval.clone(),
            kline_limit: config.kline_limit,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let url = Url::parse_with_params(&format!("{}{}", self.base_rest_url, path), params)?;
        Ok(url)
    }

    async fn fetch_closes(&self, symbol: &str) -> Result<Vec<Decimal>> {
        let pair = exchange_symbol(symbol);
        let limit = self.kline_limit.to_string();
        let url = self.endpoint(
            "/api/v3/klines",
            &[
                ("symbol", pair.as_str()),
                ("interval", self.kline_interval.as_str()),
                ("limit", limit.as_str()),
            ],
        )?;

        let rows = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Vec<Value>>>()
            .await
            .with_context(|| format!("Failed to decode klines for {}", symbol))?;

        Ok(parse_klines(&rows)?.into_iter().map(|k| k.close).collect())
    }
}

#[async_trait]
impl MarketDataProvider for BinanceMarketData {
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal> {
        let pair = exchange_symbol(symbol);
        let url = self.endpoint("/api/v3/ticker/price", &[("symbol", pair.as_str())])?;
        let ticker = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<BinanceTickerPrice>()
            .await
            .with_context(|| format!("Failed to parse price for {}", symbol))?;
        Ok(ticker.price)
    }

    async fn market_summary(&self, symbol: &str) -> Result<Option<MarketSummary>> {
        let closes = self.fetch_closes(symbol).await?;
        let last_price = match self.fetch_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("[{}] Ticker unavailable, using last close: {}", symbol, e);
                None
            }
        };
        summarize(symbol, &closes, last_price)
    }
}

/// `BTC/USDT` -> `BTCUSDT`
pub fn exchange_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

/// EMA(20), EMA(50), RSI(14) over `closes`, oldest first.
/// Returns `None` when there are too few candles for the slow EMA.
pub fn summarize(
    symbol: &str,
    closes: &[Decimal],
    last_price: Option<Decimal>,
) -> Result<Option<MarketSummary>> {
    if closes.len() < MIN_KLINE_LIMIT as usize {
        debug!("[{}] Only {} candles, no summary this cycle", symbol, closes.len());
        return Ok(None);
    }

    let mut ema_20 = ExponentialMovingAverage::new(20).map_err(|e| anyhow!("EMA(20): {:?}", e))?;
    let mut ema_50 = ExponentialMovingAverage::new(50).map_err(|e| anyhow!("EMA(50): {:?}", e))?;
    let mut rsi_14 = RelativeStrengthIndex::new(14).map_err(|e| anyhow!("RSI(14): {:?}", e))?;

    let (mut fast, mut slow, mut rsi) = (0.0, 0.0, 0.0);
    for close in closes {
        let close = close
            .to_f64()
            .ok_or_else(|| anyhow!("close {} does not fit in f64", close))?;
        fast = ema_20.next(close);
        slow = ema_50.next(close);
        rsi = rsi_14.next(close);
    }

    let current_price = match last_price.or_else(|| closes.last().copied()) {
        Some(p) => p,
        None => return Ok(None),
    };

    Ok(Some(MarketSummary {
        symbol: symbol.to_string(),
        current_price,
        ema_20: round2(fast),
        ema_50: round2(slow),
        rsi_14: round2(rsi),
        market_trend: if fast > slow {
            Trend::Bullish
        } else {
            Trend::Bearish
        },
    }))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
