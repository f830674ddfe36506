// src/connectors/messages.rs
use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Response of GET /api/v3/ticker/price
#[derive(Debug, Deserialize)]
pub struct BinanceTickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// The two fields we use out of a /api/v3/klines row.
///
/// Binance sends each candle as a positional array:
/// `[open_time, open, high, low, close, volume, close_time, ...]`
/// with prices encoded as strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub close: Decimal,
}

impl TryFrom<&[Value]> for Kline {
    type Error = anyhow::Error;

    fn try_from(row: &[Value]) -> Result<Self> {
        let open_time = row
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("kline row missing open time"))?;
        let close = row
            .get(4)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("kline row missing close price"))?;
        Ok(Kline {
            open_time,
            close: Decimal::from_str(close)?,
        })
    }
}

pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Kline>> {
    rows.iter().map(|row| Kline::try_from(row.as_slice())).collect()
}
