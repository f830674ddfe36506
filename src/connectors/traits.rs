use crate::types::MarketSummary;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Latest mark price, used to refresh open positions.
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal>;

    /// Indicator snapshot for the advisor. `Ok(None)` means no data this cycle.
    async fn market_summary(&self, symbol: &str) -> Result<Option<MarketSummary>>;
}
