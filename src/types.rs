// src/types.rs
use crate::core::router::Outcome;
use crate::core::sweeper::SweepReport;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for Long, -1 for Short.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// An open leveraged position. At most one per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub quantity: Decimal, // margin * leverage / entry_price
    pub margin: Decimal,
    pub leverage: u32,
    pub unrealized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// PnL of the whole position if it were valued at `price`. `None` on overflow.
    pub fn pnl_at(&self, price: Decimal) -> Option<Decimal> {
        (price - self.entry_price)
            .checked_mul(self.quantity)
            .map(|pnl| pnl * self.side.sign())
    }

    /// Unrealized PnL as a percentage of margin. `None` when margin is zero
    /// or the ratio overflows.
    pub fn pnl_pct(&self) -> Option<Decimal> {
        self.unrealized_pnl
            .checked_div(self.margin)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub margin: Decimal,
    pub leverage: u32,
    pub realized_pnl: Decimal, // already clamped at -margin
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    pub fn duration_held(&self) -> Duration {
        self.closed_at - self.opened_at
    }
}

/// Read-only portfolio view. The field names are what the advisor sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    #[serde(rename = "available_balance_usd")]
    pub balance: Decimal,
    #[serde(rename = "total_margin_usd")]
    pub total_margin_locked: Decimal,
    #[serde(rename = "unrealized_pnl_usd")]
    pub total_unrealized_pnl: Decimal,
    #[serde(rename = "equity_usd")]
    pub equity: Decimal,
    pub open_positions: usize,
    #[serde(rename = "realized_pnl_usd")]
    pub realized_pnl: Decimal,
    pub closed_trades: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exposure {
    Long,
    Short,
    Flat,
}

impl From<Side> for Exposure {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Exposure::Long,
            Side::Short => Exposure::Short,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionStatus {
    pub side: Exposure,
    pub quantity: Decimal,
}

impl PositionStatus {
    pub fn flat() -> Self {
        Self {
            side: Exposure::Flat,
            quantity: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
}

/// Market snapshot handed to the advisor for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub symbol: String,
    pub current_price: Decimal,
    pub ema_20: f64,
    pub ema_50: f64,
    pub rsi_14: f64,
    pub market_trend: Trend,
}

/// Everything the advisor is given for one symbol in one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryRequest {
    pub portfolio_summary: PortfolioSummary,
    pub market_data: MarketSummary,
    pub position_status: PositionStatus,
}

// --- Observation hook ---

#[derive(Debug, Clone)]
pub enum EngineEvent {
    CycleStarted {
        cycle: u64,
        credential_index: usize,
    },
    MarkStale {
        symbol: String,
        reason: String,
    },
    Swept(SweepReport),
    Snapshot(PortfolioSummary),
    SymbolProcessed {
        symbol: String,
        outcome: Outcome,
    },
    SymbolFailed {
        symbol: String,
        kind: &'static str,
        action: &'static str,
        message: String,
    },
    CredentialRotated {
        from: usize,
        to: usize,
    },
    CycleFinished {
        cycle: u64,
        summary: PortfolioSummary,
    },
}
