// src/core/ledger.rs
use crate::error::TradeError;
use crate::types::{ClosedTrade, Position, PortfolioSummary, PositionStatus, Side};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub const MIN_LEVERAGE: u32 = 10;
pub const MAX_LEVERAGE: u32 = 50;

/// The single serialization point for every balance/position mutation.
pub type SharedLedger = Arc<Mutex<Ledger>>;

/// Isolated-margin paper ledger: cash balance plus at most one position per symbol.
///
/// All mutation goes through the methods below. Each one validates first and
/// only then touches `balance` and `positions`, so a failed call leaves the
/// ledger exactly as it was.
#[derive(Debug, Clone)]
pub struct Ledger {
    balance: Decimal,
    positions: BTreeMap<String, Position>,
    closed_trades: Vec<ClosedTrade>,
}

impl Ledger {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            balance: starting_balance,
            positions: BTreeMap::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn shared(starting_balance: Decimal) -> SharedLedger {
        Arc::new(Mutex::new(Self::new(starting_balance)))
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Open positions in symbol order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn position_status(&self, symbol: &str) -> PositionStatus {
        match self.positions.get(symbol) {
            Some(p) => PositionStatus {
                side: p.side.into(),
                quantity: p.quantity,
            },
            None => PositionStatus::flat(),
        }
    }

    pub fn open_position(
        &mut self,
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        margin: Decimal,
        leverage: u32,
    ) -> Result<Position, TradeError> {
        if self.positions.contains_key(symbol) {
            return Err(TradeError::InvariantViolation(format!(
                "position already open for {}",
                symbol
            )));
        }
        if margin <= Decimal::ZERO {
            return Err(TradeError::InvariantViolation(format!(
                "margin must be positive, got {}",
                margin
            )));
        }
        if !(MIN_LEVERAGE..=MAX_LEVERAGE).contains(&leverage) {
            return Err(TradeError::InvariantViolation(format!(
                "leverage {}x outside [{}, {}]",
                leverage, MIN_LEVERAGE, MAX_LEVERAGE
            )));
        }
        if entry_price <= Decimal::ZERO {
            return Err(TradeError::InvariantViolation(format!(
                "entry price must be positive, got {}",
                entry_price
            )));
        }
        if margin > self.balance {
            return Err(TradeError::InvariantViolation(format!(
                "margin {} exceeds available balance {}",
                margin, self.balance
            )));
        }

        let quantity = margin
            .checked_mul(Decimal::from(leverage))
            .and_then(|notional| notional.checked_div(entry_price))
            .ok_or_else(|| {
                TradeError::InvariantViolation(format!(
                    "position size overflows for margin {} at {}x @ {}",
                    margin, leverage, entry_price
                ))
            })?;

        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            current_price: entry_price,
            quantity,
            margin,
            leverage,
            unrealized_pnl: Decimal::ZERO,
            opened_at: Utc::now(),
        };

        self.balance -= margin;
        self.positions.insert(symbol.to_string(), position.clone());

        info!(
            "📈 Opened {} {} {}x: margin ${} @ {} (qty {}), balance ${}",
            position.side,
            symbol,
            leverage,
            margin,
            entry_price,
            position.quantity,
            self.balance
        );
        Ok(position)
    }

    pub fn update_mark(
        &mut self,
        symbol: &str,
        current_price: Decimal,
    ) -> Result<Position, TradeError> {
        if current_price <= Decimal::ZERO {
            return Err(TradeError::InvariantViolation(format!(
                "mark price must be positive, got {}",
                current_price
            )));
        }
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| TradeError::NotFound(symbol.to_string()))?;

        let unrealized_pnl = position
            .pnl_at(current_price)
            .ok_or_else(|| pnl_overflow(symbol, current_price))?;
        position.current_price = current_price;
        position.unrealized_pnl = unrealized_pnl;
        debug!(
            "Mark {} -> {} (uPnL ${})",
            symbol, current_price, position.unrealized_pnl
        );
        Ok(position.clone())
    }

    /// Closes at `exit_price`. The realized loss is capped at the margin, so
    /// closing a position can never take back more cash than it locked.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
    ) -> Result<ClosedTrade, TradeError> {
        let pnl = self
            .positions
            .get(symbol)
            .ok_or_else(|| TradeError::NotFound(symbol.to_string()))?
            .pnl_at(exit_price)
            .ok_or_else(|| pnl_overflow(symbol, exit_price))?;
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| TradeError::NotFound(symbol.to_string()))?;

        let realized_pnl = pnl.max(-position.margin);
        self.balance += position.margin + realized_pnl;

        let trade = ClosedTrade {
            position_id: position.id,
            symbol: position.symbol,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            margin: position.margin,
            leverage: position.leverage,
            realized_pnl,
            opened_at: position.opened_at,
            closed_at: Utc::now(),
        };

        info!(
            "📉 Closed {} {} @ {}: realized ${} after {}s, balance ${}",
            trade.side,
            symbol,
            exit_price,
            realized_pnl,
            trade.duration_held().num_seconds(),
            self.balance
        );
        self.closed_trades.push(trade.clone());
        Ok(trade)
    }

    pub fn summary(&self) -> PortfolioSummary {
        let total_margin_locked: Decimal = self.positions.values().map(|p| p.margin).sum();
        let total_unrealized_pnl: Decimal =
            self.positions.values().map(|p| p.unrealized_pnl).sum();
        let realized_pnl: Decimal = self.closed_trades.iter().map(|t| t.realized_pnl).sum();

        PortfolioSummary {
            balance: self.balance,
            total_margin_locked,
            total_unrealized_pnl,
            equity: self.balance + total_margin_locked + total_unrealized_pnl,
            open_positions: self.positions.len(),
            realized_pnl,
            closed_trades: self.closed_trades.len(),
        }
    }
}

fn pnl_overflow(symbol: &str, price: Decimal) -> TradeError {
    TradeError::InvariantViolation(format!("PnL for {} at {} overflows", symbol, price))
}
