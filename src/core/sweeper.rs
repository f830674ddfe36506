// src/core/sweeper.rs
use crate::core::decision::Decision;
use crate::core::router::{Outcome, TradeRouter};
use crate::types::Position;
use rust_decimal::Decimal;
use std::fmt;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    TakeProfit,
    StopLoss,
}

impl fmt::Display for SweepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTrigger::TakeProfit => write!(f, "take-profit"),
            SweepTrigger::StopLoss => write!(f, "stop-loss"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub symbol: String,
    pub trigger: SweepTrigger,
    pub pnl_pct: Decimal,
    pub reasoning: String,
    pub outcome: Outcome,
}

/// Forces positions closed once their PnL, as a percentage of margin,
/// crosses the take-profit or stop-loss threshold.
#[derive(Debug, Clone)]
pub struct TpSlSweeper {
    take_profit_pct: Decimal,
    stop_loss_pct: Decimal,
}

impl TpSlSweeper {
    pub fn new(take_profit_pct: Decimal, stop_loss_pct: Decimal) -> Self {
        Self {
            take_profit_pct,
            stop_loss_pct,
        }
    }

    pub fn evaluate(&self, position: &Position) -> Option<(SweepTrigger, Decimal)> {
        let pnl_pct = position.pnl_pct()?;
        if pnl_pct >= self.take_profit_pct {
            Some((SweepTrigger::TakeProfit, pnl_pct))
        } else if pnl_pct <= -self.stop_loss_pct {
            Some((SweepTrigger::StopLoss, pnl_pct))
        } else {
            None
        }
    }

    /// One pass over every open position. A failed close is reported and the
    /// pass moves on to the next symbol.
    pub async fn sweep(&self, router: &TradeRouter) -> Vec<SweepReport> {
        let positions: Vec<Position> = router.ledger().lock().await.positions().cloned().collect();
        let mut reports = Vec::new();

        for position in positions {
            let Some((trigger, pnl_pct)) = self.evaluate(&position) else {
                continue;
            };

            let reasoning = format!("{} triggered at {:.2}%", trigger, pnl_pct);
            info!(
                "⚡ [{}] {} (entry {}, mark {}, uPnL ${})",
                position.symbol,
                reasoning,
                position.entry_price,
                position.current_price,
                position.unrealized_pnl
            );

            let decision = Decision::close(reasoning.clone());
            let outcome = router
                .route(&decision, &position.symbol, position.current_price)
                .await;
            if let Outcome::Rejected(e) = &outcome {
                error!("[{}] Error during TP/SL close: {}", position.symbol, e);
            }

            reports.push(SweepReport {
                symbol: position.symbol,
                trigger,
                pnl_pct,
                reasoning,
                outcome,
            });
        }
        reports
    }
}
