// src/core/router.rs
use crate::core::decision::{Action, Decision};
use crate::core::ledger::{Ledger, SharedLedger, MAX_LEVERAGE, MIN_LEVERAGE};
use crate::error::TradeError;
use crate::types::{ClosedTrade, Position, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

/// Margin used when the advisor gives no usable amount (fraction of balance).
pub const DEFAULT_MARGIN_FRACTION: Decimal = dec!(0.05);
/// Hard cap on a single margin request (fraction of balance).
pub const MAX_MARGIN_FRACTION: Decimal = dec!(0.5);

/// Result of routing one decision. Every path produces one, including no-ops.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Opened {
        position: Position,
        requested_margin: Decimal,
    },
    Closed(ClosedTrade),
    NoOp(String),
    Rejected(TradeError),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Opened { .. } => "opened",
            Outcome::Closed(_) => "closed",
            Outcome::NoOp(_) => "no-op",
            Outcome::Rejected(_) => "rejected",
        }
    }
}

/// Margin actually committed for a request against `balance`.
///
/// Non-positive requests fall back to 5% of balance; anything above 50% of
/// balance is clamped down to it.
pub fn size_margin(requested: Decimal, balance: Decimal) -> Decimal {
    let margin = if requested > Decimal::ZERO {
        requested
    } else {
        let fallback = balance * DEFAULT_MARGIN_FRACTION;
        warn!(
            "Invalid or missing trade amount ({}). Defaulting to 5% of balance: ${}",
            requested, fallback
        );
        fallback
    };

    let cap = balance * MAX_MARGIN_FRACTION;
    if margin > cap {
        warn!(
            "Trade amount ${} exceeds safety cap. Adjusting to ${}",
            margin, cap
        );
        return cap;
    }
    margin
}

/// Turns decisions into ledger transitions, enforcing one position per symbol.
#[derive(Clone)]
pub struct TradeRouter {
    ledger: SharedLedger,
}

impl TradeRouter {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub async fn route(&self, decision: &Decision, symbol: &str, current_price: Decimal) -> Outcome {
        // Held for the whole validate-then-mutate sequence.
        let mut ledger = self.ledger.lock().await;
        let existing = ledger.position(symbol).map(|p| p.side);

        let outcome = match (decision.action, existing) {
            (Action::Hold, _) => Outcome::NoOp("hold".to_string()),
            (Action::Close, None) => Outcome::NoOp(format!("no open position to close for {}", symbol)),
            (Action::Close, Some(_)) => match ledger.close_position(symbol, current_price) {
                Ok(trade) => Outcome::Closed(trade),
                Err(e) => Outcome::Rejected(e),
            },
            (Action::Long | Action::Short, Some(side)) => {
                Outcome::Rejected(TradeError::InvalidTransition(format!(
                    "{} position already open for {}",
                    side, symbol
                )))
            }
            (Action::Long, None) => open(&mut ledger, Side::Long, decision, symbol, current_price),
            (Action::Short, None) => open(&mut ledger, Side::Short, decision, symbol, current_price),
        };

        match &outcome {
            Outcome::Rejected(e) => warn!("[{}] Decision rejected ({}): {}", symbol, e.kind(), e),
            Outcome::NoOp(reason) => debug!("[{}] No-op: {}", symbol, reason),
            Outcome::Opened { .. } | Outcome::Closed(_) => {
                info!("[{}] Decision routed: {}", symbol, outcome.label())
            }
        }
        outcome
    }
}

fn open(
    ledger: &mut Ledger,
    side: Side,
    decision: &Decision,
    symbol: &str,
    current_price: Decimal,
) -> Outcome {
    let leverage = match decision.leverage {
        Some(l) if (MIN_LEVERAGE..=MAX_LEVERAGE).contains(&l) => l,
        Some(l) => {
            return Outcome::Rejected(TradeError::InvalidTransition(format!(
                "leverage {}x outside [{}, {}]",
                l, MIN_LEVERAGE, MAX_LEVERAGE
            )))
        }
        None => {
            return Outcome::Rejected(TradeError::InvalidTransition(
                "command carries no valid leverage".to_string(),
            ))
        }
    };

    let margin = size_margin(decision.trade_amount_usd, ledger.balance());
    match ledger.open_position(symbol, side, current_price, margin, leverage) {
        Ok(position) => Outcome::Opened {
            position,
            requested_margin: decision.trade_amount_usd,
        },
        Err(e) => Outcome::Rejected(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn router() -> TradeRouter {
        TradeRouter::new(Ledger::shared(dec!(1000)))
    }

    #[test]
    fn margin_sizing_rules() {
        assert_eq!(size_margin(dec!(200), dec!(1000)), dec!(200));
        assert_eq!(size_margin(dec!(900), dec!(1000)), dec!(500));
        assert_eq!(size_margin(dec!(500), dec!(1000)), dec!(500));
        assert_eq!(size_margin(Decimal::ZERO, dec!(1000)), dec!(50));
        assert_eq!(size_margin(dec!(-10), dec!(800)), dec!(40));
    }

    #[tokio::test]
    async fn oversized_request_is_clamped_not_rejected() {
        let router = router();
        let outcome = router
            .route(&Decision::open(Side::Long, 20, dec!(900)), "BTC/USDT", dec!(100))
            .await;

        match outcome {
            Outcome::Opened {
                position,
                requested_margin,
            } => {
                assert_eq!(position.margin, dec!(500));
                assert_eq!(requested_margin, dec!(900));
            }
            other => panic!("expected open, got {:?}", other),
        }
        assert_eq!(router.ledger().lock().await.balance(), dec!(500));
    }

    #[tokio::test]
    async fn missing_amount_defaults_to_five_percent() {
        let router = router();
        let outcome = router
            .route(&Decision::open(Side::Short, 10, Decimal::ZERO), "ETH/USDT", dec!(50))
            .await;
        let Outcome::Opened { position, .. } = outcome else {
            panic!("expected open");
        };
        assert_eq!(position.margin, dec!(50));
        assert_eq!(position.side, Side::Short);
    }

    #[tokio::test]
    async fn invalid_leverage_is_rejected_without_trading() {
        let router = router();
        for decision in [
            Decision::open(Side::Long, 5, dec!(100)),
            Decision::open(Side::Long, 51, dec!(100)),
            Decision::from_command("long", dec!(100), "").unwrap(),
        ] {
            let outcome = router.route(&decision, "BTC/USDT", dec!(100)).await;
            assert!(matches!(
                outcome,
                Outcome::Rejected(TradeError::InvalidTransition(_))
            ));
        }
        let ledger = router.ledger().lock().await;
        assert_eq!(ledger.balance(), dec!(1000));
        assert_eq!(ledger.positions().count(), 0);
    }

    #[tokio::test]
    async fn cannot_open_over_an_existing_position() {
        let router = router();
        router
            .route(&Decision::open(Side::Long, 10, dec!(100)), "BTC/USDT", dec!(100))
            .await;

        for side in [Side::Long, Side::Short] {
            let outcome = router
                .route(&Decision::open(side, 10, dec!(100)), "BTC/USDT", dec!(100))
                .await;
            assert!(matches!(
                outcome,
                Outcome::Rejected(TradeError::InvalidTransition(_))
            ));
        }
        let ledger = router.ledger().lock().await;
        assert_eq!(ledger.positions().count(), 1);
        assert_eq!(ledger.balance(), dec!(900));
    }

    #[tokio::test]
    async fn hold_and_flat_close_are_no_ops() {
        let router = router();
        let hold = router.route(&Decision::hold("wait"), "BTC/USDT", dec!(100)).await;
        let close = router.route(&Decision::close("exit"), "BTC/USDT", dec!(100)).await;

        assert!(matches!(hold, Outcome::NoOp(_)));
        assert!(matches!(close, Outcome::NoOp(_)));
        assert_eq!(router.ledger().lock().await.balance(), dec!(1000));
    }

    #[tokio::test]
    async fn hold_keeps_open_position() {
        let router = router();
        router
            .route(&Decision::open(Side::Long, 10, dec!(100)), "BTC/USDT", dec!(100))
            .await;
        let outcome = router.route(&Decision::hold(""), "BTC/USDT", dec!(120)).await;

        assert_eq!(outcome.label(), "no-op");
        assert!(router.ledger().lock().await.position("BTC/USDT").is_some());
    }

    #[tokio::test]
    async fn close_settles_at_current_price() {
        let router = router();
        router
            .route(&Decision::open(Side::Short, 10, dec!(100)), "SOL/USDT", dec!(20))
            .await;
        let outcome = router.route(&Decision::close("done"), "SOL/USDT", dec!(18)).await;

        let Outcome::Closed(trade) = outcome else {
            panic!("expected close");
        };
        // qty = 100 * 10 / 20 = 50, short gains 2 per unit
        assert_eq!(trade.realized_pnl, dec!(100));
        assert_eq!(router.ledger().lock().await.balance(), dec!(1100));
    }

    #[tokio::test]
    async fn at_most_one_position_per_symbol_over_a_sequence() {
        let router = router();
        let script = [
            Decision::open(Side::Long, 10, dec!(50)),
            Decision::open(Side::Short, 20, dec!(50)),
            Decision::hold(""),
            Decision::close(""),
            Decision::close(""),
            Decision::open(Side::Short, 50, dec!(50)),
            Decision::open(Side::Long, 50, dec!(50)),
        ];
        for (i, decision) in script.iter().enumerate() {
            for symbol in ["BTC/USDT", "ETH/USDT"] {
                let price = Decimal::from(100 + i as i64);
                router.route(decision, symbol, price).await;
                let ledger = router.ledger().lock().await;
                assert!(ledger.positions().filter(|p| p.symbol == symbol).count() <= 1);
            }
        }
        let ledger = router.ledger().lock().await;
        assert_eq!(ledger.position("BTC/USDT").map(|p| p.side), Some(Side::Short));
        assert_eq!(ledger.closed_trades().len(), 2);
    }
}
