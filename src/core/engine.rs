// src/core/engine.rs
use crate::config::{AppConfig, CredentialPool};
use crate::connectors::traits::MarketDataProvider;
use crate::core::cycle::{CycleState, Rotation};
use crate::core::decision::Decision;
use crate::core::ledger::{Ledger, SharedLedger};
use crate::core::router::{Outcome, TradeRouter};
use crate::core::sweeper::{SweepReport, TpSlSweeper};
use crate::error::TradeError;
use crate::strategies::traits::DecisionProvider;
use crate::types::{AdvisoryRequest, EngineEvent, PortfolioSummary};
use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: String,
    pub result: Result<Outcome, TradeError>,
}

/// What one cycle did, in the order it did it.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub credential_index: usize,
    pub stale_marks: Vec<String>,
    pub sweeps: Vec<SweepReport>,
    pub snapshot: PortfolioSummary,
    pub symbols: Vec<SymbolReport>,
    pub rotation: Option<Rotation>,
    pub summary: PortfolioSummary,
}

pub struct TradingEngine {
    config: AppConfig,
    ledger: SharedLedger,
    router: TradeRouter,
    sweeper: TpSlSweeper,
    market: Box<dyn MarketDataProvider>,
    advisor: Box<dyn DecisionProvider>,
    credentials: CredentialPool,
    state: CycleState,
    event_sender: Option<mpsc::Sender<EngineEvent>>,
}

impl TradingEngine {
    pub fn new(
        config: AppConfig,
        credentials: CredentialPool,
        market: Box<dyn MarketDataProvider>,
        advisor: Box<dyn DecisionProvider>,
    ) -> Self {
        let ledger = Ledger::shared(config.starting_balance);
        let router = TradeRouter::new(ledger.clone());
        let sweeper = TpSlSweeper::new(config.take_profit_pct, config.stop_loss_pct);
        Self {
            config,
            ledger,
            router,
            sweeper,
            market,
            advisor,
            credentials,
            state: CycleState::default(),
            event_sender: None,
        }
    }

    pub fn with_events(mut self, sender: mpsc::Sender<EngineEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    fn emit(&self, event: EngineEvent) {
        let Some(sender) = &self.event_sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Event channel closed! Observer is likely gone.");
            }
        }
    }

    /// Runs until Ctrl+C.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// First cycle immediately, then one per period. Cycles never overlap: an
    /// overrunning cycle just pushes the next one back. `shutdown` is only
    /// observed between cycles.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Engine loop running. Advisor: {}, period: {}s, symbols: {}",
            self.advisor.name(),
            self.config.cycle_period_secs,
            self.config.symbols.join(", ")
        );

        let mut ticker = interval(Duration::from_secs(self.config.cycle_period_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // an overdue tick must not outrun a pending shutdown
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping after cycle #{}", self.state.cycle_count);
                    break;
                }
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }
        Ok(())
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle = self.state.cycle_count;
        let credential_index = self.state.active_credential_index;
        info!(cycle, credential_index, "======== Cycle #{} start ========", cycle);
        self.emit(EngineEvent::CycleStarted {
            cycle,
            credential_index,
        });

        // 1. Marks
        let stale_marks = self.refresh_marks().await;

        // 2. TP/SL
        let sweeps = self.sweeper.sweep(&self.router).await;
        for report in &sweeps {
            self.emit(EngineEvent::Swept(report.clone()));
        }

        // 3. One snapshot shared by every decision in this cycle
        let snapshot = self.ledger.lock().await.summary();
        info!(
            "[PF] balance ${} | margin ${} | uPnL ${} | equity ${} | open {}",
            snapshot.balance,
            snapshot.total_margin_locked,
            snapshot.total_unrealized_pnl,
            snapshot.equity,
            snapshot.open_positions
        );
        self.emit(EngineEvent::Snapshot(snapshot.clone()));

        // 4. Symbols, in configured order
        let credential = self.credentials.select(credential_index);
        let mut symbols = Vec::with_capacity(self.config.symbols.len());
        for symbol in &self.config.symbols {
            let result = AssertUnwindSafe(self.process_symbol(symbol, &snapshot, credential))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(TradeError::CollaboratorFailure(format!(
                        "panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });

            match &result {
                Ok(outcome) => {
                    info!(symbol = %symbol, outcome = outcome.label(), "[{}] {:?}", symbol, outcome);
                    self.emit(EngineEvent::SymbolProcessed {
                        symbol: symbol.clone(),
                        outcome: outcome.clone(),
                    });
                }
                Err(e) => {
                    error!(symbol = %symbol, kind = e.kind(), action = "skip", "[{}] Skipped: {}", symbol, e);
                    self.emit(EngineEvent::SymbolFailed {
                        symbol: symbol.clone(),
                        kind: e.kind(),
                        action: "skip",
                        message: e.to_string(),
                    });
                }
            }
            symbols.push(SymbolReport {
                symbol: symbol.clone(),
                result,
            });
        }

        // 5. Finalize
        let (state, rotation) = self.state.complete(self.credentials.len());
        self.state = state;
        if let Some(Rotation { from, to }) = rotation {
            warn!("🔑 Rotating API key: switched from index {} to {}", from, to);
            self.emit(EngineEvent::CredentialRotated { from, to });
        }

        let summary = self.ledger.lock().await.summary();
        info!(
            cycle,
            equity = %summary.equity,
            "======== Cycle #{} end: equity ${}, next run in {}s ========",
            cycle,
            summary.equity,
            self.config.cycle_period_secs
        );
        self.emit(EngineEvent::CycleFinished {
            cycle,
            summary: summary.clone(),
        });

        CycleReport {
            cycle,
            credential_index,
            stale_marks,
            sweeps,
            snapshot,
            symbols,
            rotation,
            summary,
        }
    }

    /// Fetches marks for every open position concurrently, then applies them
    /// one by one under a single lock. Returns the symbols left stale.
    async fn refresh_marks(&self) -> Vec<String> {
        let symbols: Vec<String> = self
            .ledger
            .lock()
            .await
            .positions()
            .map(|p| p.symbol.clone())
            .collect();
        if symbols.is_empty() {
            return Vec::new();
        }

        let prices = join_all(symbols.iter().map(|s| self.market.fetch_price(s))).await;

        let mut ledger = self.ledger.lock().await;
        let mut stale = Vec::new();
        for (symbol, price) in symbols.into_iter().zip(prices) {
            let updated = price
                .map_err(|e| TradeError::CollaboratorFailure(format!("{:#}", e)))
                .and_then(|p| ledger.update_mark(&symbol, p));
            match updated {
                Ok(position) => info!(
                    "[{}] {} @ {} (entry {}), uPnL ${}",
                    symbol,
                    position.side,
                    position.current_price,
                    position.entry_price,
                    position.unrealized_pnl
                ),
                Err(e) => {
                    warn!(symbol = %symbol, kind = e.kind(), action = "keep stale mark", "[{}] Mark refresh failed: {}", symbol, e);
                    self.emit(EngineEvent::MarkStale {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    });
                    stale.push(symbol);
                }
            }
        }
        stale
    }

    async fn process_symbol(
        &self,
        symbol: &str,
        snapshot: &PortfolioSummary,
        credential: &str,
    ) -> Result<Outcome, TradeError> {
        let market_data = match self.market.market_summary(symbol).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Err(TradeError::CollaboratorFailure(
                    "no market data this cycle".to_string(),
                ))
            }
            Err(e) => {
                return Err(TradeError::CollaboratorFailure(format!(
                    "market data: {:#}",
                    e
                )))
            }
        };

        let position_status = self.ledger.lock().await.position_status(symbol);
        info!(
            "[{}] price {} | {:?} | EMA20 {} EMA50 {} RSI {} | position {:?}",
            symbol,
            market_data.current_price,
            market_data.market_trend,
            market_data.ema_20,
            market_data.ema_50,
            market_data.rsi_14,
            position_status.side
        );

        let request = AdvisoryRequest {
            portfolio_summary: snapshot.clone(),
            market_data,
            position_status,
        };

        let decision = match self.advisor.decide(&request, credential).await {
            Ok(decision) => decision,
            Err(e) => {
                let e = TradeError::CollaboratorFailure(format!("advisor: {:#}", e));
                warn!(symbol = %symbol, kind = e.kind(), action = "hold", "[{}] {}", symbol, e);
                self.emit(EngineEvent::SymbolFailed {
                    symbol: symbol.to_string(),
                    kind: e.kind(),
                    action: "hold",
                    message: e.to_string(),
                });
                Decision::hold("advisor unavailable")
            }
        };

        Ok(self
            .router
            .route(&decision, symbol, request.market_data.current_price)
            .await)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
