// src/main.rs
use cycle_trader::config::{AppConfig, CredentialPool};
use cycle_trader::connectors::binance::BinanceMarketData;
use cycle_trader::core::engine::TradingEngine;
use cycle_trader::strategies::llm::LlmAdvisor;
use dotenvy::dotenv;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(log_dir: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "cycle_trader.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer().with_target(false).compact();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration (fatal on error)
    let config = AppConfig::new()?;
    let credentials = CredentialPool::from_env()?;
    let _guard = init_tracing(&config.log_dir)?;

    println!("========================================");
    println!("       CYCLE TRADER - v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!("Assets:   {}", config.symbols.join(", "));
    println!("Model:    {}", config.llm_model);
    println!(
        "Strategy: TP {}% / SL {}%",
        config.take_profit_pct, config.stop_loss_pct
    );
    println!("Keys:     {}", credentials.len());
    println!("Interval: every {}s", config.cycle_period_secs);
    println!("Mode:     📝 PAPER TRADING (${})", config.starting_balance);
    println!("========================================");

    // 2. Initialize Components
    let market = BinanceMarketData::new(&config)?;
    let advisor = LlmAdvisor::new(&config)?;

    // 3. Run Engine
    let mut engine = TradingEngine::new(config, credentials, Box::new(market), Box::new(advisor));
    engine.run().await?;

    info!("Engine stopped after {} cycles", engine.state().cycle_count);
    Ok(())
}
