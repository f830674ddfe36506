// src/config.rs

use crate::error::TradeError;
use config::{Config, Environment, File, Map};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slowest indicator in the market summary (EMA 50) needs this many candles.
pub const MIN_KLINE_LIMIT: u32 = 50;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    pub symbols: Vec<String>,
    pub cycle_period_secs: u64,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub starting_balance: Decimal,
    // Market data
    pub market_data_url: String,
    pub kline_interval: String,
    pub kline_limit: u32,
    // Advisor
    pub llm_api_url: String,
    pub llm_model: String,
    pub llm_temperature: f64,
    pub request_timeout_secs: u64,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTC/USDT", "ETH/USDT", "DOGE/USDT", "SOL/USDT", "XRP/USDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cycle_period_secs: 60,
            take_profit_pct: dec!(25),
            stop_loss_pct: dec!(15),
            starting_balance: dec!(1000),
            market_data_url: "https://api.binance.com".to_string(),
            kline_interval: "1m".to_string(),
            kline_limit: 100,
            llm_api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            llm_model: "llama-3.3-70b-versatile".to_string(),
            llm_temperature: 0.7,
            request_timeout_secs: 30,
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then `Settings.*` if present, then `APP_*` environment variables.
    pub fn new() -> Result<Self, TradeError> {
        Self::load("Settings")
    }

    pub fn load(settings_file: &str) -> Result<Self, TradeError> {
        Self::load_with_env(settings_file, None)
    }

    /// Same as [`AppConfig::load`], reading `APP_*` values from `env` instead
    /// of the process environment when given.
    pub fn load_with_env(
        settings_file: &str,
        env: Option<Map<String, String>>,
    ) -> Result<Self, TradeError> {
        let builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(settings_file).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .source(env),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.symbols = normalize_symbols(config.symbols);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        if self.symbols.is_empty() {
            return Err(TradeError::Configuration(
                "symbol list must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .symbols
            .iter()
            .find(|s| s.is_empty() || s.trim() != s.as_str())
        {
            return Err(TradeError::Configuration(format!(
                "symbol '{}' is blank or padded with whitespace",
                bad
            )));
        }
        if self.cycle_period_secs == 0 {
            return Err(TradeError::Configuration(
                "cycle_period_secs must be positive".into(),
            ));
        }
        if self.take_profit_pct <= Decimal::ZERO || self.stop_loss_pct <= Decimal::ZERO {
            return Err(TradeError::Configuration(format!(
                "take-profit ({}) and stop-loss ({}) must be positive percentages",
                self.take_profit_pct, self.stop_loss_pct
            )));
        }
        if self.starting_balance <= Decimal::ZERO {
            return Err(TradeError::Configuration(format!(
                "starting_balance must be positive, got {}",
                self.starting_balance
            )));
        }
        if self.kline_limit < MIN_KLINE_LIMIT {
            return Err(TradeError::Configuration(format!(
                "kline_limit {} is below the {} candles the indicators need",
                self.kline_limit, MIN_KLINE_LIMIT
            )));
        }
        Ok(())
    }
}

/// `"BTC/USDT, ETH/USDT,,"` -> `["BTC/USDT", "ETH/USDT"]`
fn normalize_symbols(symbols: Vec<String>) -> Vec<String> {
    symbols
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Ordered pool of advisor API keys. Never validated here, only selected by index.
#[derive(Clone)]
pub struct CredentialPool {
    keys: Vec<String>,
}

impl CredentialPool {
    pub const ENV_PREFIX: &'static str = "GROQ_API_KEY";

    pub fn new(keys: Vec<String>) -> Result<Self, TradeError> {
        let keys: Vec<String> = keys.into_iter().filter(|k| !k.trim().is_empty()).collect();
        if keys.is_empty() {
            return Err(TradeError::Configuration(format!(
                "no advisor credentials found (expected {}* environment variables)",
                Self::ENV_PREFIX
            )));
        }
        Ok(Self { keys })
    }

    pub fn from_env() -> Result<Self, TradeError> {
        Self::from_vars(std::env::vars())
    }

    /// Every `GROQ_API_KEY*` variable, ordered by variable name.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, TradeError> {
        let mut found: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with(Self::ENV_PREFIX))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Self::new(found.into_iter().map(|(_, key)| key).collect())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Key at `index`, wrapping around. The pool is never empty.
    pub fn select(&self, index: usize) -> &str {
        &self.keys[index % self.keys.len()]
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("len", &self.keys.len())
            .finish()
    }
}
