// src/error.rs
use thiserror::Error;

/// Failure taxonomy shared by the ledger, router and orchestrator.
///
/// Only `Configuration` is fatal; everything else is reported at the symbol
/// boundary and the cycle carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("no open position for {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("collaborator failure: {0}")]
    CollaboratorFailure(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TradeError {
    /// Stable label for log lines and events.
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::InvariantViolation(_) => "invariant_violation",
            TradeError::NotFound(_) => "not_found",
            TradeError::InvalidTransition(_) => "invalid_transition",
            TradeError::CollaboratorFailure(_) => "collaborator_failure",
            TradeError::Configuration(_) => "configuration",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TradeError::Configuration(_))
    }
}

impl From<config::ConfigError> for TradeError {
    fn from(err: config::ConfigError) -> Self {
        TradeError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_is_fatal() {
        assert!(TradeError::Configuration("no keys".into()).is_fatal());
        assert!(!TradeError::NotFound("BTC/USDT".into()).is_fatal());
        assert!(!TradeError::InvariantViolation("x".into()).is_fatal());
    }

    #[test]
    fn display_names_the_symbol() {
        let err = TradeError::NotFound("ETH/USDT".into());
        assert_eq!(err.to_string(), "no open position for ETH/USDT");
        assert_eq!(err.kind(), "not_found");
    }
}
