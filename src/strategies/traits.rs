// src/strategies/traits.rs
use crate::core::decision::Decision;
use crate::types::AdvisoryRequest;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn name(&self) -> String;

    // Malformed replies must come back as a hold, not as an error.
    // Errors are reserved for transport/auth failures.
    async fn decide(&self, request: &AdvisoryRequest, credential: &str) -> Result<Decision>;
}
