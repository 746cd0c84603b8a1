#[cfg(test)]
mod fake_completion_provider;
mod http_completion_provider;

use anyhow::Result;
use async_trait::async_trait;
use promptops_api::ModelProvider;

#[cfg(test)]
pub use fake_completion_provider::*;
pub use http_completion_provider::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub provider: ModelProvider,
    pub model_name: String,
    pub prompt: String,
}

/// The seam between quota gating and the upstream AI providers. Handlers
/// check entitlements, call this, and record usage only if it returned
/// `Ok`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
