use super::{CompletionProvider, CompletionRequest};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Test double that records every request and can be told to fail the next
/// call, for exercising the record-usage-only-on-success policy.
#[derive(Default)]
pub struct FakeCompletionProvider {
    completions: Mutex<Vec<CompletionRequest>>,
    next_error: Mutex<Option<String>>,
}

impl FakeCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_completion(&self, message: &str) {
        *self.next_error.lock() = Some(message.to_string());
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().len()
    }

    pub fn last_completion(&self) -> Option<CompletionRequest> {
        self.completions.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        if let Some(message) = self.next_error.lock().take() {
            return Err(anyhow!(message));
        }

        let completion = format!("fake completion for {:?}", request.prompt);
        self.completions.lock().push(request);
        Ok(completion)
    }
}
