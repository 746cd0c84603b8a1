use super::{CompletionProvider, CompletionRequest};
use crate::Config;
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use promptops_api::ModelProvider;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPEN_AI_API_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
pub const GOOGLE_AI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct HttpCompletionProvider {
    client: reqwest::Client,
    openai_api_key: Option<Arc<str>>,
    anthropic_api_key: Option<Arc<str>>,
    google_ai_api_key: Option<Arc<str>>,
}

impl HttpCompletionProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            openai_api_key: config.openai_api_key.clone(),
            anthropic_api_key: config.anthropic_api_key.clone(),
            google_ai_api_key: config.google_ai_api_key.clone(),
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        match request.provider {
            ModelProvider::OpenAi => {
                let api_key = self
                    .openai_api_key
                    .as_ref()
                    .context("no OpenAI API key configured on the server")?;
                let response: Value = self
                    .client
                    .post(format!("{OPEN_AI_API_URL}/chat/completions"))
                    .bearer_auth(api_key)
                    .json(&json!({
                        "model": request.model_name,
                        "messages": [{"role": "user", "content": request.prompt}],
                    }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                extract_text(&response, "/choices/0/message/content")
            }
            ModelProvider::Anthropic => {
                let api_key = self
                    .anthropic_api_key
                    .as_ref()
                    .context("no Anthropic API key configured on the server")?;
                let response: Value = self
                    .client
                    .post(format!("{ANTHROPIC_API_URL}/messages"))
                    .header("x-api-key", api_key.as_ref())
                    .header("anthropic-version", "2023-06-01")
                    .json(&json!({
                        "model": request.model_name,
                        "max_tokens": 4096,
                        "messages": [{"role": "user", "content": request.prompt}],
                    }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                extract_text(&response, "/content/0/text")
            }
            ModelProvider::Google => {
                let api_key = self
                    .google_ai_api_key
                    .as_ref()
                    .context("no Google AI API key configured on the server")?;
                let response: Value = self
                    .client
                    .post(format!(
                        "{GOOGLE_AI_API_URL}/models/{}:generateContent?key={api_key}",
                        request.model_name
                    ))
                    .json(&json!({
                        "contents": [{"parts": [{"text": request.prompt}]}],
                    }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                extract_text(&response, "/candidates/0/content/parts/0/text")
            }
        }
    }
}

fn extract_text(response: &Value, pointer: &str) -> Result<String> {
    Ok(response
        .pointer(pointer)
        .and_then(|text| text.as_str())
        .ok_or_else(|| anyhow!("unexpected provider response shape"))?
        .to_string())
}
