use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::ollama;

use crate::prelude::*;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

/// A generative model: system preamble plus prompt in, completion text out.
#[allow(async_fn_in_trait)]
pub trait CompletionModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, ModelError>;

    /// Human-readable model name for logs.
    fn name(&self) -> String;
}

/// Local Ollama model reached through rig.
pub struct OllamaModel {
    client: ollama::Client,
    model: String,
}

impl OllamaModel {
    pub fn new(ollama_url: &str, model: impl Into<String>) -> Result<Self> {
        use rig::client::Nothing;

        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(ollama_url)
            .build()
            .map_err(|e| eyre!("Failed to create Ollama client: {}", e))?;

        Ok(Self {
            client,
            model: model.into(),
        })
    }
}

impl CompletionModel for OllamaModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, ModelError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(0.0)
            .build();

        agent
            .prompt(prompt.to_string())
            .await
            .map_err(|e| ModelError::Request(e.to_string()))
    }

    fn name(&self) -> String {
        self.model.clone()
    }
}
