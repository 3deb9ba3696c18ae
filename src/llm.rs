//! Text-generation capability.
//!
//! Treated as an opaque collaborator: given a prompt, return text.
//! Failures surface as a single `Llm` error condition.

use crate::config::Settings;
use crate::error::{AssistantError, Result};
use crate::memory::ConversationMessage;
use async_trait::async_trait;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client for an OpenAI-compatible endpoint.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            api_key: settings.llm_api_key.clone(),
            base_url: settings.llm_base_url.clone(),
            model: settings.llm_model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a concise e-commerce analytics assistant."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.3,
            "max_tokens": 500
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AssistantError::Llm("no content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

/// Build the prompt for a general (non-data) reply, threading in recent
/// conversation history.
pub fn general_prompt(message: &str, history: &[ConversationMessage]) -> String {
    let mut prompt = String::from(
        "You are an assistant for an e-commerce analytics tool. \
         Answer the user's message conversationally. If they seem to want \
         data, suggest asking about sales, inventory, customers, or \
         performance.\n\n",
    );
    if !history.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for msg in history {
            prompt.push_str(&format!("{}: {}\n", msg.role.as_str(), msg.content));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("User: {}", message));
    prompt
}

/// Test double that replies with a fixed string.
pub struct CannedGenerator {
    pub reply: String,
}

impl CannedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}
