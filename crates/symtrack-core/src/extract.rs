use std::sync::Arc;

use serde::de::DeserializeOwned;
use symtrack_provider::{LlmRequest, LlmRouter};

use crate::config::ModelPolicy;

/// Chat model handle shared by the workflows: routes through the
/// configured model chain and degrades to deterministic defaults when the
/// model is unavailable or returns something unusable.
#[derive(Clone)]
pub struct ChatModel {
    router: Arc<LlmRouter>,
    policy: ModelPolicy,
    max_tokens: u32,
}

impl ChatModel {
    pub fn new(router: Arc<LlmRouter>, policy: ModelPolicy, max_tokens: u32) -> Self {
        Self {
            router,
            policy,
            max_tokens,
        }
    }

    /// Schema-constrained extraction. Any failure (provider error,
    /// malformed output, schema mismatch) substitutes the fallback and
    /// logs at warning level; the caller never sees an error.
    pub async fn structured_or<T, F>(
        &self,
        system: &str,
        user: &str,
        schema: serde_json::Value,
        fallback: F,
    ) -> T
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        let request = LlmRequest {
            model: String::new(),
            system: Some(system.to_string()),
            messages: vec![symtrack_provider::LlmMessage::user(user)],
            max_tokens: self.max_tokens,
            response_schema: Some(schema),
        };

        match self
            .router
            .chat(&self.policy.primary, &self.policy.fallbacks, request)
            .await
        {
            Ok(resp) => match serde_json::from_str::<T>(strip_code_fences(&resp.text)) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("structured extraction returned unparsable output: {e}");
                    fallback()
                }
            },
            Err(e) => {
                tracing::warn!("structured extraction failed, using fallback: {e}");
                fallback()
            }
        }
    }

    /// Free-text generation with a canned fallback.
    pub async fn text_or<F>(&self, system: &str, user: &str, fallback: F) -> String
    where
        F: FnOnce() -> String,
    {
        let request = LlmRequest {
            model: String::new(),
            system: Some(system.to_string()),
            messages: vec![symtrack_provider::LlmMessage::user(user)],
            max_tokens: self.max_tokens,
            response_schema: None,
        };

        match self
            .router
            .chat(&self.policy.primary, &self.policy.fallbacks, request)
            .await
        {
            Ok(resp) if !resp.text.trim().is_empty() => resp.text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("text generation returned empty output, using fallback");
                fallback()
            }
            Err(e) => {
                tracing::warn!("text generation failed, using fallback: {e}");
                fallback()
            }
        }
    }
}

/// Models frequently wrap JSON in markdown fences despite instructions.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
