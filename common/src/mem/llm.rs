use async_trait::async_trait;
use futures::stream;
use std::sync::Mutex;

use crate::error::AppError;
use crate::llm::chat::{
    ChatMessage, ChatModel, ChatOptions, ChatResponse, ChatRole, ChatStream, StreamEvent,
};
use crate::llm::embedder::Embedder;

/// Deterministic chat model for tests.
///
/// Responses are routed by substring match against the last user message, so
/// behavior stays stable under concurrent callers. Rules are checked in
/// registration order; unmatched calls get the fallback, or fail when a
/// matching error rule exists.
pub struct ScriptedChatModel {
    model: String,
    rules: Vec<(String, String)>,
    error_rules: Vec<String>,
    fallback: String,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rules: Vec::new(),
            error_rules: Vec::new(),
            fallback: "[]".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Respond with `response` when the user message contains `needle`.
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    /// Fail the call when the user message contains `needle`.
    pub fn with_error_rule(mut self, needle: impl Into<String>) -> Self {
        self.error_rules.push(needle.into());
        self
    }

    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = response.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn respond(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let user_content = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if let Some(needle) = self
            .error_rules
            .iter()
            .find(|needle| user_content.contains(needle.as_str()))
        {
            return Err(AppError::Dependency(format!(
                "scripted failure for input containing {needle:?}"
            )));
        }

        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| user_content.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _opts: &ChatOptions,
    ) -> Result<ChatResponse, AppError> {
        let content = self.respond(messages)?;
        Ok(ChatResponse {
            content,
            finish_reason: Some("stop".into()),
            ..ChatResponse::default()
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _opts: &ChatOptions,
    ) -> Result<ChatStream, AppError> {
        let content = self.respond(messages)?;
        let events = vec![StreamEvent::answer(content), StreamEvent::finished(vec![])];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// Embedder that derives a stable vector from the text bytes.
pub struct StaticEmbedder {
    model: String,
    dimensions: usize,
}

impl StaticEmbedder {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let seed: u64 = text.bytes().map(u64::from).sum();
        (0..self.dimensions)
            .map(|i| ((seed + i as u64) % 97) as f32 / 97.0)
            .collect()
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(self.vector_for(text))
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
