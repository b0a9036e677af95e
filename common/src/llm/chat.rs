use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFormatKind {
    Text,
    JsonObject,
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function(String),
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    /// Providers with a reasoning mode honor this; others ignore it.
    pub thinking: Option<bool>,
    pub format: Option<ResponseFormatKind>,
    pub tools: Option<Vec<ToolSpec>>,
    pub tool_choice: Option<ToolChoice>,
}

impl ChatOptions {
    /// Low-temperature options used by deterministic extraction calls.
    pub fn extraction(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            thinking: Some(false),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEventKind {
    Answer,
    ToolCall,
    Error,
}

/// One notification on a streaming chat response.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
    pub data: Option<serde_json::Value>,
}

impl StreamEvent {
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Answer,
            content: content.into(),
            tool_calls: Vec::new(),
            done: false,
            data: None,
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            kind: StreamEventKind::ToolCall,
            content: String::new(),
            tool_calls: vec![call],
            done: false,
            data: None,
        }
    }

    /// Terminal event carrying the fully assembled tool calls, ordered by
    /// stream index.
    pub fn finished(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            kind: StreamEventKind::Answer,
            content: String::new(),
            tool_calls,
            done: true,
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Error,
            content: message.into(),
            tool_calls: Vec::new(),
            done: true,
            data: None,
        }
    }
}

pub type ChatStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A stateless chat-completion capability.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<ChatResponse, AppError>;

    /// Streaming variant. Transport errors surface as a final
    /// [`StreamEventKind::Error`] event rather than an `Err` item.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<ChatStream, AppError>;
}
