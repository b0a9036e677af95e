use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionNamedToolChoice, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionToolChoiceOption,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateEmbeddingRequestArgs, EmbeddingInput, FinishReason, FunctionName, FunctionObjectArgs,
    ResponseFormat,
};
use async_openai::Client;
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::warn;

use crate::error::AppError;
use crate::llm::chat::{
    ChatMessage, ChatModel, ChatOptions, ChatResponse, ChatRole, ChatStream, ResponseFormatKind,
    StreamEvent, TokenUsage, ToolCall, ToolCallFunction, ToolChoice,
};
use crate::llm::embedder::Embedder;
use crate::llm::stream_assembly::{ToolCallAssembler, ToolCallDelta};

/// Chat capability backed by an OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let mapped: Result<Vec<ChatCompletionRequestMessage>, AppError> =
            messages.iter().map(map_message).collect();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(mapped?);

        if let Some(temperature) = opts.temperature {
            args.temperature(temperature);
        }
        if let Some(top_p) = opts.top_p {
            args.top_p(top_p);
        }
        if let Some(max_tokens) = opts.max_tokens {
            args.max_tokens(max_tokens);
        }
        if let Some(max_completion_tokens) = opts.max_completion_tokens {
            args.max_completion_tokens(max_completion_tokens);
        }
        if let Some(frequency_penalty) = opts.frequency_penalty {
            args.frequency_penalty(frequency_penalty);
        }
        if let Some(presence_penalty) = opts.presence_penalty {
            args.presence_penalty(presence_penalty);
        }
        if let Some(format) = opts.format {
            args.response_format(match format {
                ResponseFormatKind::Text => ResponseFormat::Text,
                ResponseFormatKind::JsonObject => ResponseFormat::JsonObject,
            });
        }
        if let Some(tools) = opts.tools.as_ref() {
            let mapped_tools: Result<Vec<ChatCompletionTool>, AppError> = tools
                .iter()
                .map(|tool| {
                    let function = FunctionObjectArgs::default()
                        .name(&tool.name)
                        .description(&tool.description)
                        .parameters(tool.parameters.clone())
                        .build()
                        .map_err(AppError::from)?;
                    Ok(ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function,
                    })
                })
                .collect();
            args.tools(mapped_tools?);
        }
        if let Some(choice) = opts.tool_choice.as_ref() {
            args.tool_choice(match choice {
                ToolChoice::Auto => ChatCompletionToolChoiceOption::Auto,
                ToolChoice::None => ChatCompletionToolChoiceOption::None,
                ToolChoice::Required => ChatCompletionToolChoiceOption::Required,
                ToolChoice::Function(name) => {
                    ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionName { name: name.clone() },
                    })
                }
            });
        }

        args.build().map_err(AppError::from)
    }
}

fn map_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, AppError> {
    Ok(match message.role {
        ChatRole::System => {
            ChatCompletionRequestSystemMessage::from(message.content.clone()).into()
        }
        ChatRole::User => ChatCompletionRequestUserMessage::from(message.content.clone()).into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(AppError::from)?
            .into(),
    })
}

fn finish_reason_label(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::FunctionCall => "function_call",
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<ChatResponse, AppError> {
        let request = self.build_request(messages, opts)?;
        let response = self.client.chat().create(request).await?;

        let usage = response.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(AppError::LLMParsing(
                "no choices in chat completion response".into(),
            ));
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                function: ToolCallFunction {
                    name: call.function.name,
                    arguments: call.function.arguments,
                },
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.map(|r| finish_reason_label(r).into()),
            tool_calls,
            usage,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<ChatStream, AppError> {
        let request = self.build_request(messages, opts)?;
        let mut upstream = self.client.chat().create_stream(request).await?;

        let stream = stream! {
            let mut assembler = ToolCallAssembler::new();

            while let Some(next) = upstream.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(error = %err, "chat stream aborted");
                        yield StreamEvent::error(err.to_string());
                        return;
                    }
                };

                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield StreamEvent::answer(content);
                        }
                    }
                    for call_chunk in choice.delta.tool_calls.unwrap_or_default() {
                        let delta = ToolCallDelta {
                            index: call_chunk.index as usize,
                            id: call_chunk.id,
                            function_name: call_chunk
                                .function
                                .as_ref()
                                .and_then(|f| f.name.clone()),
                            function_arguments: call_chunk
                                .function
                                .and_then(|f| f.arguments),
                        };
                        if let Some(stabilized) = assembler.apply(delta) {
                            yield StreamEvent::tool_call(stabilized);
                        }
                    }
                }
            }

            yield StreamEvent::finished(assembler.finish());
        };

        Ok(Box::pin(stream))
    }
}

/// Embedding capability backed by an OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::Dependency("embedding response carried no vectors".into()))
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;
        if response.data.len() != texts.len() {
            return Err(AppError::Dependency(format!(
                "embedding response size mismatch: sent {}, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
