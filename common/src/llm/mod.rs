pub mod chat;
pub mod embedder;
pub mod json;
pub mod openai;
pub mod registry;
pub mod stream_assembly;

pub use chat::{
    ChatMessage, ChatModel, ChatOptions, ChatResponse, ChatRole, ChatStream, ResponseFormatKind,
    StreamEvent, StreamEventKind, TokenUsage, ToolCall, ToolCallFunction, ToolChoice, ToolSpec,
};
pub use embedder::Embedder;
pub use registry::{ModelRegistry, ModelRegistryBuilder};
pub use stream_assembly::{ToolCallAssembler, ToolCallDelta};
