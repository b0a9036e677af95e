use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_QUEUE: &str = "default";
pub const LOW_PRIORITY_QUEUE: &str = "low";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const CHUNK_EXTRACT_TASK: &str = "chunk.extract";
pub const KNOWLEDGE_BASE_DELETE_TASK: &str = "kb.delete";
pub const TABLE_SUMMARY_TASK: &str = "table.summary";

/// A typed payload wrapped for the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_type: String,
    pub queue: String,
    pub max_retries: u32,
    pub payload: serde_json::Value,
}

impl TaskEnvelope {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            AppError::Validation(format!("invalid {} payload: {e}", self.task_type))
        })
    }
}

/// Durable task queue with at-least-once delivery. Handlers must tolerate
/// redelivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: TaskEnvelope) -> Result<(), AppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkExtractPayload {
    pub tenant_id: u64,
    pub chunk_id: String,
    pub model_id: String,
}

impl ChunkExtractPayload {
    pub fn into_envelope(self) -> Result<TaskEnvelope, AppError> {
        Ok(TaskEnvelope {
            task_type: CHUNK_EXTRACT_TASK.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            payload: serde_json::to_value(self)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseDeletePayload {
    pub tenant_id: u64,
    pub knowledge_base_id: String,
    pub effective_engines: Vec<String>,
}

impl KnowledgeBaseDeletePayload {
    pub fn into_envelope(self) -> Result<TaskEnvelope, AppError> {
        Ok(TaskEnvelope {
            task_type: KNOWLEDGE_BASE_DELETE_TASK.to_string(),
            queue: LOW_PRIORITY_QUEUE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            payload: serde_json::to_value(self)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummaryPayload {
    pub tenant_id: u64,
    pub knowledge_id: String,
    pub summary_model: String,
    pub embedding_model: String,
}

impl TableSummaryPayload {
    pub fn into_envelope(self) -> Result<TaskEnvelope, AppError> {
        Ok(TaskEnvelope {
            task_type: TABLE_SUMMARY_TASK.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            payload: serde_json::to_value(self)?,
        })
    }
}
