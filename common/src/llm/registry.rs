use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};

use crate::error::AppError;
use crate::llm::chat::ChatModel;
use crate::llm::embedder::Embedder;

/// How many texts each pooled embedding call carries.
const POOL_BATCH_SIZE: usize = 16;
/// Concurrent in-flight pooled embedding calls.
const POOL_CONCURRENCY: usize = 4;

/// Named lookup of chat and embedding models. Immutable after build; shared
/// via `Arc` across services and workers.
pub struct ModelRegistry {
    embedders: HashMap<String, Arc<dyn Embedder>>,
    chat_models: HashMap<String, Arc<dyn ChatModel>>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    pub fn embedder(&self, model_id: &str) -> Result<Arc<dyn Embedder>, AppError> {
        self.embedders
            .get(model_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("embedding model {model_id}")))
    }

    pub fn chat_model(&self, model_id: &str) -> Result<Arc<dyn ChatModel>, AppError> {
        self.chat_models
            .get(model_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("chat model {model_id}")))
    }

    /// Embed a large text list in pooled batches, preserving input order.
    pub async fn batch_embed_with_pool(
        &self,
        model_id: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let embedder = self.embedder(model_id)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(POOL_BATCH_SIZE)
            .map(|batch| batch.to_vec())
            .collect();

        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| {
                let embedder = Arc::clone(&embedder);
                async move { embedder.batch_embed(&batch).await }
            })
            .buffered(POOL_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(results.into_iter().flatten().collect())
    }
}

#[derive(Default)]
pub struct ModelRegistryBuilder {
    embedders: HashMap<String, Arc<dyn Embedder>>,
    chat_models: HashMap<String, Arc<dyn ChatModel>>,
}

impl ModelRegistryBuilder {
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedders
            .insert(embedder.model_id().to_string(), embedder);
        self
    }

    pub fn with_chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_models.insert(model.model_id().to_string(), model);
        self
    }

    pub fn build(self) -> ModelRegistry {
        ModelRegistry {
            embedders: self.embedders,
            chat_models: self.chat_models,
        }
    }
}
