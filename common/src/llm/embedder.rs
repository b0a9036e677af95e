use async_trait::async_trait;

use crate::error::AppError;

/// A stateless text-embedding capability with known dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}
