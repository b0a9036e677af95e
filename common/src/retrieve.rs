use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{ChunkType, KnowledgeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetrieverType {
    Vector,
    Keyword,
}

impl std::fmt::Display for RetrieverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

/// Why a fragment ended up in a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Vector,
    Keyword,
    ParentChunk,
    NearByChunk,
    RelationChunk,
}

/// One retriever dispatch. Scores and thresholds are retriever-native.
#[derive(Debug, Clone)]
pub struct RetrieveParams {
    pub retriever_type: RetrieverType,
    pub query_text: String,
    pub query_vector: Option<Vec<f32>>,
    pub knowledge_base_id: String,
    pub knowledge_ids: Option<Vec<String>>,
    pub knowledge_type: Option<KnowledgeType>,
    pub top_k: usize,
    pub threshold: f64,
}

/// A single ranked retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub chunk_id: String,
    pub knowledge_id: String,
    pub score: f64,
    pub match_type: MatchType,
}

/// Everything a retriever needs to index one fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub chunk_id: String,
    pub knowledge_id: String,
    pub knowledge_base_id: String,
    pub content: String,
    pub chunk_type: ChunkType,
    pub embedding_model_id: Option<String>,
}

/// A single-modality searcher over indexed fragments.
///
/// Vector index records are partitioned by `(embedding_model_id, dimensions,
/// knowledge_type)`, which is why the delete operations carry dimensions and
/// type alongside the id lists.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn retriever_type(&self) -> RetrieverType;

    /// Engine tag for diagnostics, e.g. "postgres" or "memory".
    fn engine(&self) -> &str;

    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RankedHit>, AppError>;

    /// Index fragments; `vectors[i]` pairs with `infos[i]` and is `None` for
    /// keyword-only records.
    async fn index(
        &self,
        infos: &[IndexInfo],
        vectors: &[Option<Vec<f32>>],
    ) -> Result<(), AppError>;

    async fn delete_by_knowledge_id_list(
        &self,
        knowledge_ids: &[String],
        dimensions: usize,
        knowledge_type: KnowledgeType,
    ) -> Result<(), AppError>;

    async fn delete_by_source_id_list(
        &self,
        source_ids: &[String],
        dimensions: usize,
        knowledge_type: KnowledgeType,
    ) -> Result<(), AppError>;
}
