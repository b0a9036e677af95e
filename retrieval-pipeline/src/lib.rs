pub mod composite;
pub mod context;
mod enrich;
mod faq;
pub mod fusion;
pub mod search;
pub mod service;

use common::model::{ChunkType, ImageInfo};
use common::retrieve::MatchType;

pub use composite::{CompositeRetriever, RetrievedList};
pub use context::{ContextAssembler, FaqPriority};
pub use search::SearchParams;
pub use service::{CreateKnowledgeBaseParams, KnowledgeBaseService, UpdateKnowledgeBaseParams};

/// A retrieval hit materialized for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_id: String,
    pub knowledge_id: String,
    pub knowledge_base_id: String,
    pub content: String,
    pub chunk_type: ChunkType,
    pub chunk_index: i32,
    pub score: f64,
    pub match_type: MatchType,
    pub knowledge_title: String,
    pub file_name: String,
    pub image_info: Vec<ImageInfo>,
    pub metadata: Option<serde_json::Value>,
}

impl SearchResult {
    pub fn is_faq(&self) -> bool {
        self.chunk_type == ChunkType::Faq
    }
}
