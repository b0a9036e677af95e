use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph_store::{GraphNode, GraphRelation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnowledgeBaseKind {
    Document,
    Faq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(default)]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            separators: vec!["\n\n".into(), "\n".into()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageProcessingConfig {
    pub enable_caption: bool,
    pub enable_ocr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqConfig {
    /// FAQ hits scoring at or above this are treated as direct answers.
    pub direct_answer_threshold: f64,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            direct_answer_threshold: 0.9,
        }
    }
}

/// One worked example shown to the extraction model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractExample {
    pub text: String,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relations: Vec<GraphRelation>,
}

/// Per-knowledge-base configuration of the entity/relation extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<ExtractExample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlmConfig {
    pub model_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: String,
}

/// A tenant-scoped collection of knowledges sharing retrieval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub tenant_id: u64,
    pub name: String,
    pub description: String,
    pub kind: KnowledgeBaseKind,
    pub chunking_config: ChunkingConfig,
    pub image_processing_config: ImageProcessingConfig,
    #[serde(default)]
    pub faq_config: Option<FaqConfig>,
    pub embedding_model_id: String,
    pub summary_model_id: String,
    #[serde(default)]
    pub extract_config: Option<ExtractConfig>,
    #[serde(default)]
    pub vlm_config: Option<VlmConfig>,
    pub storage_config: StorageConfig,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    pub fn new(
        tenant_id: u64,
        name: impl Into<String>,
        kind: KnowledgeBaseKind,
        embedding_model_id: impl Into<String>,
        summary_model_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            name: name.into(),
            description: String::new(),
            kind,
            chunking_config: ChunkingConfig::default(),
            image_processing_config: ImageProcessingConfig::default(),
            faq_config: match kind {
                KnowledgeBaseKind::Faq => Some(FaqConfig::default()),
                KnowledgeBaseKind::Document => None,
            },
            embedding_model_id: embedding_model_id.into(),
            summary_model_id: summary_model_id.into(),
            extract_config: None,
            vlm_config: None,
            storage_config: StorageConfig::default(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_faq(&self) -> bool {
        self.kind == KnowledgeBaseKind::Faq
    }

    /// Clone the retrieval-relevant configuration into a fresh knowledge base.
    pub fn copy_as(&self, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            deleted: false,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}
