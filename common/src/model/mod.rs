pub mod fragment;
pub mod knowledge;
pub mod knowledge_base;
pub mod tenant;

pub use fragment::{ChunkType, FaqMetadata, Fragment, FragmentStatus, ImageInfo};
pub use knowledge::{Knowledge, KnowledgeType, ParseStatus};
pub use knowledge_base::{
    ChunkingConfig, ExtractConfig, ExtractExample, FaqConfig, ImageProcessingConfig, KnowledgeBase,
    KnowledgeBaseKind, StorageConfig, VlmConfig,
};
pub use tenant::Tenant;
