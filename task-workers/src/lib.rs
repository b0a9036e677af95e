pub mod chunk_extract;
pub mod kb_delete;
pub mod router;
pub mod table_summary;
mod table_session;

pub use chunk_extract::ChunkExtractHandler;
pub use kb_delete::KnowledgeBaseDeleteHandler;
pub use router::TaskRouter;
pub use table_summary::TableSummaryHandler;
