//! In-memory capability implementations for tests and local development.

pub mod graph_store;
pub mod llm;
pub mod repositories;
pub mod retriever;
pub mod task_queue;

pub use graph_store::InMemoryGraphStore;
pub use llm::{ScriptedChatModel, StaticEmbedder};
pub use repositories::{
    InMemoryFileStore, InMemoryFragmentRepository, InMemoryKnowledgeBaseRepository,
    InMemoryKnowledgeRepository, InMemoryTenantRepository,
};
pub use retriever::StaticRetriever;
pub use task_queue::InMemoryTaskQueue;
