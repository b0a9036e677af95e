use async_trait::async_trait;

use crate::error::AppError;
use crate::model::{
    Fragment, FragmentStatus, Knowledge, KnowledgeBase, ParseStatus, Tenant,
};

/// Relational storage of fragments. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait FragmentRepository: Send + Sync {
    async fn get(&self, tenant_id: u64, id: &str) -> Result<Option<Fragment>, AppError>;

    /// Batch fetch; missing ids are silently absent from the result.
    async fn get_many(&self, tenant_id: u64, ids: &[String]) -> Result<Vec<Fragment>, AppError>;

    async fn list_by_knowledge(
        &self,
        tenant_id: u64,
        knowledge_id: &str,
    ) -> Result<Vec<Fragment>, AppError>;

    async fn create_many(&self, fragments: &[Fragment]) -> Result<(), AppError>;

    async fn update_status(
        &self,
        tenant_id: u64,
        ids: &[String],
        status: FragmentStatus,
    ) -> Result<(), AppError>;

    async fn delete_many(&self, tenant_id: u64, ids: &[String]) -> Result<(), AppError>;

    async fn delete_by_knowledge_base(
        &self,
        tenant_id: u64,
        knowledge_base_id: &str,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn get(&self, tenant_id: u64, id: &str) -> Result<Option<Knowledge>, AppError>;

    /// Batch fetch; missing ids are silently absent from the result.
    async fn get_many(&self, tenant_id: u64, ids: &[String]) -> Result<Vec<Knowledge>, AppError>;

    async fn list_by_base(
        &self,
        tenant_id: u64,
        knowledge_base_id: &str,
    ) -> Result<Vec<Knowledge>, AppError>;

    async fn create(&self, knowledge: &Knowledge) -> Result<(), AppError>;

    async fn update_parse_status(
        &self,
        tenant_id: u64,
        id: &str,
        status: ParseStatus,
        error_message: Option<String>,
    ) -> Result<(), AppError>;

    async fn delete_many(&self, tenant_id: u64, ids: &[String]) -> Result<(), AppError>;
}

#[async_trait]
pub trait KnowledgeBaseRepository: Send + Sync {
    /// Returns the knowledge base even when soft-deleted; callers decide
    /// whether a tombstone is acceptable.
    async fn get(&self, tenant_id: u64, id: &str) -> Result<Option<KnowledgeBase>, AppError>;

    async fn list(&self, tenant_id: u64) -> Result<Vec<KnowledgeBase>, AppError>;

    async fn create(&self, knowledge_base: &KnowledgeBase) -> Result<(), AppError>;

    async fn update(&self, knowledge_base: &KnowledgeBase) -> Result<(), AppError>;

    async fn soft_delete(&self, tenant_id: u64, id: &str) -> Result<(), AppError>;

    async fn delete(&self, tenant_id: u64, id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<Tenant>, AppError>;

    /// Adjusts the tenant's storage accounting by `delta` bytes (may be
    /// negative).
    async fn adjust_storage(&self, id: u64, delta: i64) -> Result<(), AppError>;
}

/// Physical file storage for uploaded knowledge sources.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn delete(&self, path: &str) -> Result<(), AppError>;
}
