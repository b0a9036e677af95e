use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::model::{
    Fragment, FragmentStatus, Knowledge, KnowledgeBase, ParseStatus, Tenant,
};
use crate::repository::{
    FileStore, FragmentRepository, KnowledgeBaseRepository, KnowledgeRepository, TenantRepository,
};

type Key = (u64, String);

#[derive(Default)]
pub struct InMemoryFragmentRepository {
    fragments: RwLock<HashMap<Key, Fragment>>,
}

impl InMemoryFragmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, fragment: Fragment) {
        self.fragments
            .write()
            .await
            .insert((fragment.tenant_id, fragment.id.clone()), fragment);
    }

    pub async fn len(&self) -> usize {
        self.fragments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.fragments.read().await.is_empty()
    }
}

#[async_trait]
impl FragmentRepository for InMemoryFragmentRepository {
    async fn get(&self, tenant_id: u64, id: &str) -> Result<Option<Fragment>, AppError> {
        Ok(self
            .fragments
            .read()
            .await
            .get(&(tenant_id, id.to_string()))
            .cloned())
    }

    async fn get_many(&self, tenant_id: u64, ids: &[String]) -> Result<Vec<Fragment>, AppError> {
        let fragments = self.fragments.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| fragments.get(&(tenant_id, id.clone())).cloned())
            .collect())
    }

    async fn list_by_knowledge(
        &self,
        tenant_id: u64,
        knowledge_id: &str,
    ) -> Result<Vec<Fragment>, AppError> {
        let fragments = self.fragments.read().await;
        let mut matching: Vec<Fragment> = fragments
            .values()
            .filter(|f| f.tenant_id == tenant_id && f.knowledge_id == knowledge_id)
            .cloned()
            .collect();
        matching.sort_by_key(|f| f.chunk_index);
        Ok(matching)
    }

    async fn create_many(&self, new_fragments: &[Fragment]) -> Result<(), AppError> {
        let mut fragments = self.fragments.write().await;
        for fragment in new_fragments {
            fragments.insert((fragment.tenant_id, fragment.id.clone()), fragment.clone());
        }
        Ok(())
    }

    async fn update_status(
        &self,
        tenant_id: u64,
        ids: &[String],
        status: FragmentStatus,
    ) -> Result<(), AppError> {
        let mut fragments = self.fragments.write().await;
        for id in ids {
            if let Some(fragment) = fragments.get_mut(&(tenant_id, id.clone())) {
                fragment.status = status;
            }
        }
        Ok(())
    }

    async fn delete_many(&self, tenant_id: u64, ids: &[String]) -> Result<(), AppError> {
        let mut fragments = self.fragments.write().await;
        for id in ids {
            fragments.remove(&(tenant_id, id.clone()));
        }
        Ok(())
    }

    async fn delete_by_knowledge_base(
        &self,
        tenant_id: u64,
        knowledge_base_id: &str,
    ) -> Result<(), AppError> {
        self.fragments
            .write()
            .await
            .retain(|_, f| !(f.tenant_id == tenant_id && f.knowledge_base_id == knowledge_base_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeRepository {
    knowledges: RwLock<HashMap<Key, Knowledge>>,
}

impl InMemoryKnowledgeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, knowledge: Knowledge) {
        self.knowledges
            .write()
            .await
            .insert((knowledge.tenant_id, knowledge.id.clone()), knowledge);
    }

    pub async fn len(&self) -> usize {
        self.knowledges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.knowledges.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    async fn get(&self, tenant_id: u64, id: &str) -> Result<Option<Knowledge>, AppError> {
        Ok(self
            .knowledges
            .read()
            .await
            .get(&(tenant_id, id.to_string()))
            .cloned())
    }

    async fn get_many(&self, tenant_id: u64, ids: &[String]) -> Result<Vec<Knowledge>, AppError> {
        let knowledges = self.knowledges.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| knowledges.get(&(tenant_id, id.clone())).cloned())
            .collect())
    }

    async fn list_by_base(
        &self,
        tenant_id: u64,
        knowledge_base_id: &str,
    ) -> Result<Vec<Knowledge>, AppError> {
        let knowledges = self.knowledges.read().await;
        let mut matching: Vec<Knowledge> = knowledges
            .values()
            .filter(|k| k.tenant_id == tenant_id && k.knowledge_base_id == knowledge_base_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn create(&self, knowledge: &Knowledge) -> Result<(), AppError> {
        self.insert(knowledge.clone()).await;
        Ok(())
    }

    async fn update_parse_status(
        &self,
        tenant_id: u64,
        id: &str,
        status: ParseStatus,
        error_message: Option<String>,
    ) -> Result<(), AppError> {
        let mut knowledges = self.knowledges.write().await;
        if let Some(knowledge) = knowledges.get_mut(&(tenant_id, id.to_string())) {
            knowledge.parse_status = status;
            knowledge.error_message = error_message;
        }
        Ok(())
    }

    async fn delete_many(&self, tenant_id: u64, ids: &[String]) -> Result<(), AppError> {
        let mut knowledges = self.knowledges.write().await;
        for id in ids {
            knowledges.remove(&(tenant_id, id.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeBaseRepository {
    bases: RwLock<HashMap<Key, KnowledgeBase>>,
}

impl InMemoryKnowledgeBaseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, base: KnowledgeBase) {
        self.bases
            .write()
            .await
            .insert((base.tenant_id, base.id.clone()), base);
    }
}

#[async_trait]
impl KnowledgeBaseRepository for InMemoryKnowledgeBaseRepository {
    async fn get(&self, tenant_id: u64, id: &str) -> Result<Option<KnowledgeBase>, AppError> {
        Ok(self
            .bases
            .read()
            .await
            .get(&(tenant_id, id.to_string()))
            .cloned())
    }

    async fn list(&self, tenant_id: u64) -> Result<Vec<KnowledgeBase>, AppError> {
        let bases = self.bases.read().await;
        let mut matching: Vec<KnowledgeBase> = bases
            .values()
            .filter(|b| b.tenant_id == tenant_id && !b.deleted)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn create(&self, knowledge_base: &KnowledgeBase) -> Result<(), AppError> {
        self.insert(knowledge_base.clone()).await;
        Ok(())
    }

    async fn update(&self, knowledge_base: &KnowledgeBase) -> Result<(), AppError> {
        self.insert(knowledge_base.clone()).await;
        Ok(())
    }

    async fn soft_delete(&self, tenant_id: u64, id: &str) -> Result<(), AppError> {
        let mut bases = self.bases.write().await;
        if let Some(base) = bases.get_mut(&(tenant_id, id.to_string())) {
            base.deleted = true;
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: u64, id: &str) -> Result<(), AppError> {
        self.bases.write().await.remove(&(tenant_id, id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<u64, Tenant>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.id, tenant);
    }

    pub async fn storage_used(&self, id: u64) -> i64 {
        self.tenants
            .read()
            .await
            .get(&id)
            .map_or(0, |t| t.storage_used)
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn get(&self, id: u64) -> Result<Option<Tenant>, AppError> {
        Ok(self.tenants.read().await.get(&id).cloned())
    }

    async fn adjust_storage(&self, id: u64, delta: i64) -> Result<(), AppError> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("tenant {id}")))?;
        tenant.storage_used += delta;
        Ok(())
    }
}

/// Records deletions so tests can assert on physical file cleanup.
#[derive(Default)]
pub struct InMemoryFileStore {
    deleted: RwLock<Vec<String>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deleted_paths(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn delete(&self, path: &str) -> Result<(), AppError> {
        self.deleted.write().await.push(path.to_string());
        Ok(())
    }
}
