use std::sync::Arc;

use chrono::Utc;
use common::context::RequestContext;
use common::error::AppError;
use common::llm::ModelRegistry;
use common::model::{
    ChunkingConfig, ExtractConfig, FaqConfig, KnowledgeBase, KnowledgeBaseKind,
};
use common::repository::{
    FragmentRepository, KnowledgeBaseRepository, KnowledgeRepository, TenantRepository,
};
use common::task::{KnowledgeBaseDeletePayload, TaskQueue};
use tracing::{info, instrument};

use crate::composite::CompositeRetriever;

/// Orchestrates knowledge-base lifecycle and hybrid search.
///
/// All collaborators arrive through the constructor; nothing here is
/// process-global.
pub struct KnowledgeBaseService {
    pub(crate) knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    pub(crate) knowledges: Arc<dyn KnowledgeRepository>,
    pub(crate) fragments: Arc<dyn FragmentRepository>,
    pub(crate) tenants: Arc<dyn TenantRepository>,
    pub(crate) registry: Arc<ModelRegistry>,
    pub(crate) retriever: Arc<CompositeRetriever>,
    pub(crate) task_queue: Arc<dyn TaskQueue>,
}

#[derive(Debug, Clone)]
pub struct CreateKnowledgeBaseParams {
    pub name: String,
    pub description: String,
    pub kind: KnowledgeBaseKind,
    pub embedding_model_id: String,
    pub summary_model_id: String,
    pub chunking_config: Option<ChunkingConfig>,
    pub faq_config: Option<FaqConfig>,
    pub extract_config: Option<ExtractConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateKnowledgeBaseParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub embedding_model_id: Option<String>,
    pub faq_config: Option<FaqConfig>,
    pub extract_config: Option<ExtractConfig>,
}

impl KnowledgeBaseService {
    pub fn new(
        knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
        knowledges: Arc<dyn KnowledgeRepository>,
        fragments: Arc<dyn FragmentRepository>,
        tenants: Arc<dyn TenantRepository>,
        registry: Arc<ModelRegistry>,
        retriever: Arc<CompositeRetriever>,
        task_queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            knowledge_bases,
            knowledges,
            fragments,
            tenants,
            registry,
            retriever,
            task_queue,
        }
    }

    /// Load a live (non-tombstoned) knowledge base.
    pub(crate) async fn load_live(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<KnowledgeBase, AppError> {
        self.knowledge_bases
            .get(ctx.tenant_id, id)
            .await?
            .filter(|kb| !kb.deleted)
            .ok_or_else(|| AppError::NotFound(format!("knowledge base {id}")))
    }

    pub async fn create_knowledge_base(
        &self,
        ctx: &RequestContext,
        params: CreateKnowledgeBaseParams,
    ) -> Result<KnowledgeBase, AppError> {
        if params.name.trim().is_empty() {
            return Err(AppError::Validation("knowledge base name is empty".into()));
        }
        // Validates the embedding-model assignment against the registry.
        self.registry.embedder(&params.embedding_model_id)?;

        let mut knowledge_base = KnowledgeBase::new(
            ctx.tenant_id,
            params.name,
            params.kind,
            params.embedding_model_id,
            params.summary_model_id,
        );
        knowledge_base.description = params.description;
        if let Some(chunking) = params.chunking_config {
            knowledge_base.chunking_config = chunking;
        }
        if let Some(faq) = params.faq_config {
            knowledge_base.faq_config = Some(faq);
        }
        knowledge_base.extract_config = params.extract_config;

        self.knowledge_bases.create(&knowledge_base).await?;
        info!(knowledge_base_id = %knowledge_base.id, "created knowledge base");
        Ok(knowledge_base)
    }

    pub async fn get_knowledge_base(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<KnowledgeBase, AppError> {
        self.load_live(ctx, id).await
    }

    pub async fn list_knowledge_bases(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<KnowledgeBase>, AppError> {
        self.knowledge_bases.list(ctx.tenant_id).await
    }

    pub async fn update_knowledge_base(
        &self,
        ctx: &RequestContext,
        id: &str,
        params: UpdateKnowledgeBaseParams,
    ) -> Result<KnowledgeBase, AppError> {
        let mut knowledge_base = self.load_live(ctx, id).await?;

        if let Some(name) = params.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("knowledge base name is empty".into()));
            }
            knowledge_base.name = name;
        }
        if let Some(description) = params.description {
            knowledge_base.description = description;
        }
        if let Some(embedding_model_id) = params.embedding_model_id {
            self.registry.embedder(&embedding_model_id)?;
            knowledge_base.embedding_model_id = embedding_model_id;
        }
        if let Some(faq_config) = params.faq_config {
            knowledge_base.faq_config = Some(faq_config);
        }
        if let Some(extract_config) = params.extract_config {
            knowledge_base.extract_config = Some(extract_config);
        }
        knowledge_base.updated_at = Utc::now();

        self.knowledge_bases.update(&knowledge_base).await?;
        Ok(knowledge_base)
    }

    /// Clone a knowledge base's configuration into a fresh, empty one.
    pub async fn copy_knowledge_base(
        &self,
        ctx: &RequestContext,
        id: &str,
        new_name: &str,
    ) -> Result<KnowledgeBase, AppError> {
        if new_name.trim().is_empty() {
            return Err(AppError::Validation("knowledge base name is empty".into()));
        }
        let source = self.load_live(ctx, id).await?;
        let copy = source.copy_as(new_name);
        self.knowledge_bases.create(&copy).await?;
        info!(source = %source.id, copy = %copy.id, "copied knowledge base");
        Ok(copy)
    }

    /// Soft-delete synchronously, then hand the heavy cleanup to the durable
    /// queue. Once the enqueue succeeds the caller never sees a failure from
    /// the purge itself.
    #[instrument(skip(self, ctx), fields(tenant_id = ctx.tenant_id))]
    pub async fn delete_knowledge_base(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<(), AppError> {
        let knowledge_base = self
            .knowledge_bases
            .get(ctx.tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("knowledge base {id}")))?;

        let tenant = self
            .tenants
            .get(ctx.tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant {}", ctx.tenant_id)))?;

        self.knowledge_bases
            .soft_delete(ctx.tenant_id, &knowledge_base.id)
            .await?;

        let payload = KnowledgeBaseDeletePayload {
            tenant_id: ctx.tenant_id,
            knowledge_base_id: knowledge_base.id.clone(),
            effective_engines: tenant
                .enabled_retrievers
                .iter()
                .map(ToString::to_string)
                .collect(),
        };
        self.task_queue.enqueue(payload.into_envelope()?).await?;
        info!(knowledge_base_id = %knowledge_base.id, "knowledge base soft-deleted, purge enqueued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mem::{
        InMemoryFragmentRepository, InMemoryKnowledgeBaseRepository, InMemoryKnowledgeRepository,
        InMemoryTaskQueue, InMemoryTenantRepository, StaticEmbedder, StaticRetriever,
    };
    use common::model::Tenant;
    use common::retrieve::RetrieverType;
    use common::task::{KNOWLEDGE_BASE_DELETE_TASK, LOW_PRIORITY_QUEUE};

    struct Fixture {
        service: KnowledgeBaseService,
        task_queue: Arc<InMemoryTaskQueue>,
        bases: Arc<InMemoryKnowledgeBaseRepository>,
    }

    async fn fixture() -> Fixture {
        let bases = Arc::new(InMemoryKnowledgeBaseRepository::new());
        let tenants = Arc::new(InMemoryTenantRepository::new());
        tenants.insert(Tenant::new(1, "acme")).await;
        let task_queue = Arc::new(InMemoryTaskQueue::new());
        let registry = Arc::new(
            ModelRegistry::builder()
                .with_embedder(Arc::new(StaticEmbedder::new("embed-small", 8)))
                .build(),
        );
        let retriever = Arc::new(CompositeRetriever::new(vec![Arc::new(
            StaticRetriever::new(RetrieverType::Vector),
        )]));

        let service = KnowledgeBaseService::new(
            Arc::clone(&bases) as Arc<dyn KnowledgeBaseRepository>,
            Arc::new(InMemoryKnowledgeRepository::new()),
            Arc::new(InMemoryFragmentRepository::new()),
            tenants,
            registry,
            retriever,
            Arc::clone(&task_queue) as Arc<dyn TaskQueue>,
        );

        Fixture {
            service,
            task_queue,
            bases,
        }
    }

    fn create_params(name: &str) -> CreateKnowledgeBaseParams {
        CreateKnowledgeBaseParams {
            name: name.into(),
            description: "docs".into(),
            kind: KnowledgeBaseKind::Document,
            embedding_model_id: "embed-small".into(),
            summary_model_id: "chat-small".into(),
            chunking_config: None,
            faq_config: None,
            extract_config: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_embedding_model() {
        let fixture = fixture().await;
        let ctx = RequestContext::new(1);

        let mut params = create_params("kb");
        params.embedding_model_id = "missing-model".into();

        let result = fixture.service.create_knowledge_base(&ctx, params).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn copy_clones_configuration_under_a_fresh_id() {
        let fixture = fixture().await;
        let ctx = RequestContext::new(1);

        let mut params = create_params("source");
        params.faq_config = Some(FaqConfig {
            direct_answer_threshold: 0.8,
        });
        let source = fixture
            .service
            .create_knowledge_base(&ctx, params)
            .await
            .expect("create");

        let copy = fixture
            .service
            .copy_knowledge_base(&ctx, &source.id, "copy")
            .await
            .expect("copy");

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.name, "copy");
        assert_eq!(copy.embedding_model_id, source.embedding_model_id);
        assert_eq!(copy.faq_config, source.faq_config);

        let listed = fixture.service.list_knowledge_bases(&ctx).await.expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn delete_soft_deletes_and_enqueues_low_priority_purge() {
        let fixture = fixture().await;
        let ctx = RequestContext::new(1);

        let created = fixture
            .service
            .create_knowledge_base(&ctx, create_params("kb"))
            .await
            .expect("create");

        fixture
            .service
            .delete_knowledge_base(&ctx, &created.id)
            .await
            .expect("delete");

        // Tombstoned immediately; invisible to readers.
        let lookup = fixture.service.get_knowledge_base(&ctx, &created.id).await;
        assert!(matches!(lookup, Err(AppError::NotFound(_))));
        let raw = fixture
            .bases
            .get(1, &created.id)
            .await
            .expect("repo get")
            .expect("still stored");
        assert!(raw.deleted);

        let tasks = fixture.task_queue.drain().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, KNOWLEDGE_BASE_DELETE_TASK);
        assert_eq!(tasks[0].queue, LOW_PRIORITY_QUEUE);
        let payload: KnowledgeBaseDeletePayload = tasks[0].decode().expect("payload");
        assert_eq!(payload.knowledge_base_id, created.id);
        assert!(payload.effective_engines.contains(&"vector".to_string()));
    }

    #[tokio::test]
    async fn update_validates_replacement_embedding_model() {
        let fixture = fixture().await;
        let ctx = RequestContext::new(1);
        let created = fixture
            .service
            .create_knowledge_base(&ctx, create_params("kb"))
            .await
            .expect("create");

        let result = fixture
            .service
            .update_knowledge_base(
                &ctx,
                &created.id,
                UpdateKnowledgeBaseParams {
                    embedding_model_id: Some("nope".into()),
                    ..UpdateKnowledgeBaseParams::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
