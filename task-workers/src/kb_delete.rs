use std::collections::HashMap;
use std::sync::Arc;

use common::error::AppError;
use common::graph_store::{GraphNamespace, GraphStore};
use common::llm::ModelRegistry;
use common::model::{Knowledge, KnowledgeType};
use common::repository::{
    FileStore, FragmentRepository, KnowledgeRepository, TenantRepository,
};
use common::task::KnowledgeBaseDeletePayload;
use retrieval_pipeline::CompositeRetriever;
use tracing::{info, instrument, warn};

/// Worker for `kb.delete`: purges everything downstream of a soft-deleted
/// knowledge base.
///
/// Sub-steps degrade independently; only the final knowledge-row delete
/// decides whether the task succeeds, so a partially failed run is retried
/// by the queue and every step tolerates re-execution.
pub struct KnowledgeBaseDeleteHandler {
    knowledges: Arc<dyn KnowledgeRepository>,
    fragments: Arc<dyn FragmentRepository>,
    tenants: Arc<dyn TenantRepository>,
    files: Arc<dyn FileStore>,
    registry: Arc<ModelRegistry>,
    retriever: Arc<CompositeRetriever>,
    graph_store: Arc<dyn GraphStore>,
}

impl KnowledgeBaseDeleteHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        knowledges: Arc<dyn KnowledgeRepository>,
        fragments: Arc<dyn FragmentRepository>,
        tenants: Arc<dyn TenantRepository>,
        files: Arc<dyn FileStore>,
        registry: Arc<ModelRegistry>,
        retriever: Arc<CompositeRetriever>,
        graph_store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            knowledges,
            fragments,
            tenants,
            files,
            registry,
            retriever,
            graph_store,
        }
    }

    #[instrument(skip(self, payload), fields(tenant_id = payload.tenant_id, knowledge_base_id = %payload.knowledge_base_id))]
    pub async fn handle(&self, payload: &KnowledgeBaseDeletePayload) -> Result<(), AppError> {
        let knowledges = self
            .knowledges
            .list_by_base(payload.tenant_id, &payload.knowledge_base_id)
            .await?;
        if knowledges.is_empty() {
            info!("no knowledges left, purge already complete");
            return Ok(());
        }

        self.purge_index_entries(payload, &knowledges).await;

        if let Err(err) = self
            .fragments
            .delete_by_knowledge_base(payload.tenant_id, &payload.knowledge_base_id)
            .await
        {
            warn!(error = %err, "fragment purge failed");
        }

        for knowledge in &knowledges {
            if knowledge.file_path.is_empty() {
                continue;
            }
            if let Err(err) = self.files.delete(&knowledge.file_path).await {
                warn!(error = %err, path = %knowledge.file_path, "file delete failed");
            }
        }

        let reclaimed: i64 = knowledges.iter().map(|k| k.storage_size as i64).sum();
        if reclaimed > 0 {
            if let Err(err) = self
                .tenants
                .adjust_storage(payload.tenant_id, -reclaimed)
                .await
            {
                warn!(error = %err, "tenant storage adjustment failed");
            }
        }

        let namespaces: Vec<GraphNamespace> = knowledges
            .iter()
            .map(|knowledge| GraphNamespace {
                knowledge_base_id: payload.knowledge_base_id.clone(),
                knowledge_id: knowledge.id.clone(),
            })
            .collect();
        if let Err(err) = self.graph_store.delete_by_namespaces(&namespaces).await {
            warn!(error = %err, "graph namespace delete failed");
        }

        // The one step allowed to fail the task: losing the knowledge rows
        // would strand the next retry without a work list.
        let knowledge_ids: Vec<String> = knowledges.iter().map(|k| k.id.clone()).collect();
        self.knowledges
            .delete_many(payload.tenant_id, &knowledge_ids)
            .await?;

        info!(
            knowledges = knowledge_ids.len(),
            reclaimed_bytes = reclaimed,
            "knowledge base purge complete"
        );
        Ok(())
    }

    /// Bulk-delete index entries grouped by `(embedding_model_id, type)`,
    /// matching how vector records are partitioned.
    async fn purge_index_entries(
        &self,
        payload: &KnowledgeBaseDeletePayload,
        knowledges: &[Knowledge],
    ) {
        let mut groups: HashMap<(String, KnowledgeType), Vec<String>> = HashMap::new();
        for knowledge in knowledges {
            groups
                .entry((
                    knowledge.embedding_model_id.clone(),
                    knowledge.knowledge_type,
                ))
                .or_default()
                .push(knowledge.id.clone());
        }

        for ((embedding_model_id, knowledge_type), knowledge_ids) in groups {
            let dimensions = match self.registry.embedder(&embedding_model_id) {
                Ok(embedder) => embedder.dimensions(),
                Err(err) => {
                    warn!(
                        error = %err,
                        model = %embedding_model_id,
                        "embedder lookup failed, skipping index purge group"
                    );
                    continue;
                }
            };
            if let Err(err) = self
                .retriever
                .delete_by_knowledge_id_list(&knowledge_ids, dimensions, knowledge_type)
                .await
            {
                warn!(
                    error = %err,
                    model = %embedding_model_id,
                    "index purge failed for group"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mem::{
        InMemoryFileStore, InMemoryFragmentRepository, InMemoryGraphStore,
        InMemoryKnowledgeRepository, InMemoryTenantRepository, StaticEmbedder, StaticRetriever,
    };
    use common::graph_store::ExtractedGraph;
    use common::model::{ChunkType, Fragment, Tenant};
    use common::retrieve::RetrieverType;

    struct Fixture {
        handler: KnowledgeBaseDeleteHandler,
        knowledges: Arc<InMemoryKnowledgeRepository>,
        fragments: Arc<InMemoryFragmentRepository>,
        tenants: Arc<InMemoryTenantRepository>,
        files: Arc<InMemoryFileStore>,
        graph_store: Arc<InMemoryGraphStore>,
        vector: Arc<StaticRetriever>,
    }

    fn fixture() -> Fixture {
        let knowledges = Arc::new(InMemoryKnowledgeRepository::new());
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        let tenants = Arc::new(InMemoryTenantRepository::new());
        let files = Arc::new(InMemoryFileStore::new());
        let graph_store = Arc::new(InMemoryGraphStore::new());
        let vector = Arc::new(StaticRetriever::new(RetrieverType::Vector));
        let registry = Arc::new(
            ModelRegistry::builder()
                .with_embedder(Arc::new(StaticEmbedder::new("embed-small", 16)))
                .build(),
        );
        let retriever = Arc::new(CompositeRetriever::new(vec![
            Arc::clone(&vector) as Arc<dyn common::retrieve::Retriever>
        ]));

        let handler = KnowledgeBaseDeleteHandler::new(
            Arc::clone(&knowledges) as Arc<dyn KnowledgeRepository>,
            Arc::clone(&fragments) as Arc<dyn FragmentRepository>,
            Arc::clone(&tenants) as Arc<dyn TenantRepository>,
            Arc::clone(&files) as Arc<dyn FileStore>,
            registry,
            retriever,
            Arc::clone(&graph_store) as Arc<dyn GraphStore>,
        );

        Fixture {
            handler,
            knowledges,
            fragments,
            tenants,
            files,
            graph_store,
            vector,
        }
    }

    async fn seed(fixture: &Fixture) -> KnowledgeBaseDeletePayload {
        let mut tenant = Tenant::new(1, "acme");
        tenant.storage_used = 5_000;
        fixture.tenants.insert(tenant).await;

        let mut text = Knowledge::new(1, "kb-1", "Doc", KnowledgeType::Text, "embed-small")
            .with_file("doc.md", "md", "/data/doc.md", 1_200);
        text.id = "know-text".into();
        let mut table = Knowledge::new(1, "kb-1", "Table", KnowledgeType::Table, "embed-small")
            .with_file("rows.csv", "csv", "/data/rows.csv", 800);
        table.id = "know-table".into();
        fixture.knowledges.insert(text).await;
        fixture.knowledges.insert(table).await;

        for (i, knowledge_id) in [
            "know-text",
            "know-text",
            "know-text",
            "know-table",
            "know-table",
        ]
        .iter()
        .enumerate()
        {
            let mut fragment =
                Fragment::new(1, *knowledge_id, "kb-1", "content", i as i32, ChunkType::Text);
            fragment.id = format!("frag-{i}");
            fixture.fragments.insert(fragment).await;
        }

        for knowledge_id in ["know-text", "know-table"] {
            fixture
                .graph_store
                .add_graph(
                    &GraphNamespace {
                        knowledge_base_id: "kb-1".into(),
                        knowledge_id: knowledge_id.to_string(),
                    },
                    &ExtractedGraph::default(),
                )
                .await
                .expect("seed graph");
        }

        KnowledgeBaseDeletePayload {
            tenant_id: 1,
            knowledge_base_id: "kb-1".into(),
            effective_engines: vec!["vector".into()],
        }
    }

    #[tokio::test]
    async fn purges_indexes_fragments_files_storage_and_graph() {
        let fixture = fixture();
        let payload = seed(&fixture).await;

        fixture.handler.handle(&payload).await.expect("handle");

        // One bulk delete per (embedding model, knowledge type) group.
        let deletes = fixture.vector.knowledge_deletes().await;
        assert_eq!(deletes.len(), 2);
        for (ids, dimensions, _) in &deletes {
            assert_eq!(*dimensions, 16);
            assert!(!ids.is_empty());
        }
        let kinds: Vec<KnowledgeType> = deletes.iter().map(|(_, _, t)| *t).collect();
        assert!(kinds.contains(&KnowledgeType::Text));
        assert!(kinds.contains(&KnowledgeType::Table));

        assert!(fixture.fragments.is_empty().await);

        let mut deleted_files = fixture.files.deleted_paths().await;
        deleted_files.sort();
        assert_eq!(deleted_files, vec!["/data/doc.md", "/data/rows.csv"]);

        assert_eq!(fixture.tenants.storage_used(1).await, 3_000);
        assert!(fixture.graph_store.namespaces().await.is_empty());
        assert_eq!(fixture.knowledges.len().await, 0);
    }

    #[tokio::test]
    async fn rerunning_on_an_already_purged_base_is_a_no_op_success() {
        let fixture = fixture();
        let payload = seed(&fixture).await;

        fixture.handler.handle(&payload).await.expect("first run");
        fixture.handler.handle(&payload).await.expect("second run");

        assert_eq!(fixture.knowledges.len().await, 0);
        // No further index deletes were issued on the empty rerun.
        assert_eq!(fixture.vector.knowledge_deletes().await.len(), 2);
    }
}
