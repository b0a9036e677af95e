use std::sync::Arc;

use common::context::RequestContext;
use common::error::AppError;
use common::llm::Embedder;
use common::model::KnowledgeType;
use common::retrieve::{IndexInfo, RankedHit, Retriever, RetrieveParams, RetrieverType};
use futures::future::join_all;
use tracing::{debug, instrument};

/// One retriever's ranked output, tagged with its origin.
#[derive(Debug, Clone)]
pub struct RetrievedList {
    pub retriever_type: RetrieverType,
    pub engine: String,
    pub hits: Vec<RankedHit>,
}

/// Fan-out over the enabled retrievers.
///
/// Dispatch preserves caller param order in the returned lists; scores stay
/// retriever-native and are not comparable across lists.
pub struct CompositeRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
}

impl CompositeRetriever {
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>) -> Self {
        Self { retrievers }
    }

    pub fn supports(&self, retriever_type: RetrieverType) -> bool {
        self.retriever_for(retriever_type).is_some()
    }

    fn retriever_for(&self, retriever_type: RetrieverType) -> Option<&Arc<dyn Retriever>> {
        self.retrievers
            .iter()
            .find(|r| r.retriever_type() == retriever_type)
    }

    /// Dispatch each param to its retriever concurrently. Fails with a single
    /// aggregated error when any retriever fails; partial results are never
    /// returned.
    #[instrument(skip_all, fields(params = params.len()))]
    pub async fn retrieve(
        &self,
        ctx: &RequestContext,
        params: &[RetrieveParams],
    ) -> Result<Vec<RetrievedList>, AppError> {
        ctx.ensure_active()?;

        let dispatches = params.iter().map(|param| async move {
            let retriever = self.retriever_for(param.retriever_type).ok_or_else(|| {
                AppError::Validation(format!(
                    "no {} retriever configured",
                    param.retriever_type
                ))
            })?;
            let hits = retriever.retrieve(param).await?;
            Ok::<RetrievedList, AppError>(RetrievedList {
                retriever_type: param.retriever_type,
                engine: retriever.engine().to_string(),
                hits,
            })
        });

        let outcomes = join_all(dispatches).await;

        let mut lists = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(list) => lists.push(list),
                Err(err) => failures.push(err.to_string()),
            }
        }

        if !failures.is_empty() {
            return Err(AppError::Dependency(format!(
                "retrieval failed: {}",
                failures.join("; ")
            )));
        }

        debug!(
            lists = lists.len(),
            hits = lists.iter().map(|l| l.hits.len()).sum::<usize>(),
            "composite retrieval complete"
        );
        Ok(lists)
    }

    /// Embed fragment contents once and index them into every retriever.
    /// Keyword retrievers receive no vectors.
    pub async fn batch_index(
        &self,
        embedder: &Arc<dyn Embedder>,
        infos: &[IndexInfo],
    ) -> Result<(), AppError> {
        if infos.is_empty() {
            return Ok(());
        }

        let no_vectors: Vec<Option<Vec<f32>>> = vec![None; infos.len()];
        let vectors: Vec<Option<Vec<f32>>> = if self.supports(RetrieverType::Vector) {
            let texts: Vec<String> = infos.iter().map(|info| info.content.clone()).collect();
            embedder
                .batch_embed(&texts)
                .await
                .map_err(|e| AppError::dependency("embedder", e))?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            no_vectors.clone()
        };

        for retriever in &self.retrievers {
            let paired = match retriever.retriever_type() {
                RetrieverType::Vector => &vectors,
                RetrieverType::Keyword => &no_vectors,
            };
            retriever.index(infos, paired).await?;
        }
        Ok(())
    }

    pub async fn delete_by_knowledge_id_list(
        &self,
        knowledge_ids: &[String],
        dimensions: usize,
        knowledge_type: KnowledgeType,
    ) -> Result<(), AppError> {
        if knowledge_ids.is_empty() {
            return Err(AppError::Validation("empty knowledge id list".into()));
        }
        for retriever in &self.retrievers {
            retriever
                .delete_by_knowledge_id_list(knowledge_ids, dimensions, knowledge_type)
                .await?;
        }
        Ok(())
    }

    pub async fn delete_by_source_id_list(
        &self,
        source_ids: &[String],
        dimensions: usize,
        knowledge_type: KnowledgeType,
    ) -> Result<(), AppError> {
        if source_ids.is_empty() {
            return Err(AppError::Validation("empty source id list".into()));
        }
        for retriever in &self.retrievers {
            retriever
                .delete_by_source_id_list(source_ids, dimensions, knowledge_type)
                .await?;
        }
        Ok(())
    }
}
