use common::context::RequestContext;
use common::error::AppError;
use common::model::KnowledgeType;
use common::retrieve::{RetrieveParams, RetrieverType};
use tracing::{debug, info, instrument};

use crate::enrich::process_search_results;
use crate::faq::{filter_negative_questions, iterative_faq_retrieval};
use crate::fusion::{fuse_hits, partition_hits};
use crate::service::KnowledgeBaseService;
use crate::SearchResult;

/// How far past `match_count` each retriever is asked to look.
const OVER_FETCH_FACTOR: usize = 3;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query_text: String,
    pub match_count: usize,
    pub vector_threshold: f64,
    pub keyword_threshold: f64,
    pub disable_vector: bool,
    pub disable_keyword: bool,
    pub knowledge_ids: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
}

impl SearchParams {
    pub fn new(query_text: impl Into<String>, match_count: usize) -> Self {
        Self {
            query_text: query_text.into(),
            match_count,
            vector_threshold: 0.0,
            keyword_threshold: 0.0,
            disable_vector: false,
            disable_keyword: false,
            knowledge_ids: None,
            tag_ids: None,
        }
    }
}

impl KnowledgeBaseService {
    /// Hybrid search over one knowledge base.
    ///
    /// Runs the enabled retrievers in parallel with a 3x over-fetch, fuses
    /// the ranked lists (RRF when both modalities contribute, native-score
    /// passthrough when only vector does), applies FAQ-specific filtering,
    /// truncates to `match_count` and enriches the survivors with their
    /// structural relatives.
    #[instrument(skip(self, ctx, params), fields(tenant_id = ctx.tenant_id, query_chars = params.query_text.chars().count()))]
    pub async fn hybrid_search(
        &self,
        ctx: &RequestContext,
        knowledge_base_id: &str,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, AppError> {
        let knowledge_base = self.load_live(ctx, knowledge_base_id).await?;

        if params.match_count == 0 {
            return Ok(Vec::new());
        }

        let tenant = self
            .tenants
            .get(ctx.tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant {}", ctx.tenant_id)))?;

        let enabled: Vec<RetrieverType> = [RetrieverType::Vector, RetrieverType::Keyword]
            .into_iter()
            .filter(|rt| tenant.has_retriever(*rt))
            .filter(|rt| self.retriever.supports(*rt))
            .filter(|rt| match rt {
                RetrieverType::Vector => !params.disable_vector,
                RetrieverType::Keyword => !params.disable_keyword,
            })
            .collect();

        if enabled.is_empty() {
            return Err(AppError::Validation(
                "no retrievers enabled for this search".into(),
            ));
        }

        let over_fetch = OVER_FETCH_FACTOR * params.match_count;
        let retrieve_params = self
            .build_retrieve_params(&knowledge_base, params, &enabled, over_fetch)
            .await?;

        let lists = self.retriever.retrieve(ctx, &retrieve_params).await?;
        let (vector_hits, keyword_hits) = partition_hits(lists);
        debug!(
            vector_hits = vector_hits.len(),
            keyword_hits = keyword_hits.len(),
            "retrieval candidate counts"
        );

        let mut fused = fuse_hits(&vector_hits, &keyword_hits);

        if knowledge_base.is_faq() {
            fused =
                filter_negative_questions(ctx, &self.fragments, &params.query_text, fused).await?;

            // The over-fetch limit binding is the signal that more results
            // may remain below the current cut.
            let limit_bound = vector_hits.len() == over_fetch;
            if fused.len() < params.match_count && limit_bound {
                fused = iterative_faq_retrieval(
                    ctx,
                    &self.retriever,
                    &self.fragments,
                    &retrieve_params,
                    &params.query_text,
                    params.match_count,
                )
                .await?;
            }
        }

        fused.truncate(params.match_count);
        info!(primary_hits = fused.len(), "fused retrieval complete");

        process_search_results(ctx, &self.fragments, &self.knowledges, &fused).await
    }

    async fn build_retrieve_params(
        &self,
        knowledge_base: &common::model::KnowledgeBase,
        params: &SearchParams,
        enabled: &[RetrieverType],
        over_fetch: usize,
    ) -> Result<Vec<RetrieveParams>, AppError> {
        let knowledge_type = knowledge_base.is_faq().then_some(KnowledgeType::Faq);

        let mut retrieve_params = Vec::with_capacity(enabled.len());
        for retriever_type in enabled {
            let (query_vector, threshold) = match retriever_type {
                RetrieverType::Vector => {
                    let embedder = self.registry.embedder(&knowledge_base.embedding_model_id)?;
                    let vector = embedder
                        .embed(&params.query_text)
                        .await
                        .map_err(|e| AppError::dependency("embedder", e))?;
                    (Some(vector), params.vector_threshold)
                }
                RetrieverType::Keyword => (None, params.keyword_threshold),
            };

            retrieve_params.push(RetrieveParams {
                retriever_type: *retriever_type,
                query_text: params.query_text.clone(),
                query_vector,
                knowledge_base_id: knowledge_base.id.clone(),
                knowledge_ids: params.knowledge_ids.clone(),
                knowledge_type,
                top_k: over_fetch,
                threshold,
            });
        }
        Ok(retrieve_params)
    }
}
