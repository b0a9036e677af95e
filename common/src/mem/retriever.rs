use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::model::KnowledgeType;
use crate::retrieve::{IndexInfo, MatchType, RankedHit, Retriever, RetrieveParams, RetrieverType};

/// Retriever serving a fixed ranked list, recording every call for
/// assertions. Honors `top_k` and `threshold` so paging behavior is
/// observable in tests.
pub struct StaticRetriever {
    retriever_type: RetrieverType,
    engine: String,
    hits: RwLock<Vec<RankedHit>>,
    fail: bool,
    retrieve_calls: RwLock<Vec<RetrieveParams>>,
    indexed: RwLock<Vec<IndexInfo>>,
    knowledge_deletes: RwLock<Vec<(Vec<String>, usize, KnowledgeType)>>,
    source_deletes: RwLock<Vec<(Vec<String>, usize, KnowledgeType)>>,
}

impl StaticRetriever {
    pub fn new(retriever_type: RetrieverType) -> Self {
        Self {
            retriever_type,
            engine: "memory".to_string(),
            hits: RwLock::new(Vec::new()),
            fail: false,
            retrieve_calls: RwLock::new(Vec::new()),
            indexed: RwLock::new(Vec::new()),
            knowledge_deletes: RwLock::new(Vec::new()),
            source_deletes: RwLock::new(Vec::new()),
        }
    }

    pub fn failing(retriever_type: RetrieverType) -> Self {
        Self {
            fail: true,
            ..Self::new(retriever_type)
        }
    }

    /// Replace the served ranked list; scores should arrive sorted
    /// descending, the way a live engine returns them.
    pub fn with_hits(self, hits: Vec<(&str, &str, f64)>) -> Self {
        let match_type = match self.retriever_type {
            RetrieverType::Vector => MatchType::Vector,
            RetrieverType::Keyword => MatchType::Keyword,
        };
        let ranked = hits
            .into_iter()
            .map(|(chunk_id, knowledge_id, score)| RankedHit {
                chunk_id: chunk_id.to_string(),
                knowledge_id: knowledge_id.to_string(),
                score,
                match_type,
            })
            .collect();
        Self {
            hits: RwLock::new(ranked),
            ..self
        }
    }

    pub async fn set_hits(&self, hits: Vec<RankedHit>) {
        *self.hits.write().await = hits;
    }

    pub async fn retrieve_calls(&self) -> Vec<RetrieveParams> {
        self.retrieve_calls.read().await.clone()
    }

    pub async fn indexed(&self) -> Vec<IndexInfo> {
        self.indexed.read().await.clone()
    }

    pub async fn knowledge_deletes(&self) -> Vec<(Vec<String>, usize, KnowledgeType)> {
        self.knowledge_deletes.read().await.clone()
    }

    pub async fn source_deletes(&self) -> Vec<(Vec<String>, usize, KnowledgeType)> {
        self.source_deletes.read().await.clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn retriever_type(&self) -> RetrieverType {
        self.retriever_type
    }

    fn engine(&self) -> &str {
        &self.engine
    }

    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RankedHit>, AppError> {
        self.retrieve_calls.write().await.push(params.clone());
        if self.fail {
            return Err(AppError::Dependency(format!(
                "{} retriever unavailable",
                self.retriever_type
            )));
        }
        let hits = self.hits.read().await;
        Ok(hits
            .iter()
            .filter(|hit| hit.score >= params.threshold)
            .take(params.top_k)
            .cloned()
            .collect())
    }

    async fn index(
        &self,
        infos: &[IndexInfo],
        _vectors: &[Option<Vec<f32>>],
    ) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Dependency(format!(
                "{} index unavailable",
                self.retriever_type
            )));
        }
        self.indexed.write().await.extend_from_slice(infos);
        Ok(())
    }

    async fn delete_by_knowledge_id_list(
        &self,
        knowledge_ids: &[String],
        dimensions: usize,
        knowledge_type: KnowledgeType,
    ) -> Result<(), AppError> {
        self.knowledge_deletes.write().await.push((
            knowledge_ids.to_vec(),
            dimensions,
            knowledge_type,
        ));
        Ok(())
    }

    async fn delete_by_source_id_list(
        &self,
        source_ids: &[String],
        dimensions: usize,
        knowledge_type: KnowledgeType,
    ) -> Result<(), AppError> {
        self.source_deletes
            .write()
            .await
            .push((source_ids.to_vec(), dimensions, knowledge_type));
        Ok(())
    }
}
