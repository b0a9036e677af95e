use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::context::RequestContext;
use common::error::AppError;
use common::model::Fragment;
use common::repository::FragmentRepository;
use common::retrieve::{RankedHit, RetrieveParams};
use tracing::{debug, warn};

use crate::composite::CompositeRetriever;
use crate::fusion::{fuse_hits, partition_hits};

/// Cap on top-up rounds; `top_k` doubles each round.
const MAX_TOPUP_ITERATIONS: usize = 5;

/// Drop FAQ hits whose negative questions exactly match the normalized
/// query. Fragments without FAQ metadata pass through unchanged, as do hits
/// whose fragment row could not be fetched.
pub(crate) async fn filter_negative_questions(
    ctx: &RequestContext,
    fragments: &Arc<dyn FragmentRepository>,
    query: &str,
    hits: Vec<RankedHit>,
) -> Result<Vec<RankedHit>, AppError> {
    if hits.is_empty() {
        return Ok(hits);
    }
    ctx.ensure_active()?;

    let ids: Vec<String> = hits.iter().map(|hit| hit.chunk_id.clone()).collect();
    let fetched = fragments.get_many(ctx.tenant_id, &ids).await?;
    let by_id: HashMap<&str, &Fragment> =
        fetched.iter().map(|f| (f.id.as_str(), f)).collect();

    let before = hits.len();
    let kept: Vec<RankedHit> = hits
        .into_iter()
        .filter(|hit| {
            by_id
                .get(hit.chunk_id.as_str())
                .map_or(true, |fragment| !fragment.matches_negative_question(query))
        })
        .collect();

    if kept.len() < before {
        debug!(dropped = before - kept.len(), "negative-question filter removed hits");
    }
    Ok(kept)
}

/// Iterative FAQ top-up.
///
/// Re-issues retrieval with a doubling `top_k` until enough unique,
/// non-filtered answers accumulate, the result page comes back short, an
/// error occurs, or the round cap is hit. Fragment rows are fetched at most
/// once per chunk across all rounds.
pub(crate) async fn iterative_faq_retrieval(
    ctx: &RequestContext,
    retriever: &Arc<CompositeRetriever>,
    fragments: &Arc<dyn FragmentRepository>,
    base_params: &[RetrieveParams],
    query: &str,
    match_count: usize,
) -> Result<Vec<RankedHit>, AppError> {
    let mut top_k = base_params.first().map_or(match_count * 3, |p| p.top_k);
    let mut unique: HashMap<String, RankedHit> = HashMap::new();
    let mut chunk_cache: HashMap<String, Fragment> = HashMap::new();
    let mut filtered_out: HashSet<String> = HashSet::new();

    for iteration in 0..MAX_TOPUP_ITERATIONS {
        ctx.ensure_active()?;

        let mut params = base_params.to_vec();
        for param in &mut params {
            param.top_k = top_k;
        }

        let lists = match retriever.retrieve(ctx, &params).await {
            Ok(lists) => lists,
            Err(err) => {
                warn!(iteration, error = %err, "top-up retrieval failed, keeping accumulated hits");
                break;
            }
        };
        let page_len = lists.iter().map(|l| l.hits.len()).max().unwrap_or(0);
        let (vector_hits, keyword_hits) = partition_hits(lists);
        let fused = fuse_hits(&vector_hits, &keyword_hits);

        let to_fetch: Vec<String> = fused
            .iter()
            .map(|hit| hit.chunk_id.clone())
            .filter(|id| !chunk_cache.contains_key(id) && !filtered_out.contains(id))
            .collect();
        if !to_fetch.is_empty() {
            match fragments.get_many(ctx.tenant_id, &to_fetch).await {
                Ok(fetched) => {
                    chunk_cache.extend(fetched.into_iter().map(|f| (f.id.clone(), f)));
                }
                Err(err) => {
                    warn!(iteration, error = %err, "fragment fetch failed during top-up");
                    break;
                }
            }
        }

        for hit in fused {
            if filtered_out.contains(&hit.chunk_id) {
                continue;
            }
            if let Some(fragment) = chunk_cache.get(&hit.chunk_id) {
                if fragment.matches_negative_question(query) {
                    filtered_out.insert(hit.chunk_id.clone());
                    unique.remove(&hit.chunk_id);
                    continue;
                }
            }
            unique
                .entry(hit.chunk_id.clone())
                .and_modify(|existing| {
                    if hit.score > existing.score {
                        *existing = hit.clone();
                    }
                })
                .or_insert(hit);
        }

        if unique.len() >= match_count {
            break;
        }
        if page_len < top_k {
            // The index has nothing more to give.
            break;
        }
        top_k *= 2;
    }

    let mut accumulated: Vec<RankedHit> = unique.into_values().collect();
    accumulated.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mem::{InMemoryFragmentRepository, StaticRetriever};
    use common::model::{ChunkType, FaqMetadata};
    use common::retrieve::{MatchType, RetrieverType};

    fn hit(chunk_id: &str, score: f64) -> RankedHit {
        RankedHit {
            chunk_id: chunk_id.into(),
            knowledge_id: "know-1".into(),
            score,
            match_type: MatchType::Vector,
        }
    }

    fn faq_fragment(id: &str, negative: Option<&str>) -> Fragment {
        let mut fragment = Fragment::new(1, "know-1", "kb1", "answer", 0, ChunkType::Faq);
        fragment.id = id.into();
        fragment.faq_metadata = Some(FaqMetadata {
            question: "question".into(),
            negative_questions: negative.map(String::from).into_iter().collect(),
        });
        fragment
    }

    fn vector_params(top_k: usize) -> Vec<RetrieveParams> {
        vec![RetrieveParams {
            retriever_type: RetrieverType::Vector,
            query_text: "query".into(),
            query_vector: Some(vec![0.1; 4]),
            knowledge_base_id: "kb1".into(),
            knowledge_ids: None,
            knowledge_type: None,
            top_k,
            threshold: 0.0,
        }]
    }

    #[tokio::test]
    async fn filter_keeps_hits_without_metadata_or_fragment_rows() {
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        fragments.insert(faq_fragment("a", Some("blocked"))).await;
        // "b" has no stored fragment at all.

        let repo: Arc<dyn FragmentRepository> = fragments;
        let ctx = RequestContext::new(1);
        let kept = filter_negative_questions(&ctx, &repo, "blocked", vec![hit("a", 0.9), hit("b", 0.8)])
            .await
            .expect("filter");

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "b");
    }

    #[tokio::test]
    async fn top_up_accumulates_until_enough_unique_answers() {
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        fragments.insert(faq_fragment("a", Some("blocked"))).await;
        fragments.insert(faq_fragment("b", None)).await;
        fragments.insert(faq_fragment("c", None)).await;

        let retriever = StaticRetriever::new(RetrieverType::Vector).with_hits(vec![
            ("a", "know-1", 0.95),
            ("b", "know-1", 0.9),
            ("c", "know-1", 0.85),
        ]);
        let composite = Arc::new(CompositeRetriever::new(vec![Arc::new(retriever)]));

        let repo: Arc<dyn FragmentRepository> = fragments;
        let ctx = RequestContext::new(1);
        let hits = iterative_faq_retrieval(&ctx, &composite, &repo, &vector_params(2), "blocked", 2)
            .await
            .expect("top-up");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "b");
        assert_eq!(hits[1].chunk_id, "c");
    }

    #[tokio::test]
    async fn top_up_stops_on_short_page() {
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        fragments.insert(faq_fragment("a", None)).await;

        let retriever =
            StaticRetriever::new(RetrieverType::Vector).with_hits(vec![("a", "know-1", 0.9)]);
        let retriever = Arc::new(retriever);
        let composite = Arc::new(CompositeRetriever::new(vec![
            Arc::clone(&retriever) as Arc<dyn common::retrieve::Retriever>
        ]));

        let repo: Arc<dyn FragmentRepository> = fragments;
        let ctx = RequestContext::new(1);
        let hits = iterative_faq_retrieval(&ctx, &composite, &repo, &vector_params(6), "query", 3)
            .await
            .expect("top-up");

        // One short page, no second round.
        assert_eq!(hits.len(), 1);
        assert_eq!(retriever.retrieve_calls().await.len(), 1);
    }
}
