use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::context::RequestContext;
use common::error::AppError;
use common::model::{ChunkType, Fragment, Knowledge};
use common::repository::{FragmentRepository, KnowledgeRepository};
use common::retrieve::{MatchType, RankedHit};
use tracing::{debug, warn};

use crate::SearchResult;

/// Materialize fused hits into presentation rows and pull in their one-hop
/// structural relatives.
///
/// For each primary hit this fetches its parent summary (`ParentChunk`),
/// explicit relations (`RelationChunk`) and, for Text fragments, the
/// immediate previous/next neighbors (`NearByChunk`). Relatives appear after
/// all primary hits, grouped in primary order; expansion never recurses.
/// Missing rows degrade with a log line rather than failing the search.
pub(crate) async fn process_search_results(
    ctx: &RequestContext,
    fragments: &Arc<dyn FragmentRepository>,
    knowledges: &Arc<dyn KnowledgeRepository>,
    hits: &[RankedHit],
) -> Result<Vec<SearchResult>, AppError> {
    if hits.is_empty() {
        return Ok(Vec::new());
    }
    ctx.ensure_active()?;

    let primary_ids: Vec<String> = hits.iter().map(|hit| hit.chunk_id.clone()).collect();
    let primary_rows = fragments.get_many(ctx.tenant_id, &primary_ids).await?;
    let mut fragment_map: HashMap<String, Fragment> = primary_rows
        .into_iter()
        .map(|fragment| (fragment.id.clone(), fragment))
        .collect();

    // One hop out from each primary hit, deduplicated, in primary order.
    let mut related: Vec<(String, MatchType)> = Vec::new();
    let mut queued: HashSet<String> = primary_ids.iter().cloned().collect();
    fn queue_related(
        id: &str,
        match_type: MatchType,
        related: &mut Vec<(String, MatchType)>,
        queued: &mut HashSet<String>,
    ) {
        if queued.insert(id.to_string()) {
            related.push((id.to_string(), match_type));
        }
    }

    for hit in hits {
        let Some(fragment) = fragment_map.get(&hit.chunk_id) else {
            continue;
        };
        if let Some(parent) = fragment.parent_chunk_id.as_deref() {
            queue_related(parent, MatchType::ParentChunk, &mut related, &mut queued);
        }
        for relation in &fragment.relation_chunks {
            queue_related(relation, MatchType::RelationChunk, &mut related, &mut queued);
        }
        if fragment.chunk_type == ChunkType::Text {
            if let Some(pre) = fragment.pre_chunk_id.as_deref() {
                queue_related(pre, MatchType::NearByChunk, &mut related, &mut queued);
            }
            if let Some(next) = fragment.next_chunk_id.as_deref() {
                queue_related(next, MatchType::NearByChunk, &mut related, &mut queued);
            }
        }
    }

    if !related.is_empty() {
        let related_ids: Vec<String> = related.iter().map(|(id, _)| id.clone()).collect();
        match fragments.get_many(ctx.tenant_id, &related_ids).await {
            Ok(rows) => {
                fragment_map.extend(rows.into_iter().map(|f| (f.id.clone(), f)));
            }
            Err(err) => {
                warn!(error = %err, "related-fragment fetch failed, returning primary hits only");
            }
        }
    }

    let knowledge_ids: Vec<String> = {
        let mut seen = HashSet::new();
        fragment_map
            .values()
            .map(|f| f.knowledge_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    };
    let knowledge_map: HashMap<String, Knowledge> = knowledges
        .get_many(ctx.tenant_id, &knowledge_ids)
        .await?
        .into_iter()
        .map(|knowledge| (knowledge.id.clone(), knowledge))
        .collect();

    let mut results = Vec::with_capacity(hits.len() + related.len());
    for hit in hits {
        let Some(fragment) = fragment_map.get(&hit.chunk_id) else {
            warn!(chunk_id = %hit.chunk_id, "hit references a missing fragment");
            continue;
        };
        if !fragment.chunk_type.is_text_bearing() {
            continue;
        }
        results.push(materialize(fragment, &knowledge_map, hit.score, hit.match_type));
    }
    for (id, match_type) in related {
        let Some(fragment) = fragment_map.get(&id) else {
            debug!(chunk_id = %id, "related fragment missing, skipped");
            continue;
        };
        if !fragment.chunk_type.is_text_bearing() {
            continue;
        }
        results.push(materialize(fragment, &knowledge_map, 0.0, match_type));
    }

    Ok(results)
}

fn materialize(
    fragment: &Fragment,
    knowledge_map: &HashMap<String, Knowledge>,
    score: f64,
    match_type: MatchType,
) -> SearchResult {
    let knowledge = knowledge_map.get(&fragment.knowledge_id);
    SearchResult {
        chunk_id: fragment.id.clone(),
        knowledge_id: fragment.knowledge_id.clone(),
        knowledge_base_id: fragment.knowledge_base_id.clone(),
        content: fragment.content.clone(),
        chunk_type: fragment.chunk_type,
        chunk_index: fragment.chunk_index,
        score,
        match_type,
        knowledge_title: knowledge.map(|k| k.title.clone()).unwrap_or_default(),
        file_name: knowledge.map(|k| k.file_name.clone()).unwrap_or_default(),
        image_info: fragment.image_info.clone(),
        metadata: fragment.metadata.clone(),
    }
}
