use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use common::retrieve::{RankedHit, RetrieverType};

use crate::composite::RetrievedList;

/// Rank-fusion smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Split per-retriever result lists into vector and keyword hit streams,
/// preserving retriever-native order.
pub fn partition_hits(lists: Vec<RetrievedList>) -> (Vec<RankedHit>, Vec<RankedHit>) {
    let mut vector_hits = Vec::new();
    let mut keyword_hits = Vec::new();
    for list in lists {
        match list.retriever_type {
            RetrieverType::Vector => vector_hits.extend(list.hits),
            RetrieverType::Keyword => keyword_hits.extend(list.hits),
        }
    }
    (vector_hits, keyword_hits)
}

/// Fuse the two hit streams.
///
/// With no keyword hits the vector list passes through deduplicated with its
/// native scores intact; otherwise both lists are merged under Reciprocal
/// Rank Fusion and the fused score replaces the native one.
pub fn fuse_hits(vector_hits: &[RankedHit], keyword_hits: &[RankedHit]) -> Vec<RankedHit> {
    if keyword_hits.is_empty() {
        dedupe_by_max_score(vector_hits)
    } else {
        rrf_fuse(vector_hits, keyword_hits)
    }
}

/// Deduplicate by chunk id keeping the highest native score, sorted
/// descending. The sort is stable, so equal scores keep retrieval order.
pub fn dedupe_by_max_score(hits: &[RankedHit]) -> Vec<RankedHit> {
    let mut index_by_chunk: HashMap<&str, usize> = HashMap::new();
    let mut deduped: Vec<RankedHit> = Vec::new();

    for hit in hits {
        match index_by_chunk.get(hit.chunk_id.as_str()) {
            Some(&existing) => {
                if hit.score > deduped[existing].score {
                    deduped[existing].score = hit.score;
                }
            }
            None => {
                index_by_chunk.insert(hit.chunk_id.as_str(), deduped.len());
                deduped.push(hit.clone());
            }
        }
    }

    sort_by_score_desc(&mut deduped);
    deduped
}

/// Reciprocal Rank Fusion over the union of both lists.
///
/// Ranks start at 1 and only the first (best) occurrence per retriever
/// counts. Each chunk scores `Σ 1 / (60 + rank)` over the retrievers it
/// appears in.
pub fn rrf_fuse(vector_hits: &[RankedHit], keyword_hits: &[RankedHit]) -> Vec<RankedHit> {
    let vector_ranks = first_occurrence_ranks(vector_hits);
    let keyword_ranks = first_occurrence_ranks(keyword_hits);

    let mut fused: Vec<RankedHit> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for hit in vector_hits.iter().chain(keyword_hits.iter()) {
        if !seen.insert(hit.chunk_id.as_str()) {
            continue;
        }
        let mut score = 0.0;
        if let Some(rank) = vector_ranks.get(hit.chunk_id.as_str()) {
            score += 1.0 / (RRF_K + *rank as f64);
        }
        if let Some(rank) = keyword_ranks.get(hit.chunk_id.as_str()) {
            score += 1.0 / (RRF_K + *rank as f64);
        }
        let mut merged = hit.clone();
        merged.score = score;
        fused.push(merged);
    }

    sort_by_score_desc(&mut fused);
    fused
}

fn first_occurrence_ranks(hits: &[RankedHit]) -> HashMap<&str, usize> {
    let mut ranks = HashMap::new();
    for (position, hit) in hits.iter().enumerate() {
        ranks.entry(hit.chunk_id.as_str()).or_insert(position + 1);
    }
    ranks
}

/// Stable descending sort: ties preserve the incoming order.
pub fn sort_by_score_desc(hits: &mut [RankedHit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::retrieve::MatchType;

    fn vector_hit(chunk_id: &str, score: f64) -> RankedHit {
        RankedHit {
            chunk_id: chunk_id.into(),
            knowledge_id: "k1".into(),
            score,
            match_type: MatchType::Vector,
        }
    }

    fn keyword_hit(chunk_id: &str, score: f64) -> RankedHit {
        RankedHit {
            chunk_id: chunk_id.into(),
            knowledge_id: "k1".into(),
            score,
            match_type: MatchType::Keyword,
        }
    }

    #[test]
    fn vector_only_passthrough_preserves_native_scores() {
        let hits = vec![
            vector_hit("a", 0.91),
            vector_hit("b", 0.77),
            vector_hit("a", 0.55),
        ];

        let fused = fuse_hits(&hits, &[]);

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk_id, "a");
        assert_eq!(fused[0].score, 0.91);
        assert_eq!(fused[1].score, 0.77);
    }

    #[test]
    fn dedupe_keeps_the_higher_score_regardless_of_order() {
        let hits = vec![vector_hit("a", 0.4), vector_hit("a", 0.8)];
        let deduped = dedupe_by_max_score(&hits);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].score, 0.8);
    }

    #[test]
    fn rrf_scores_sum_reciprocal_ranks() {
        let vector = vec![
            vector_hit("a", 0.9),
            vector_hit("b", 0.8),
            vector_hit("c", 0.7),
        ];
        let keyword = vec![
            keyword_hit("b", 12.0),
            keyword_hit("d", 9.0),
            keyword_hit("a", 4.0),
        ];

        let fused = rrf_fuse(&vector, &keyword);

        let ordered: Vec<&str> = fused.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ordered, vec!["b", "a", "d", "c"]);

        let score_of = |chunk: &str| {
            fused
                .iter()
                .find(|h| h.chunk_id == chunk)
                .map(|h| h.score)
                .expect("chunk present")
        };
        assert!((score_of("a") - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        assert!((score_of("b") - (1.0 / 61.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((score_of("c") - 1.0 / 63.0).abs() < 1e-12);
        assert!((score_of("d") - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn rrf_counts_only_the_first_occurrence_per_retriever() {
        let vector = vec![vector_hit("a", 0.9), vector_hit("a", 0.1)];
        let keyword = vec![keyword_hit("z", 1.0)];

        let fused = rrf_fuse(&vector, &keyword);
        let a = fused.iter().find(|h| h.chunk_id == "a").expect("a fused");
        assert!((a.score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut hits = vec![vector_hit("first", 0.5), vector_hit("second", 0.5)];
        sort_by_score_desc(&mut hits);
        assert_eq!(hits[0].chunk_id, "first");
        assert_eq!(hits[1].chunk_id, "second");
    }
}
