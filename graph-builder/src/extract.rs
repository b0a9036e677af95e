use std::collections::HashSet;

use common::context::RequestContext;
use common::error::AppError;
use common::llm::json::parse_llm_json;
use common::llm::{ChatMessage, ChatOptions};
use common::model::Fragment;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{Entity, GraphBuilder, Relationship};

/// Extraction calls run deterministic-ish: low temperature, no reasoning.
const EXTRACTION_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Deserialize)]
struct ExtractedEntity {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ExtractedRelation {
    source: String,
    target: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_strength")]
    strength: i64,
}

fn default_strength() -> i64 {
    1
}

impl GraphBuilder {
    /// Extract entities from one fragment and fold them into the shared maps.
    pub(crate) async fn extract_entities_for(
        &self,
        ctx: &RequestContext,
        fragment: &Fragment,
    ) -> Result<(), AppError> {
        ctx.ensure_active()?;
        if fragment.content.trim().is_empty() {
            return Ok(());
        }

        let messages = [
            ChatMessage::system(self.config.entity_prompt.clone()),
            ChatMessage::user(fragment.content.clone()),
        ];
        let response = self
            .chat_model
            .chat(&messages, &ChatOptions::extraction(EXTRACTION_TEMPERATURE))
            .await?;

        let extracted: Vec<ExtractedEntity> = parse_llm_json(&response.content)?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        for entity in extracted {
            let title = entity.title.trim();
            let description = entity.description.trim();
            if title.is_empty() || description.is_empty() {
                continue;
            }

            match state.entity_id_by_title.get(title) {
                Some(id) => {
                    if let Some(existing) = state.entities_by_id.get_mut(id) {
                        existing.frequency += 1;
                        if !existing.chunk_ids.contains(&fragment.id) {
                            existing.chunk_ids.push(fragment.id.clone());
                        }
                    }
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    state
                        .entity_id_by_title
                        .insert(title.to_string(), id.clone());
                    state.entities_by_id.insert(
                        id.clone(),
                        Entity {
                            id,
                            title: title.to_string(),
                            description: description.to_string(),
                            frequency: 1,
                            chunk_ids: vec![fragment.id.clone()],
                            degree: 0,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Extract relationships over one fragment batch.
    pub(crate) async fn extract_relationships_for(
        &self,
        ctx: &RequestContext,
        batch: &[Fragment],
    ) -> Result<(), AppError> {
        ctx.ensure_active()?;

        let batch_ids: HashSet<&str> = batch.iter().map(|f| f.id.as_str()).collect();
        let merged = merge_batch_content(batch);
        if merged.trim().is_empty() {
            return Ok(());
        }

        // Entities observed anywhere in this batch.
        let known_entities: Vec<serde_json::Value> = {
            let state = self.state.read().await;
            state
                .entities_by_id
                .values()
                .filter(|entity| {
                    entity
                        .chunk_ids
                        .iter()
                        .any(|chunk| batch_ids.contains(chunk.as_str()))
                })
                .map(|entity| {
                    serde_json::json!({
                        "title": entity.title,
                        "description": entity.description,
                    })
                })
                .collect()
        };
        if known_entities.len() < 2 {
            debug!(
                entities = known_entities.len(),
                "batch has too few entities for relationships"
            );
            return Ok(());
        }

        let payload = serde_json::json!({
            "entities": known_entities,
            "text": merged,
        });
        let messages = [
            ChatMessage::system(self.config.relationship_prompt.clone()),
            ChatMessage::user(payload.to_string()),
        ];
        let response = self
            .chat_model
            .chat(&messages, &ChatOptions::extraction(EXTRACTION_TEMPERATURE))
            .await?;

        let extracted: Vec<ExtractedRelation> = parse_llm_json(&response.content)?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        for relation in extracted {
            let source_title = relation.source.trim();
            let target_title = relation.target.trim();
            let (Some(source), Some(target)) = (
                state.entity_by_title(source_title),
                state.entity_by_title(target_title),
            ) else {
                debug!(
                    source = source_title,
                    target = target_title,
                    "relationship references unknown entities, skipped"
                );
                continue;
            };

            // Chunks from either endpoint that fall inside this batch.
            let mut common_chunks: Vec<String> = Vec::new();
            for chunk in source.chunk_ids.iter().chain(target.chunk_ids.iter()) {
                if batch_ids.contains(chunk.as_str()) && !common_chunks.contains(chunk) {
                    common_chunks.push(chunk.clone());
                }
            }
            if common_chunks.is_empty() {
                continue;
            }

            let key = format!("{source_title}#{target_title}");
            match state.relationships.get_mut(&key) {
                Some(existing) => {
                    let prior_support = existing.chunk_ids.len() as f64;
                    existing.strength = (existing.strength * prior_support
                        + relation.strength as f64)
                        / (prior_support + 1.0);
                    for chunk in common_chunks {
                        if !existing.chunk_ids.contains(&chunk) {
                            existing.chunk_ids.push(chunk);
                        }
                    }
                }
                None => {
                    state.relationships.insert(
                        key,
                        Relationship {
                            id: Uuid::new_v4().to_string(),
                            source: source_title.to_string(),
                            target: target_title.to_string(),
                            description: relation.description.trim().to_string(),
                            strength: relation.strength as f64,
                            weight: 0.0,
                            chunk_ids: common_chunks,
                            combined_degree: 0,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

/// Concatenate a batch's contents, trimming the rune-space overlap when a
/// fragment starts before its predecessor ends.
fn merge_batch_content(batch: &[Fragment]) -> String {
    let mut merged = String::new();
    let mut previous_end: Option<usize> = None;

    for fragment in batch {
        match previous_end {
            Some(end) if end > fragment.start_at => {
                let overlap = end - fragment.start_at;
                merged.extend(fragment.content.chars().skip(overlap));
            }
            Some(_) => {
                merged.push('\n');
                merged.push_str(&fragment.content);
            }
            None => merged.push_str(&fragment.content),
        }
        previous_end = Some(fragment.end_at);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::ChunkType;

    fn fragment(id: &str, content: &str, start_at: usize, end_at: usize) -> Fragment {
        let mut fragment = Fragment::new(1, "know-1", "kb1", content, 0, ChunkType::Text);
        fragment.id = id.into();
        fragment.start_at = start_at;
        fragment.end_at = end_at;
        fragment
    }

    #[test]
    fn adjacent_fragments_join_with_newline() {
        let merged = merge_batch_content(&[
            fragment("a", "first part", 0, 10),
            fragment("b", "second part", 10, 21),
        ]);
        assert_eq!(merged, "first part\nsecond part");
    }

    #[test]
    fn overlapping_prefix_is_dropped_in_rune_space() {
        let merged = merge_batch_content(&[
            fragment("a", "héllo wörld", 0, 11),
            fragment("b", "wörld again", 6, 17),
        ]);
        assert_eq!(merged, "héllo wörld again");
    }

    #[test]
    fn overlap_larger_than_content_yields_nothing_extra() {
        let merged = merge_batch_content(&[
            fragment("a", "abcdef", 0, 6),
            fragment("b", "ef", 4, 6),
        ]);
        assert_eq!(merged, "abcdef");
    }
}
