use std::collections::HashMap;

use tracing::debug;

use crate::{FragmentEdge, GraphState};

/// Mixing factors for the normalized PMI and strength signals.
const PMI_SHARE: f64 = 0.6;
const STRENGTH_SHARE: f64 = 0.4;

/// Compute PMI-based relationship weights scaled into `[1, 10]`.
pub(crate) fn calculate_weights(state: &mut GraphState) {
    let total_entity_frequency: f64 = state
        .entities_by_id
        .values()
        .map(|entity| entity.frequency as f64)
        .sum();
    let total_relationship_chunks: f64 = state
        .relationships
        .values()
        .map(|relationship| relationship.chunk_ids.len() as f64)
        .sum();
    if total_entity_frequency == 0.0 || total_relationship_chunks == 0.0 {
        return;
    }

    let mut raw_pmi: HashMap<String, f64> = HashMap::with_capacity(state.relationships.len());
    for (key, relationship) in &state.relationships {
        let (Some(source), Some(target)) = (
            state.entity_by_title(&relationship.source),
            state.entity_by_title(&relationship.target),
        ) else {
            raw_pmi.insert(key.clone(), 0.0);
            continue;
        };

        let p_source = source.frequency as f64 / total_entity_frequency;
        let p_target = target.frequency as f64 / total_entity_frequency;
        let p_relationship = relationship.chunk_ids.len() as f64 / total_relationship_chunks;
        let pmi = (p_relationship / (p_source * p_target)).log2().max(0.0);
        raw_pmi.insert(key.clone(), pmi);
    }

    let max_pmi = raw_pmi.values().fold(0.0_f64, |a, b| a.max(*b));
    let max_strength = state
        .relationships
        .values()
        .map(|relationship| relationship.strength)
        .fold(1.0_f64, f64::max);

    for (key, relationship) in &mut state.relationships {
        let pmi_normalized = if max_pmi > 0.0 {
            raw_pmi.get(key).copied().unwrap_or(0.0) / max_pmi
        } else {
            0.0
        };
        let strength_normalized = relationship.strength / max_strength;
        let combined = PMI_SHARE * pmi_normalized + STRENGTH_SHARE * strength_normalized;
        relationship.weight = 1.0 + 9.0 * combined;
    }

    debug!(
        relationships = state.relationships.len(),
        max_pmi, max_strength, "relationship weights computed"
    );
}

/// Entity degree is indegree plus outdegree over the directed relationship
/// set; each relationship also records the sum of its endpoints' degrees.
pub(crate) fn calculate_degrees(state: &mut GraphState) {
    let mut degree_by_title: HashMap<String, u64> = HashMap::new();
    for relationship in state.relationships.values() {
        *degree_by_title
            .entry(relationship.source.clone())
            .or_default() += 1;
        *degree_by_title
            .entry(relationship.target.clone())
            .or_default() += 1;
    }

    for entity in state.entities_by_id.values_mut() {
        entity.degree = degree_by_title.get(&entity.title).copied().unwrap_or(0);
    }

    for relationship in state.relationships.values_mut() {
        let source_degree = degree_by_title
            .get(&relationship.source)
            .copied()
            .unwrap_or(0);
        let target_degree = degree_by_title
            .get(&relationship.target)
            .copied()
            .unwrap_or(0);
        relationship.combined_degree = source_degree + target_degree;
    }
}

/// Project relationships onto fragments: every `(source chunk, target chunk)`
/// pair gets a symmetric edge inheriting the relationship weight and combined
/// degree. Relationships are applied in key order, so the last writer per
/// pair is deterministic.
pub(crate) fn build_fragment_graph(state: &mut GraphState) {
    let GraphState {
        entities_by_id,
        entity_id_by_title,
        relationships,
        fragment_graph,
    } = state;

    fragment_graph.clear();

    let entity_chunks = |title: &str| -> Option<&Vec<String>> {
        entity_id_by_title
            .get(title)
            .and_then(|id| entities_by_id.get(id))
            .map(|entity| &entity.chunk_ids)
    };

    let mut keys: Vec<&String> = relationships.keys().collect();
    keys.sort();

    for key in keys {
        let Some(relationship) = relationships.get(key) else {
            continue;
        };
        let (Some(source_chunks), Some(target_chunks)) = (
            entity_chunks(&relationship.source),
            entity_chunks(&relationship.target),
        ) else {
            continue;
        };

        let edge = FragmentEdge {
            weight: relationship.weight,
            degree: relationship.combined_degree,
        };
        for source_chunk in source_chunks {
            for target_chunk in target_chunks {
                fragment_graph
                    .entry(source_chunk.clone())
                    .or_default()
                    .insert(target_chunk.clone(), edge);
                fragment_graph
                    .entry(target_chunk.clone())
                    .or_default()
                    .insert(source_chunk.clone(), edge);
            }
        }
    }
}
