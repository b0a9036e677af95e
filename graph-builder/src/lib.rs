mod extract;
pub mod prompts;
mod weights;

use std::collections::HashMap;
use std::sync::Arc;

use common::context::RequestContext;
use common::error::AppError;
use common::llm::ChatModel;
use common::model::Fragment;
use futures::{stream, StreamExt};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// An entity aggregated across fragments, keyed by title within a build.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub frequency: u64,
    pub chunk_ids: Vec<String>,
    /// In-degree plus out-degree over the directed relationship set.
    pub degree: u64,
}

/// A directed relationship keyed by `(source, target)` titles.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub source: String,
    pub target: String,
    pub description: String,
    pub strength: f64,
    pub weight: f64,
    pub chunk_ids: Vec<String>,
    pub combined_degree: u64,
}

/// One undirected fragment-graph edge, inherited from a relationship.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentEdge {
    pub weight: f64,
    pub degree: u64,
}

/// A neighbor candidate returned by the expansion queries.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentNeighbor {
    pub fragment_id: String,
    pub weight: f64,
    pub degree: u64,
}

#[derive(Debug, Clone)]
pub struct GraphBuilderConfig {
    pub entity_prompt: String,
    pub relationship_prompt: String,
    pub entity_concurrency: usize,
    pub relationship_concurrency: usize,
    pub relationship_batch_size: usize,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            entity_prompt: prompts::DEFAULT_ENTITY_EXTRACTION_PROMPT.to_string(),
            relationship_prompt: prompts::DEFAULT_RELATIONSHIP_EXTRACTION_PROMPT.to_string(),
            entity_concurrency: 4,
            relationship_concurrency: 4,
            relationship_batch_size: 5,
        }
    }
}

/// The maps are interdependent and always updated together, so they live
/// behind one lock rather than per-map locks.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub(crate) entities_by_id: HashMap<String, Entity>,
    pub(crate) entity_id_by_title: HashMap<String, String>,
    pub(crate) relationships: HashMap<String, Relationship>,
    pub(crate) fragment_graph: HashMap<String, HashMap<String, FragmentEdge>>,
}

impl GraphState {
    pub(crate) fn entity_by_title(&self, title: &str) -> Option<&Entity> {
        self.entity_id_by_title
            .get(title)
            .and_then(|id| self.entities_by_id.get(id))
    }
}

/// Builds an entity-relationship graph over fragments via a chat model and
/// derives a fragment co-occurrence graph for retrieval expansion.
pub struct GraphBuilder {
    pub(crate) chat_model: Arc<dyn ChatModel>,
    pub(crate) config: GraphBuilderConfig,
    pub(crate) state: RwLock<GraphState>,
}

impl GraphBuilder {
    pub fn new(chat_model: Arc<dyn ChatModel>, config: GraphBuilderConfig) -> Self {
        Self {
            chat_model,
            config,
            state: RwLock::new(GraphState::default()),
        }
    }

    /// Run the full build: entity extraction per fragment, relationship
    /// extraction per batch, then weights, degrees and the fragment graph.
    ///
    /// Entity-extraction failures abort the build; a failed relationship
    /// batch is logged and skipped.
    #[instrument(skip_all, fields(fragments = fragments.len()))]
    pub async fn build_graph(
        &self,
        ctx: &RequestContext,
        fragments: &[Fragment],
    ) -> Result<(), AppError> {
        if fragments.is_empty() {
            return Ok(());
        }

        let mut entity_runs = stream::iter(fragments)
            .map(|fragment| self.extract_entities_for(ctx, fragment))
            .buffer_unordered(self.config.entity_concurrency.max(1));
        while let Some(outcome) = entity_runs.next().await {
            outcome?;
        }
        drop(entity_runs);

        let batch_size = self.config.relationship_batch_size.max(1);
        let mut relationship_runs = stream::iter(fragments.chunks(batch_size))
            .map(|batch| self.extract_relationships_for(ctx, batch))
            .buffer_unordered(self.config.relationship_concurrency.max(1));
        while let Some(outcome) = relationship_runs.next().await {
            if let Err(err) = outcome {
                warn!(error = %err, "relationship batch failed, continuing build");
            }
        }
        drop(relationship_runs);

        let mut state = self.state.write().await;
        weights::calculate_weights(&mut state);
        weights::calculate_degrees(&mut state);
        weights::build_fragment_graph(&mut state);

        info!(
            entities = state.entities_by_id.len(),
            relationships = state.relationships.len(),
            graph_nodes = state.fragment_graph.len(),
            "graph build complete"
        );
        Ok(())
    }

    /// Direct fragment neighbors ordered by `(weight desc, degree desc)`.
    pub async fn direct_neighbors(&self, fragment_id: &str, k: usize) -> Vec<FragmentNeighbor> {
        let state = self.state.read().await;
        let Some(edges) = state.fragment_graph.get(fragment_id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<FragmentNeighbor> = edges
            .iter()
            .filter(|(id, _)| id.as_str() != fragment_id)
            .map(|(id, edge)| FragmentNeighbor {
                fragment_id: id.clone(),
                weight: edge.weight,
                degree: edge.degree,
            })
            .collect();
        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }

    /// Two-hop fragment neighbors, damped by half per hop. Fragments already
    /// reachable in one hop are excluded; the best-scoring path per candidate
    /// wins.
    pub async fn indirect_neighbors(&self, fragment_id: &str, k: usize) -> Vec<FragmentNeighbor> {
        let state = self.state.read().await;
        let Some(direct) = state.fragment_graph.get(fragment_id) else {
            return Vec::new();
        };

        let mut excluded: std::collections::HashSet<&str> =
            direct.keys().map(String::as_str).collect();
        excluded.insert(fragment_id);

        let mut best: HashMap<String, FragmentNeighbor> = HashMap::new();
        for (middle, first_hop) in direct {
            if middle == fragment_id {
                continue;
            }
            let Some(second) = state.fragment_graph.get(middle) else {
                continue;
            };
            for (candidate, second_hop) in second {
                if excluded.contains(candidate.as_str()) {
                    continue;
                }
                let weight = first_hop.weight * second_hop.weight * 0.5;
                let degree = first_hop.degree.max(second_hop.degree);
                best.entry(candidate.clone())
                    .and_modify(|existing| {
                        if weight > existing.weight {
                            existing.weight = weight;
                            existing.degree = degree;
                        }
                    })
                    .or_insert_with(|| FragmentNeighbor {
                        fragment_id: candidate.clone(),
                        weight,
                        degree,
                    });
            }
        }

        let mut neighbors: Vec<FragmentNeighbor> = best.into_values().collect();
        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }

    pub async fn entities(&self) -> Vec<Entity> {
        let state = self.state.read().await;
        let mut entities: Vec<Entity> = state.entities_by_id.values().cloned().collect();
        entities.sort_by(|a, b| a.title.cmp(&b.title));
        entities
    }

    pub async fn relationships(&self) -> Vec<Relationship> {
        let state = self.state.read().await;
        let mut relationships: Vec<Relationship> =
            state.relationships.values().cloned().collect();
        relationships.sort_by(|a, b| (a.source.as_str(), a.target.as_str())
            .cmp(&(b.source.as_str(), b.target.as_str())));
        relationships
    }

    pub async fn entity_by_title(&self, title: &str) -> Option<Entity> {
        let state = self.state.read().await;
        state.entity_by_title(title).cloned()
    }

    /// The symmetric edge between two fragments, if present.
    pub async fn fragment_edge(&self, from: &str, to: &str) -> Option<FragmentEdge> {
        let state = self.state.read().await;
        state
            .fragment_graph
            .get(from)
            .and_then(|edges| edges.get(to))
            .copied()
    }
}

fn sort_neighbors(neighbors: &mut [FragmentNeighbor]) {
    neighbors.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.degree.cmp(&a.degree))
            .then_with(|| a.fragment_id.cmp(&b.fragment_id))
    });
}
