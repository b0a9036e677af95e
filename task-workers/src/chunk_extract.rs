use std::sync::Arc;

use common::error::AppError;
use common::graph_store::{ExtractedGraph, GraphNamespace, GraphStore};
use common::llm::json::parse_llm_json;
use common::llm::{ChatMessage, ChatOptions, ModelRegistry};
use common::model::ExtractConfig;
use common::repository::{FragmentRepository, KnowledgeBaseRepository};
use common::task::ChunkExtractPayload;
use tracing::{debug, info, instrument};

const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Worker for `chunk.extract`: runs the per-knowledge-base graph extractor
/// over one fragment and persists the result into the graph store.
pub struct ChunkExtractHandler {
    fragments: Arc<dyn FragmentRepository>,
    knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    registry: Arc<ModelRegistry>,
    graph_store: Arc<dyn GraphStore>,
}

impl ChunkExtractHandler {
    pub fn new(
        fragments: Arc<dyn FragmentRepository>,
        knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
        registry: Arc<ModelRegistry>,
        graph_store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            fragments,
            knowledge_bases,
            registry,
            graph_store,
        }
    }

    /// The queue redelivers on error, so every "the world moved on" case
    /// returns success instead of churning through retries.
    #[instrument(skip(self, payload), fields(tenant_id = payload.tenant_id, chunk_id = %payload.chunk_id))]
    pub async fn handle(&self, payload: &ChunkExtractPayload) -> Result<(), AppError> {
        let Some(fragment) = self
            .fragments
            .get(payload.tenant_id, &payload.chunk_id)
            .await?
        else {
            info!("fragment vanished before extraction, nothing to do");
            return Ok(());
        };

        let Some(knowledge_base) = self
            .knowledge_bases
            .get(payload.tenant_id, &fragment.knowledge_base_id)
            .await?
        else {
            info!("knowledge base vanished before extraction, nothing to do");
            return Ok(());
        };

        let Some(extract_config) = knowledge_base.extract_config.as_ref() else {
            debug!("knowledge base has no extract config, skipping");
            return Ok(());
        };

        let model = self.registry.chat_model(&payload.model_id)?;
        let messages = [
            ChatMessage::system(build_extraction_prompt(extract_config)?),
            ChatMessage::user(fragment.content.clone()),
        ];
        let response = model
            .chat(&messages, &ChatOptions::extraction(EXTRACTION_TEMPERATURE))
            .await?;

        let mut graph: ExtractedGraph = parse_llm_json(&response.content)?;
        if graph.is_empty() {
            debug!("extractor found nothing in this fragment");
            return Ok(());
        }
        for node in &mut graph.nodes {
            node.chunks = vec![payload.chunk_id.clone()];
        }

        // The fragment may have been deleted while the model was thinking;
        // in that case the result is dropped silently.
        if self
            .fragments
            .get(payload.tenant_id, &payload.chunk_id)
            .await?
            .is_none()
        {
            info!("fragment deleted during extraction, dropping result");
            return Ok(());
        }

        let namespace = GraphNamespace {
            knowledge_base_id: fragment.knowledge_base_id.clone(),
            knowledge_id: fragment.knowledge_id.clone(),
        };
        self.graph_store.add_graph(&namespace, &graph).await?;
        info!(
            nodes = graph.nodes.len(),
            relations = graph.relations.len(),
            "chunk graph persisted"
        );
        Ok(())
    }
}

/// Per-knowledge-base extraction prompt assembled from the operator-supplied
/// domain description, tag focus and worked examples.
fn build_extraction_prompt(config: &ExtractConfig) -> Result<String, AppError> {
    let mut prompt = String::from(
        "You extract a knowledge graph from a passage of text.\n\nDomain: ",
    );
    prompt.push_str(&config.description);

    if !config.tags.is_empty() {
        prompt.push_str("\nFocus on: ");
        prompt.push_str(&config.tags.join(", "));
    }

    if !config.examples.is_empty() {
        prompt.push_str("\n\nExamples:");
        for example in &config.examples {
            prompt.push_str("\nText: ");
            prompt.push_str(&example.text);
            prompt.push_str("\nGraph: ");
            prompt.push_str(&serde_json::to_string(&serde_json::json!({
                "nodes": example.nodes,
                "relations": example.relations,
            }))?);
        }
    }

    prompt.push_str(
        "\n\nRespond with a JSON object and nothing else:\n\
         {\"nodes\": [{\"title\": \"...\", \"description\": \"...\"}], \
         \"relations\": [{\"source\": \"...\", \"target\": \"...\", \"description\": \"...\"}]}",
    );
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mem::{
        InMemoryFragmentRepository, InMemoryGraphStore, InMemoryKnowledgeBaseRepository,
        ScriptedChatModel,
    };
    use common::model::{ChunkType, Fragment, KnowledgeBase, KnowledgeBaseKind};

    const GRAPH_JSON: &str = r#"{
        "nodes": [
            {"title": "Alice", "description": "A person"},
            {"title": "Acme", "description": "A company"}
        ],
        "relations": [
            {"source": "Alice", "target": "Acme", "description": "works at"}
        ]
    }"#;

    struct Fixture {
        handler: ChunkExtractHandler,
        fragments: Arc<InMemoryFragmentRepository>,
        bases: Arc<InMemoryKnowledgeBaseRepository>,
        graph_store: Arc<InMemoryGraphStore>,
    }

    fn fixture(model: ScriptedChatModel) -> Fixture {
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        let bases = Arc::new(InMemoryKnowledgeBaseRepository::new());
        let graph_store = Arc::new(InMemoryGraphStore::new());
        let registry = Arc::new(
            ModelRegistry::builder()
                .with_chat_model(Arc::new(model))
                .build(),
        );
        let handler = ChunkExtractHandler::new(
            Arc::clone(&fragments) as Arc<dyn FragmentRepository>,
            Arc::clone(&bases) as Arc<dyn KnowledgeBaseRepository>,
            registry,
            Arc::clone(&graph_store) as Arc<dyn GraphStore>,
        );
        Fixture {
            handler,
            fragments,
            bases,
            graph_store,
        }
    }

    async fn seed(fixture: &Fixture, with_extract_config: bool) -> ChunkExtractPayload {
        let mut base = KnowledgeBase::new(
            1,
            "kb",
            KnowledgeBaseKind::Document,
            "embed-small",
            "chat-small",
        );
        base.id = "kb-1".into();
        if with_extract_config {
            base.extract_config = Some(ExtractConfig {
                description: "corporate org charts".into(),
                tags: vec!["people".into(), "employers".into()],
                examples: Vec::new(),
            });
        }
        fixture.bases.insert(base).await;

        let mut fragment = Fragment::new(
            1,
            "know-1",
            "kb-1",
            "Alice works at Acme.",
            0,
            ChunkType::Text,
        );
        fragment.id = "chunk-1".into();
        fixture.fragments.insert(fragment).await;

        ChunkExtractPayload {
            tenant_id: 1,
            chunk_id: "chunk-1".into(),
            model_id: "extract-model".into(),
        }
    }

    fn scripted() -> ScriptedChatModel {
        ScriptedChatModel::new("extract-model").with_rule("Alice works at Acme", GRAPH_JSON)
    }

    #[tokio::test]
    async fn persists_graph_with_chunk_stamped_nodes() {
        let fixture = fixture(scripted());
        let payload = seed(&fixture, true).await;

        fixture.handler.handle(&payload).await.expect("handle");

        let namespace = GraphNamespace {
            knowledge_base_id: "kb-1".into(),
            knowledge_id: "know-1".into(),
        };
        let graphs = fixture.graph_store.graphs_in(&namespace).await;
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].nodes.len(), 2);
        assert!(graphs[0]
            .nodes
            .iter()
            .all(|node| node.chunks == vec!["chunk-1".to_string()]));
        assert_eq!(graphs[0].relations.len(), 1);
    }

    #[tokio::test]
    async fn rerunning_produces_the_same_node_set() {
        let fixture = fixture(scripted());
        let payload = seed(&fixture, true).await;

        fixture.handler.handle(&payload).await.expect("first run");
        let namespace = GraphNamespace {
            knowledge_base_id: "kb-1".into(),
            knowledge_id: "know-1".into(),
        };
        let first_titles = fixture.graph_store.node_titles(&namespace).await;

        fixture.handler.handle(&payload).await.expect("second run");
        let graphs = fixture.graph_store.graphs_in(&namespace).await;
        let second_titles: Vec<String> = {
            let mut titles: Vec<String> = graphs
                .last()
                .expect("second graph")
                .nodes
                .iter()
                .map(|n| n.title.clone())
                .collect();
            titles.sort();
            titles
        };
        assert_eq!(first_titles, second_titles);
    }

    #[tokio::test]
    async fn vanished_fragment_is_success_without_model_calls() {
        let fixture = fixture(scripted());
        let payload = ChunkExtractPayload {
            tenant_id: 1,
            chunk_id: "ghost".into(),
            model_id: "extract-model".into(),
        };

        fixture.handler.handle(&payload).await.expect("handle");
        assert!(fixture.graph_store.namespaces().await.is_empty());
    }

    #[tokio::test]
    async fn missing_extract_config_skips_quietly() {
        let fixture = fixture(scripted());
        let payload = seed(&fixture, false).await;

        fixture.handler.handle(&payload).await.expect("handle");
        assert!(fixture.graph_store.namespaces().await.is_empty());
    }

    #[tokio::test]
    async fn unparseable_model_output_surfaces_for_retry() {
        let model =
            ScriptedChatModel::new("extract-model").with_rule("Alice works at Acme", "not json");
        let fixture = fixture(model);
        let payload = seed(&fixture, true).await;

        let outcome = fixture.handler.handle(&payload).await;
        assert!(matches!(outcome, Err(AppError::LLMParsing(_))));
    }

    #[test]
    fn prompt_carries_description_tags_and_examples() {
        use common::graph_store::{GraphNode, GraphRelation};
        use common::model::ExtractExample;

        let config = ExtractConfig {
            description: "medical papers".into(),
            tags: vec!["drugs".into()],
            examples: vec![ExtractExample {
                text: "Aspirin treats pain.".into(),
                nodes: vec![GraphNode {
                    title: "Aspirin".into(),
                    description: "a drug".into(),
                    chunks: Vec::new(),
                }],
                relations: vec![GraphRelation {
                    source: "Aspirin".into(),
                    target: "pain".into(),
                    description: "treats".into(),
                }],
            }],
        };

        let prompt = build_extraction_prompt(&config).expect("prompt");
        assert!(prompt.contains("medical papers"));
        assert!(prompt.contains("drugs"));
        assert!(prompt.contains("Aspirin treats pain."));
        assert!(prompt.contains("\"nodes\""));
    }
}
