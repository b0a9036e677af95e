use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Partition key for graph data: one namespace per knowledge within a base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphNamespace {
    pub knowledge_base_id: String,
    pub knowledge_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Fragment ids this node was observed in.
    #[serde(default)]
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRelation {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

/// An extraction result as produced by the chat model, before persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relations: Vec<GraphRelation>,
}

impl ExtractedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relations.is_empty()
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn add_graph(
        &self,
        namespace: &GraphNamespace,
        graph: &ExtractedGraph,
    ) -> Result<(), AppError>;

    async fn delete_by_namespaces(&self, namespaces: &[GraphNamespace]) -> Result<(), AppError>;
}
