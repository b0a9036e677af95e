use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::graph_store::{ExtractedGraph, GraphNamespace, GraphStore};

#[derive(Default)]
pub struct InMemoryGraphStore {
    graphs: RwLock<HashMap<GraphNamespace, Vec<ExtractedGraph>>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn namespaces(&self) -> Vec<GraphNamespace> {
        self.graphs.read().await.keys().cloned().collect()
    }

    pub async fn graphs_in(&self, namespace: &GraphNamespace) -> Vec<ExtractedGraph> {
        self.graphs
            .read()
            .await
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn node_titles(&self, namespace: &GraphNamespace) -> Vec<String> {
        let mut titles: Vec<String> = self
            .graphs_in(namespace)
            .await
            .iter()
            .flat_map(|g| g.nodes.iter().map(|n| n.title.clone()))
            .collect();
        titles.sort();
        titles
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_graph(
        &self,
        namespace: &GraphNamespace,
        graph: &ExtractedGraph,
    ) -> Result<(), AppError> {
        self.graphs
            .write()
            .await
            .entry(namespace.clone())
            .or_default()
            .push(graph.clone());
        Ok(())
    }

    async fn delete_by_namespaces(&self, namespaces: &[GraphNamespace]) -> Result<(), AppError> {
        let mut graphs = self.graphs.write().await;
        for namespace in namespaces {
            graphs.remove(namespace);
        }
        Ok(())
    }
}
