use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retrieve::RetrieverType;

/// An isolation unit owning knowledge bases, models and retriever engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: u64,
    pub name: String,
    /// The retriever engines this tenant has enabled.
    pub enabled_retrievers: Vec<RetrieverType>,
    /// Bytes of raw files currently attributed to the tenant.
    pub storage_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            enabled_retrievers: vec![RetrieverType::Vector, RetrieverType::Keyword],
            storage_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_retriever(&self, retriever_type: RetrieverType) -> bool {
        self.enabled_retrievers.contains(&retriever_type)
    }
}
