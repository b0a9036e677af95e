use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnowledgeType {
    Text,
    Faq,
    Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A logical document (file, table or FAQ set) composed of fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    pub id: String,
    pub tenant_id: u64,
    pub knowledge_base_id: String,
    pub title: String,
    pub file_name: String,
    pub file_type: String,
    pub file_path: String,
    pub embedding_model_id: String,
    pub knowledge_type: KnowledgeType,
    pub storage_size: u64,
    pub parse_status: ParseStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Knowledge {
    pub fn new(
        tenant_id: u64,
        knowledge_base_id: impl Into<String>,
        title: impl Into<String>,
        knowledge_type: KnowledgeType,
        embedding_model_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            knowledge_base_id: knowledge_base_id.into(),
            title: title.into(),
            file_name: String::new(),
            file_type: String::new(),
            file_path: String::new(),
            embedding_model_id: embedding_model_id.into(),
            knowledge_type,
            storage_size: 0,
            parse_status: ParseStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_file(
        mut self,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        file_path: impl Into<String>,
        storage_size: u64,
    ) -> Self {
        self.file_name = file_name.into();
        self.file_type = file_type.into();
        self.file_path = file_path.into();
        self.storage_size = storage_size;
        self
    }
}
