use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of content a fragment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkType {
    Text,
    Summary,
    TableColumn,
    TableSummary,
    Faq,
    Image,
}

impl ChunkType {
    /// Fragments eligible for presentation in search results.
    pub fn is_text_bearing(self) -> bool {
        !matches!(self, Self::Image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentStatus {
    Pending,
    Stored,
    Indexed,
    Failed,
}

/// Image metadata attached to a fragment whose content embeds markdown links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub ocr_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaqMetadata {
    pub question: String,
    #[serde(default)]
    pub negative_questions: Vec<String>,
}

/// The smallest indexable unit of content.
///
/// `pre_chunk_id`/`next_chunk_id` chain Text fragments of one knowledge in
/// document order; `parent_chunk_id` points at a Summary fragment of the same
/// knowledge. All structural relations are modeled by id, never by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub tenant_id: u64,
    pub knowledge_id: String,
    pub knowledge_base_id: String,
    pub content: String,
    pub chunk_index: i32,
    pub chunk_type: ChunkType,
    pub start_at: usize,
    pub end_at: usize,
    #[serde(default)]
    pub parent_chunk_id: Option<String>,
    #[serde(default)]
    pub pre_chunk_id: Option<String>,
    #[serde(default)]
    pub next_chunk_id: Option<String>,
    #[serde(default)]
    pub relation_chunks: Vec<String>,
    #[serde(default)]
    pub image_info: Vec<ImageInfo>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub status: FragmentStatus,
    #[serde(default)]
    pub faq_metadata: Option<FaqMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fragment {
    pub fn new(
        tenant_id: u64,
        knowledge_id: impl Into<String>,
        knowledge_base_id: impl Into<String>,
        content: impl Into<String>,
        chunk_index: i32,
        chunk_type: ChunkType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            knowledge_id: knowledge_id.into(),
            knowledge_base_id: knowledge_base_id.into(),
            content: content.into(),
            chunk_index,
            chunk_type,
            start_at: 0,
            end_at: 0,
            parent_chunk_id: None,
            pre_chunk_id: None,
            next_chunk_id: None,
            relation_chunks: Vec::new(),
            image_info: Vec::new(),
            metadata: None,
            status: FragmentStatus::Pending,
            faq_metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_offsets(mut self, start_at: usize, end_at: usize) -> Self {
        self.start_at = start_at;
        self.end_at = end_at;
        self
    }

    /// True when a normalized query exactly matches one of this fragment's
    /// negative questions (case-insensitive, trimmed).
    pub fn matches_negative_question(&self, query: &str) -> bool {
        let Some(faq) = self.faq_metadata.as_ref() else {
            return false;
        };
        let normalized = normalize_question(query);
        faq.negative_questions
            .iter()
            .any(|negative| normalize_question(negative) == normalized)
    }
}

pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faq_fragment(negative_questions: Vec<String>) -> Fragment {
        let mut fragment = Fragment::new(1, "k1", "kb1", "answer", 0, ChunkType::Faq);
        fragment.faq_metadata = Some(FaqMetadata {
            question: "How do I reset my password?".into(),
            negative_questions,
        });
        fragment
    }

    #[test]
    fn negative_question_match_is_case_insensitive_and_trimmed() {
        let fragment = faq_fragment(vec!["How to reset password".into()]);
        assert!(fragment.matches_negative_question("  how to reset password "));
        assert!(!fragment.matches_negative_question("how to reset my email"));
    }

    #[test]
    fn fragments_without_faq_metadata_never_match() {
        let fragment = Fragment::new(1, "k1", "kb1", "text", 0, ChunkType::Text);
        assert!(!fragment.matches_negative_question("anything"));
    }

    #[test]
    fn image_fragments_are_not_text_bearing() {
        assert!(!ChunkType::Image.is_text_bearing());
        assert!(ChunkType::Faq.is_text_bearing());
        assert!(ChunkType::TableSummary.is_text_bearing());
    }
}
