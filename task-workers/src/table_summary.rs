use std::path::PathBuf;
use std::sync::Arc;

use common::error::AppError;
use common::llm::{ChatMessage, ChatModel, ChatOptions, Embedder, ModelRegistry};
use common::model::{ChunkType, Fragment, FragmentStatus, Knowledge, KnowledgeType, ParseStatus};
use common::repository::{FragmentRepository, KnowledgeRepository};
use common::retrieve::IndexInfo;
use common::task::TableSummaryPayload;
use retrieval_pipeline::CompositeRetriever;
use tracing::{info, instrument, warn};

use crate::table_session::{TableSession, TableSnapshot};

const SUMMARY_TEMPERATURE: f32 = 0.3;

const TABLE_DESCRIPTION_PROMPT: &str = "\
You describe data tables. Given a table's schema and sample rows, write a
plain-prose description of 200 to 300 characters covering what the table
contains and what one row represents. Respond with the description only.";

const COLUMN_DESCRIPTION_PROMPT: &str = "\
You document data tables column by column. Given a table's schema and sample
rows, describe each column on its own line as `name: meaning and value
range`. Respond with the column lines only.";

/// Worker for `table.summary`: loads tabular knowledge into a scoped
/// analytical session, asks the chat model for table- and column-level
/// descriptions, and indexes the resulting fragments.
pub struct TableSummaryHandler {
    knowledges: Arc<dyn KnowledgeRepository>,
    fragments: Arc<dyn FragmentRepository>,
    registry: Arc<ModelRegistry>,
    retriever: Arc<CompositeRetriever>,
}

impl TableSummaryHandler {
    pub fn new(
        knowledges: Arc<dyn KnowledgeRepository>,
        fragments: Arc<dyn FragmentRepository>,
        registry: Arc<ModelRegistry>,
        retriever: Arc<CompositeRetriever>,
    ) -> Self {
        Self {
            knowledges,
            fragments,
            registry,
            retriever,
        }
    }

    #[instrument(skip(self, payload), fields(tenant_id = payload.tenant_id, knowledge_id = %payload.knowledge_id))]
    pub async fn handle(&self, payload: &TableSummaryPayload) -> Result<(), AppError> {
        let Some(knowledge) = self
            .knowledges
            .get(payload.tenant_id, &payload.knowledge_id)
            .await?
        else {
            info!("knowledge vanished before summarization, nothing to do");
            return Ok(());
        };

        if !matches!(knowledge.file_type.as_str(), "csv" | "xlsx" | "xls") {
            return Err(AppError::Unsupported(format!(
                "file type {} for table summary",
                knowledge.file_type
            )));
        }

        let chat_model = self.registry.chat_model(&payload.summary_model)?;
        let embedder = self.registry.embedder(&payload.embedding_model)?;

        let snapshot = load_snapshot(&knowledge).await?;
        let (summary, column) = self
            .summarize(payload, &knowledge, &chat_model, &snapshot)
            .await?;

        let fragment_ids = vec![summary.id.clone(), column.id.clone()];
        if let Err(err) = self
            .persist_and_index(payload, &knowledge, vec![summary, column], &embedder)
            .await
        {
            self.compensate(payload, &knowledge, &fragment_ids, embedder.dimensions(), &err)
                .await;
            return Err(err);
        }

        info!("table summary fragments indexed");
        Ok(())
    }

    /// Two model calls: one table-level description, one per-column digest.
    /// The fragments are linked summary -> column via the parent/pre/next
    /// ids before anything is persisted.
    async fn summarize(
        &self,
        payload: &TableSummaryPayload,
        knowledge: &Knowledge,
        chat_model: &Arc<dyn ChatModel>,
        snapshot: &TableSnapshot,
    ) -> Result<(Fragment, Fragment), AppError> {
        let opts = ChatOptions {
            temperature: Some(SUMMARY_TEMPERATURE),
            thinking: Some(false),
            ..ChatOptions::default()
        };
        let data = render_table_data(snapshot)?;

        let table_description = chat_model
            .chat(
                &[
                    ChatMessage::system(TABLE_DESCRIPTION_PROMPT),
                    ChatMessage::user(format!("Summarize this table.\n{data}")),
                ],
                &opts,
            )
            .await?
            .content
            .trim()
            .to_string();

        let column_description = chat_model
            .chat(
                &[
                    ChatMessage::system(COLUMN_DESCRIPTION_PROMPT),
                    ChatMessage::user(format!("Describe each column.\n{data}")),
                ],
                &opts,
            )
            .await?
            .content
            .trim()
            .to_string();

        if table_description.is_empty() || column_description.is_empty() {
            return Err(AppError::LLMParsing(
                "summarizer returned an empty description".into(),
            ));
        }

        let mut summary = Fragment::new(
            payload.tenant_id,
            &knowledge.id,
            &knowledge.knowledge_base_id,
            table_description,
            0,
            ChunkType::TableSummary,
        );
        let mut column = Fragment::new(
            payload.tenant_id,
            &knowledge.id,
            &knowledge.knowledge_base_id,
            column_description,
            1,
            ChunkType::TableColumn,
        );
        column.parent_chunk_id = Some(summary.id.clone());
        column.pre_chunk_id = Some(summary.id.clone());
        summary.next_chunk_id = Some(column.id.clone());
        summary.status = FragmentStatus::Stored;
        column.status = FragmentStatus::Stored;

        Ok((summary, column))
    }

    async fn persist_and_index(
        &self,
        payload: &TableSummaryPayload,
        knowledge: &Knowledge,
        fragments: Vec<Fragment>,
        embedder: &Arc<dyn Embedder>,
    ) -> Result<(), AppError> {
        self.fragments.create_many(&fragments).await?;

        let infos: Vec<IndexInfo> = fragments
            .iter()
            .map(|fragment| IndexInfo {
                chunk_id: fragment.id.clone(),
                knowledge_id: fragment.knowledge_id.clone(),
                knowledge_base_id: fragment.knowledge_base_id.clone(),
                content: fragment.content.clone(),
                chunk_type: fragment.chunk_type,
                embedding_model_id: Some(payload.embedding_model.clone()),
            })
            .collect();
        self.retriever.batch_index(embedder, &infos).await?;

        let ids: Vec<String> = fragments.iter().map(|f| f.id.clone()).collect();
        self.fragments
            .update_status(payload.tenant_id, &ids, FragmentStatus::Indexed)
            .await?;
        self.knowledges
            .update_parse_status(
                payload.tenant_id,
                &knowledge.id,
                ParseStatus::Completed,
                None,
            )
            .await?;
        Ok(())
    }

    /// Roll back a half-finished run: mark the knowledge failed and drop the
    /// fragments with their index entries. Each rollback step is best-effort.
    async fn compensate(
        &self,
        payload: &TableSummaryPayload,
        knowledge: &Knowledge,
        fragment_ids: &[String],
        dimensions: usize,
        err: &AppError,
    ) {
        warn!(error = %err, "table summary failed, compensating");

        if let Err(rollback_err) = self
            .knowledges
            .update_parse_status(
                payload.tenant_id,
                &knowledge.id,
                ParseStatus::Failed,
                Some(err.to_string()),
            )
            .await
        {
            warn!(error = %rollback_err, "failed to mark knowledge failed");
        }
        if let Err(rollback_err) = self
            .fragments
            .delete_many(payload.tenant_id, fragment_ids)
            .await
        {
            warn!(error = %rollback_err, "failed to delete summary fragments");
        }
        if let Err(rollback_err) = self
            .retriever
            .delete_by_source_id_list(fragment_ids, dimensions, KnowledgeType::Table)
            .await
        {
            warn!(error = %rollback_err, "failed to delete summary index entries");
        }
    }
}

/// The session is opened, loaded, sampled and released inside one blocking
/// task; `rusqlite` connections never cross an await point.
async fn load_snapshot(knowledge: &Knowledge) -> Result<TableSnapshot, AppError> {
    let file_type = knowledge.file_type.clone();
    let path = PathBuf::from(&knowledge.file_path);
    let knowledge_id = knowledge.id.clone();

    tokio::task::spawn_blocking(move || -> Result<TableSnapshot, AppError> {
        let mut session = TableSession::open(&knowledge_id)?;
        session.load(&file_type, &path)?;
        session.snapshot()
    })
    .await?
}

fn render_table_data(snapshot: &TableSnapshot) -> Result<String, AppError> {
    let mut data = format!("Schema: {}", serde_json::to_string(&snapshot.schema)?);
    data.push_str("\nSample rows:");
    for row in &snapshot.sample_rows {
        data.push('\n');
        data.push_str(&row.join(", "));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use common::mem::{
        InMemoryFragmentRepository, InMemoryKnowledgeRepository, ScriptedChatModel,
        StaticEmbedder, StaticRetriever,
    };
    use common::retrieve::RetrieverType;

    const TABLE_DESCRIPTION: &str = "A staff roster with one row per employee, \
        covering their name, age and performance score across the current review \
        period; useful for headcount and performance questions about the team.";

    struct Fixture {
        handler: TableSummaryHandler,
        knowledges: Arc<InMemoryKnowledgeRepository>,
        fragments: Arc<InMemoryFragmentRepository>,
        vector: Arc<StaticRetriever>,
    }

    fn fixture(failing_index: bool) -> Fixture {
        let knowledges = Arc::new(InMemoryKnowledgeRepository::new());
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        let vector = Arc::new(if failing_index {
            StaticRetriever::failing(RetrieverType::Vector)
        } else {
            StaticRetriever::new(RetrieverType::Vector)
        });

        let model = ScriptedChatModel::new("summary-model")
            .with_rule("Summarize this table", TABLE_DESCRIPTION)
            .with_rule(
                "Describe each column",
                "name: employee name\nage: years, 20-70\nscore: review score, 0-10",
            );
        let registry = Arc::new(
            ModelRegistry::builder()
                .with_chat_model(Arc::new(model))
                .with_embedder(Arc::new(StaticEmbedder::new("embed-small", 8)))
                .build(),
        );
        let retriever = Arc::new(CompositeRetriever::new(vec![
            Arc::clone(&vector) as Arc<dyn common::retrieve::Retriever>
        ]));

        let handler = TableSummaryHandler::new(
            Arc::clone(&knowledges) as Arc<dyn KnowledgeRepository>,
            Arc::clone(&fragments) as Arc<dyn FragmentRepository>,
            registry,
            retriever,
        );

        Fixture {
            handler,
            knowledges,
            fragments,
            vector,
        }
    }

    async fn seed(fixture: &Fixture, file_type: &str) -> TableSummaryPayload {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        file.as_file()
            .write_all(b"name,age,score\nalice,30,9.5\nbob,41,7.25\n")
            .expect("write csv");
        let (_, path) = file.keep().expect("keep file");

        let mut knowledge = Knowledge::new(1, "kb-1", "Roster", KnowledgeType::Table, "embed-small")
            .with_file(
                "roster.csv",
                file_type,
                path.to_string_lossy().as_ref(),
                512,
            );
        knowledge.id = "know-table".into();
        fixture.knowledges.insert(knowledge).await;

        TableSummaryPayload {
            tenant_id: 1,
            knowledge_id: "know-table".into(),
            summary_model: "summary-model".into(),
            embedding_model: "embed-small".into(),
        }
    }

    #[tokio::test]
    async fn builds_linked_summary_and_column_fragments_and_indexes_them() {
        let fixture = fixture(false);
        let payload = seed(&fixture, "csv").await;

        fixture.handler.handle(&payload).await.expect("handle");

        let fragments = fixture.fragments.list_by_knowledge(1, "know-table").await.expect("list");
        assert_eq!(fragments.len(), 2);
        let summary = &fragments[0];
        let column = &fragments[1];
        assert_eq!(summary.chunk_type, ChunkType::TableSummary);
        assert_eq!(summary.chunk_index, 0);
        assert_eq!(column.chunk_type, ChunkType::TableColumn);
        assert_eq!(column.chunk_index, 1);
        assert_eq!(column.parent_chunk_id.as_deref(), Some(summary.id.as_str()));
        assert_eq!(column.pre_chunk_id.as_deref(), Some(summary.id.as_str()));
        assert_eq!(summary.next_chunk_id.as_deref(), Some(column.id.as_str()));
        assert!(fragments
            .iter()
            .all(|f| f.status == FragmentStatus::Indexed));
        assert!(summary.content.contains("staff roster"));

        let indexed = fixture.vector.indexed().await;
        assert_eq!(indexed.len(), 2);
        assert!(indexed
            .iter()
            .all(|info| info.embedding_model_id.as_deref() == Some("embed-small")));

        let knowledge = fixture
            .knowledges
            .get(1, "know-table")
            .await
            .expect("get")
            .expect("knowledge");
        assert_eq!(knowledge.parse_status, ParseStatus::Completed);
    }

    #[tokio::test]
    async fn unsupported_file_type_fails_before_any_model_call() {
        let fixture = fixture(false);
        let payload = seed(&fixture, "parquet").await;

        let outcome = fixture.handler.handle(&payload).await;
        assert!(matches!(outcome, Err(AppError::Unsupported(_))));
        assert_eq!(fixture.fragments.len().await, 0);
    }

    #[tokio::test]
    async fn index_failure_compensates_fragments_and_marks_knowledge_failed() {
        let fixture = fixture(true);
        let payload = seed(&fixture, "csv").await;

        let outcome = fixture.handler.handle(&payload).await;
        assert!(outcome.is_err());

        // Fragments were rolled back and their vector entries deleted.
        assert_eq!(fixture.fragments.len().await, 0);
        let source_deletes = fixture.vector.source_deletes().await;
        assert_eq!(source_deletes.len(), 1);
        assert_eq!(source_deletes[0].0.len(), 2);
        assert_eq!(source_deletes[0].2, KnowledgeType::Table);

        let knowledge = fixture
            .knowledges
            .get(1, "know-table")
            .await
            .expect("get")
            .expect("knowledge");
        assert_eq!(knowledge.parse_status, ParseStatus::Failed);
        assert!(knowledge.error_message.is_some());
    }

    #[tokio::test]
    async fn vanished_knowledge_is_success() {
        let fixture = fixture(false);
        let payload = TableSummaryPayload {
            tenant_id: 1,
            knowledge_id: "ghost".into(),
            summary_model: "summary-model".into(),
            embedding_model: "embed-small".into(),
        };

        fixture.handler.handle(&payload).await.expect("handle");
        assert_eq!(fixture.fragments.len().await, 0);
    }
}
