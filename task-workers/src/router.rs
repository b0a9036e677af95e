use common::error::AppError;
use common::task::{
    TaskEnvelope, CHUNK_EXTRACT_TASK, KNOWLEDGE_BASE_DELETE_TASK, TABLE_SUMMARY_TASK,
};
use tracing::instrument;

use crate::chunk_extract::ChunkExtractHandler;
use crate::kb_delete::KnowledgeBaseDeleteHandler;
use crate::table_summary::TableSummaryHandler;

/// Dispatches dequeued envelopes to their handlers.
///
/// The queue consumer owns retry bookkeeping; an `Err` here means
/// "redeliver", an `Ok` means the task is finished for good.
pub struct TaskRouter {
    chunk_extract: ChunkExtractHandler,
    knowledge_base_delete: KnowledgeBaseDeleteHandler,
    table_summary: TableSummaryHandler,
}

impl TaskRouter {
    pub fn new(
        chunk_extract: ChunkExtractHandler,
        knowledge_base_delete: KnowledgeBaseDeleteHandler,
        table_summary: TableSummaryHandler,
    ) -> Self {
        Self {
            chunk_extract,
            knowledge_base_delete,
            table_summary,
        }
    }

    #[instrument(skip(self, envelope), fields(task_type = %envelope.task_type, queue = %envelope.queue))]
    pub async fn dispatch(&self, envelope: &TaskEnvelope) -> Result<(), AppError> {
        match envelope.task_type.as_str() {
            CHUNK_EXTRACT_TASK => self.chunk_extract.handle(&envelope.decode()?).await,
            KNOWLEDGE_BASE_DELETE_TASK => {
                self.knowledge_base_delete.handle(&envelope.decode()?).await
            }
            TABLE_SUMMARY_TASK => self.table_summary.handle(&envelope.decode()?).await,
            other => Err(AppError::Validation(format!("unknown task type {other}"))),
        }
    }
}
