use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::task::{TaskEnvelope, TaskQueue};

#[derive(Default)]
pub struct InMemoryTaskQueue {
    tasks: RwLock<Vec<TaskEnvelope>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<TaskEnvelope> {
        std::mem::take(&mut *self.tasks.write().await)
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: TaskEnvelope) -> Result<(), AppError> {
        self.tasks.write().await.push(task);
        Ok(())
    }
}
