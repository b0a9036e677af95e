use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;

/// Per-request context shared by every stage of a pipeline run.
///
/// Carries the tenant scope, a request id for log correlation, an optional
/// deadline and a cancellation token. External calls are expected to call
/// [`RequestContext::ensure_active`] at their suspension points.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: u64,
    pub request_id: String,
    pub deadline: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(tenant_id: u64) -> Self {
        Self {
            tenant_id,
            request_id: Uuid::new_v4().to_string(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Token handed to spawned sub-tasks so a caller-side cancel reaches them.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        self.deadline.is_some_and(|deadline| Utc::now() > deadline)
    }

    pub fn ensure_active(&self) -> Result<(), AppError> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }
}
