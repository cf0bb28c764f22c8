use thiserror::Error;

use crate::notifications::NotificationEvent;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Best-effort outbound notifications. Callers log failures and move on; a
/// delivery error never propagates to the operation that produced the event.
pub trait NotificationPort: Send + Sync {
    fn notify(&self, event: NotificationEvent) -> BoxFuture<'_, Result<(), NotifyError>>;
}
