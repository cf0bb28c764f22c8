use neighbourly_domain::notifications::NotificationEvent;
use neighbourly_domain::ports::BoxFuture;
use neighbourly_domain::ports::notifications::{NotificationPort, NotifyError};
use neighbourly_domain::util::format_ms_rfc3339;
use tracing::info;

/// Writes every event to the log instead of delivering it anywhere. Stands in
/// for a real channel (email, push) during development and in tests.
#[derive(Clone, Debug, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationPort for LoggingNotifier {
    fn notify(&self, event: NotificationEvent) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            info!(
                kind = event.kind.as_str(),
                recipient_id = %event.recipient_id,
                source_id = event.source_id.as_deref().unwrap_or(""),
                created_at = %format_ms_rfc3339(event.created_at_ms),
                context = %event.context,
                "notification dispatched"
            );
            Ok(())
        })
    }
}
