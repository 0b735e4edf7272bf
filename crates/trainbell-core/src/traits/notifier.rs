use async_trait::async_trait;

use crate::error::Result;
use crate::slot::NotificationEvent;

/// Broadcast push channel.
///
/// One call is one delivery attempt: no retry, no batching. An `Err` means
/// the message may not have been delivered and must surface to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}
