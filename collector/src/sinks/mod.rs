use async_trait::async_trait;

use crate::api::CollectorError;

pub mod kafka;
pub mod print;

/// Hands serialized collector payloads to the message bus.
///
/// Shared by every in-flight request, implementations must be safe to call
/// concurrently. Returning `Ok` means the message was accepted for delivery,
/// retries past that point are the transport's business.
#[async_trait]
pub trait Publisher {
    async fn publish(&self, message: String) -> Result<(), CollectorError>;

    /// Waits for queued messages to leave the process, called on shutdown.
    async fn flush(&self) -> Result<(), CollectorError> {
        Ok(())
    }
}
