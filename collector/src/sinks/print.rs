use async_trait::async_trait;

use metrics::counter;
use tracing::info;

use crate::api::CollectorError;
use crate::prometheus::EVENTS_PUBLISHED_TOTAL;
use crate::sinks::Publisher;

pub struct PrintPublisher {}

#[async_trait]
impl Publisher for PrintPublisher {
    async fn publish(&self, message: String) -> Result<(), CollectorError> {
        info!("collector payload: {}", message);
        counter!(EVENTS_PUBLISHED_TOTAL).increment(1);

        Ok(())
    }
}
