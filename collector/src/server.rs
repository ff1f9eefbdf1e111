use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::identity::RandomIdentity;
use crate::router;
use crate::sinks::kafka::KafkaPublisher;
use crate::sinks::print::PrintPublisher;
use crate::sinks::Publisher;

pub fn create_publisher(config: &Config) -> anyhow::Result<Arc<dyn Publisher + Send + Sync>> {
    if config.print_sink {
        // Only meant for local debugging
        tracing::warn!("using the print sink, collector payloads will not reach Kafka");
        Ok(Arc::new(PrintPublisher {}))
    } else {
        Ok(Arc::new(KafkaPublisher::new(config.kafka.clone())?))
    }
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let publisher = create_publisher(&config)?;

    let app = router::router(
        crate::time::SystemTime {},
        RandomIdentity {},
        publisher.clone(),
        config.cookie_domain.clone(),
        config.export_prometheus,
    );

    tracing::info!("listening on {:?}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    tracing::info!("HTTP server stopped, flushing publisher");
    if let Err(err) = publisher.flush().await {
        tracing::error!("failed to flush publisher: {}", err);
    }

    Ok(())
}
