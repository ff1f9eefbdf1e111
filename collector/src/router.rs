use std::future::ready;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{collect, identity::IdentitySource, sinks, time::TimeSource};

use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub publisher: Arc<dyn sinks::Publisher + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub identities: Arc<dyn IdentitySource + Send + Sync>,
    pub cookie_domain: Option<String>,
}

async fn health() -> StatusCode {
    StatusCode::OK
}

pub fn router<
    TZ: TimeSource + Send + Sync + 'static,
    I: IdentitySource + Send + Sync + 'static,
>(
    timesource: TZ,
    identities: I,
    publisher: Arc<dyn sinks::Publisher + Send + Sync>,
    cookie_domain: Option<String>,
    metrics: bool,
) -> Router {
    let state = State {
        publisher,
        timesource: Arc::new(timesource),
        identities: Arc::new(identities),
        cookie_domain,
    };

    // Every method reaches the handler: the identity cookie is set before
    // non-POST requests get their 403.
    let router = Router::new()
        .route("/health", any(health))
        .route("/api/health", any(health))
        .route("/com.snowplowanalytics.snowplow/tp2", any(collect::collect))
        .route("/i", any(collect::collect))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the collector is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
