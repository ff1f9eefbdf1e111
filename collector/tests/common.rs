#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use collector::api::CollectorError;
use collector::envelope::CollectorPayload;
use collector::identity::IdentitySource;
use collector::router::router;
use collector::sinks::Publisher;
use collector::time::TimeSource;
use http_body_util::BodyExt;
use time::macros::datetime;
use time::OffsetDateTime;
use tower::ServiceExt;

pub const TRACKER_PATH: &str = "/com.snowplowanalytics.snowplow/tp2";
pub const ALIAS_PATH: &str = "/i";

#[derive(Clone)]
pub struct FixedTime {
    pub time: OffsetDateTime,
}

impl Default for FixedTime {
    fn default() -> Self {
        FixedTime {
            time: datetime!(2026-10-17 08:30:00.250 UTC),
        }
    }
}

impl TimeSource for FixedTime {
    fn current_time(&self) -> OffsetDateTime {
        self.time
    }
}

/// Mints `minted-0`, `minted-1`...
#[derive(Clone, Default)]
pub struct SequentialIdentity {
    next: Arc<AtomicUsize>,
}

impl IdentitySource for SequentialIdentity {
    fn mint(&self) -> String {
        format!("minted-{}", self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Default)]
pub struct MemoryPublisher {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemoryPublisher {
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn envelopes(&self) -> Vec<CollectorPayload> {
        self.messages()
            .iter()
            .map(|m| serde_json::from_str(m).expect("published message is not an envelope"))
            .collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, message: String) -> Result<(), CollectorError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FailingPublisher {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _message: String) -> Result<(), CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CollectorError::PublishFailure("broker unavailable".to_string()))
    }
}

pub fn app<P: Publisher + Send + Sync + 'static>(publisher: P) -> Router {
    router(
        FixedTime::default(),
        SequentialIdentity::default(),
        Arc::new(publisher),
        Some("example.com".to_string()),
        false,
    )
}

pub fn post(path: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get("set-cookie")
        .expect("no set-cookie header")
        .to_str()
        .unwrap()
        .to_string()
}
