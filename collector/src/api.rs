use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::Level;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to read request body: {0}")]
    BodyReadError(String),
    #[error("failed to parse tracker payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("failed to serialize collector payload: {0}")]
    SerializationFailure(String),
    #[error("failed to publish collector payload: {0}")]
    PublishFailure(String),

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),
}

impl CollectorError {
    pub fn to_metric_tag(&self) -> &'static str {
        match self {
            CollectorError::BodyReadError(_) => "body_read",
            CollectorError::MalformedPayload(_) => "malformed_payload",
            CollectorError::SerializationFailure(_) => "serialization",
            CollectorError::PublishFailure(_) => "publish_enqueue",
            CollectorError::UnsupportedMethod(_) => "unsupported_method",
        }
    }

    /// Level a rejected request is logged at. Non-POST hits are mostly CORS
    /// preflights and crawlers.
    pub fn log_level(&self) -> Level {
        match self {
            CollectorError::UnsupportedMethod(_) => Level::DEBUG,
            CollectorError::BodyReadError(_) | CollectorError::MalformedPayload(_) => Level::WARN,
            CollectorError::SerializationFailure(_) | CollectorError::PublishFailure(_) => {
                Level::ERROR
            }
        }
    }
}

/// Clients only ever get a status code back, the body stays empty.
impl IntoResponse for CollectorError {
    fn into_response(self) -> Response {
        match self {
            CollectorError::BodyReadError(_) | CollectorError::MalformedPayload(_) => {
                StatusCode::BAD_REQUEST
            }

            CollectorError::UnsupportedMethod(_) => StatusCode::FORBIDDEN,

            // Both are swallowed by the endpoint before a response is built, the
            // event is lost but the client was already told it was accepted.
            CollectorError::SerializationFailure(_) | CollectorError::PublishFailure(_) => {
                StatusCode::OK
            }
        }
        .into_response()
    }
}
