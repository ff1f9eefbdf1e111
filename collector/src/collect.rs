use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, error, instrument, warn, Level, Span};

use crate::api::CollectorError;
use crate::envelope::{CollectorPayload, RequestMetadata};
use crate::identity::{identity_cookie, resolve_identity, set_cookie_header, VisitorIdentity};
use crate::payload::TrackerPayload;
use crate::prometheus::{report_dropped_events, EVENTS_FILTERED_TOTAL, EVENTS_RECEIVED_TOTAL};
use crate::router;

// Compact policy, older IE versions refuse third-party cookies without it
const P3P: &str = "p3p";
const P3P_POLICY: &str = r#"policyref="/w3c/p3p.xml", CP="NOI DSP COR NID PSA OUR IND COM NAV STA""#;

/// How a structurally valid POST ended. All of them answer 200.
#[derive(Debug, PartialEq, Eq)]
pub enum CollectOutcome {
    /// No `data` in the beacon, nothing to publish
    Filtered,
    Published,
    /// Lost after acceptance, serialization or publish failed
    Dropped,
}

impl CollectOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CollectOutcome::Filtered => "filtered",
            CollectOutcome::Published => "published",
            CollectOutcome::Dropped => "dropped",
        }
    }
}

#[instrument(skip_all, fields(method, user_agent, outcome))]
pub async fn collect(State(state): State<router::State>, request: Request) -> Response {
    let received_at = state.timesource.current_time();
    let (parts, body) = request.into_parts();
    let (method, headers) = (parts.method, parts.headers);

    let user_agent = headers
        .get(USER_AGENT)
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"));
    Span::current().record("method", method.as_str());
    Span::current().record("user_agent", user_agent);

    // The cookie is refreshed on every response, whatever the method or outcome
    let identity = resolve_identity(&headers, state.identities.as_ref());
    let cookie = identity_cookie(&identity, state.cookie_domain.as_deref(), received_at);

    let mut response_headers = HeaderMap::new();
    if let Some(value) = set_cookie_header(&cookie) {
        response_headers.insert(SET_COOKIE, value);
    }
    response_headers.insert(
        HeaderName::from_static(P3P),
        HeaderValue::from_static(P3P_POLICY),
    );

    let result = if method == Method::POST {
        let metadata = RequestMetadata {
            headers: &headers,
            extensions: &parts.extensions,
            received_at,
        };
        process_post(&state, &metadata, &identity, body).await
    } else {
        Err(CollectorError::UnsupportedMethod(method.to_string()))
    };

    match result {
        Ok(outcome) => {
            Span::current().record("outcome", outcome.as_str());
            (response_headers, StatusCode::OK).into_response()
        }
        Err(err) => {
            Span::current().record("outcome", err.to_metric_tag());
            if err.log_level() == Level::DEBUG {
                debug!("collect: {}", err);
            } else {
                warn!("collect: rejected request: {}", err);
            }
            (response_headers, err).into_response()
        }
    }
}

/// Reads, validates and publishes one POSTed beacon. Only client errors are
/// returned, anything failing after validation is logged and swallowed.
pub async fn process_post(
    state: &router::State,
    metadata: &RequestMetadata<'_>,
    identity: &VisitorIdentity,
    body: Body,
) -> Result<CollectOutcome, CollectorError> {
    // A client disconnecting mid-body ends up here, nothing gets published
    let body = to_bytes(body, usize::MAX).await.map_err(|e| {
        report_dropped_events("body_read", 1);
        CollectorError::BodyReadError(e.to_string())
    })?;

    // Parsing only decides whether the beacon is worth shipping, the envelope
    // carries the raw bytes.
    let payload = TrackerPayload::from_bytes(&body).map_err(|err| {
        report_dropped_events("malformed_payload", 1);
        err
    })?;
    counter!(EVENTS_RECEIVED_TOTAL).increment(1);

    if !payload.is_reportable() {
        debug!("collect: filtered beacon without data");
        counter!(EVENTS_FILTERED_TOTAL).increment(1);
        return Ok(CollectOutcome::Filtered);
    }

    let message =
        match CollectorPayload::build(&body, metadata, identity).and_then(|p| p.to_message()) {
            Ok(message) => message,
            Err(err) => {
                report_dropped_events(err.to_metric_tag(), 1);
                error!("collect: dropping event: {}", err);
                return Ok(CollectOutcome::Dropped);
            }
        };

    if let Err(err) = state.publisher.publish(message).await {
        error!("collect: dropping event: {}", err);
        return Ok(CollectOutcome::Dropped);
    }

    Ok(CollectOutcome::Published)
}
