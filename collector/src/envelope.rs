use axum::http::header::USER_AGENT;
use axum::http::{Extensions, HeaderMap, HeaderValue};
use axum_client_ip::InsecureClientIp;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::CollectorError;
use crate::identity::VisitorIdentity;
use crate::time::epoch_millis;

pub const COLLECTOR_PAYLOAD_SCHEMA: &str =
    "iglu:com.snowplowanalytics.snowplow/CollectorPayload/thrift/1-0-0";
pub const COLLECTOR_NAME: &str = concat!("collector-rs/", env!("CARGO_PKG_VERSION"));

/// Enriched record published downstream, one per reportable request.
///
/// `body` is the request body exactly as received, never re-encoded from the
/// parsed tracker payload, so nothing the SDK sent is lost.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectorPayload {
    pub schema: String,
    pub ip_address: String,
    pub timestamp: i64,
    pub collector: String,
    pub user_agent: String,
    pub body: String,
    pub headers: Vec<String>,
    pub network_user_id: String,
}

/// What the collector observed about the request, besides its body.
pub struct RequestMetadata<'a> {
    pub headers: &'a HeaderMap,
    /// Holds the `ConnectInfo` of the TCP peer when served over a socket
    pub extensions: &'a Extensions,
    pub received_at: OffsetDateTime,
}

impl CollectorPayload {
    pub fn build(
        body: &[u8],
        metadata: &RequestMetadata,
        identity: &VisitorIdentity,
    ) -> Result<CollectorPayload, CollectorError> {
        let body = std::str::from_utf8(body)
            .map_err(|e| CollectorError::SerializationFailure(format!("body: {e}")))?;

        let user_agent = match metadata.headers.get(USER_AGENT) {
            Some(value) => header_str(value)?.to_owned(),
            None => String::new(),
        };

        Ok(CollectorPayload {
            schema: COLLECTOR_PAYLOAD_SCHEMA.to_string(),
            ip_address: client_ip(metadata.headers, metadata.extensions),
            timestamp: epoch_millis(metadata.received_at),
            collector: COLLECTOR_NAME.to_string(),
            user_agent,
            body: body.to_owned(),
            headers: header_lines(metadata.headers)?,
            network_user_id: identity.to_string(),
        })
    }

    pub fn to_message(&self) -> Result<String, CollectorError> {
        serde_json::to_string(self).map_err(|e| CollectorError::SerializationFailure(e.to_string()))
    }
}

fn header_str(value: &HeaderValue) -> Result<&str, CollectorError> {
    std::str::from_utf8(value.as_bytes())
        .map_err(|e| CollectorError::SerializationFailure(format!("header value: {e}")))
}

/// `x-forwarded-for` -> `X-Forwarded-For`
pub fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// One `Name: Value` line per header value, repeated headers yield several lines.
pub fn header_lines(headers: &HeaderMap) -> Result<Vec<String>, CollectorError> {
    headers
        .iter()
        .map(|(name, value)| {
            Ok(format!(
                "{}: {}",
                canonical_header_name(name.as_str()),
                header_str(value)?
            ))
        })
        .collect()
}

/// Client address as seen through the reverse proxy: leftmost `X-Forwarded-For`
/// address, then `X-Real-Ip`, then `Forwarded`, then the TCP peer. Empty when
/// none of them yields an IP.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    InsecureClientIp::from(headers, extensions)
        .map(|InsecureClientIp(ip)| ip.to_string())
        .unwrap_or_default()
}
