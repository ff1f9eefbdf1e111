use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::CollectorError;

/// Tracker payload as posted by the SDKs. Only the shape is checked: `data` must
/// be a list of objects, whatever fields those objects carry.
#[derive(Debug, Default, Deserialize)]
pub struct TrackerPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<HashMap<String, Value>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<HashMap<String, Value>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl TrackerPayload {
    pub fn from_bytes(bytes: &[u8]) -> Result<TrackerPayload, CollectorError> {
        tracing::debug!(len = bytes.len(), "decoding tracker payload");

        // Derived struct visitors also accept JSON arrays, so the top level
        // is checked to be an object first. `null` reads as an empty payload.
        let fields: Option<Map<String, Value>> = serde_json::from_slice(bytes)?;
        match fields {
            Some(fields) => Ok(serde_json::from_value(Value::Object(fields))?),
            None => Ok(TrackerPayload::default()),
        }
    }

    /// Beacons without any data are heartbeats, not worth shipping downstream.
    pub fn is_reportable(&self) -> bool {
        !self.data.is_empty()
    }
}
