//! Turns an event definition into a concrete outbound request.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::catalog::FixtureCatalog;
use crate::error::CatalogError;
use crate::types::{get_header, set_header, EventDefinition, Headers, HttpMethod, OutboundRequest};

const CONTENT_TYPE: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Builds outbound requests from fixtures or caller overrides.
///
/// Base fixtures are sent byte-for-byte. Overrides are always
/// re-serialized as pretty JSON, so their formatting is not preserved.
pub struct RequestBuilder {
    catalog: Arc<dyn FixtureCatalog>,
}

impl RequestBuilder {
    pub fn new(catalog: Arc<dyn FixtureCatalog>) -> Self {
        Self { catalog }
    }

    /// Raw fixture text of an event, exactly as stored.
    pub fn read_fixture(&self, definition: &EventDefinition) -> Result<String, CatalogError> {
        self.catalog.read_fixture(&definition.payload_source)
    }

    pub fn build(
        &self,
        definition: &EventDefinition,
        payload_override: Option<&Value>,
        destination_url: &str,
        caller_headers: &Headers,
    ) -> Result<OutboundRequest, CatalogError> {
        let mut headers = definition.headers.clone();
        for (name, value) in caller_headers {
            set_header(&mut headers, name, value);
        }

        match definition.method {
            HttpMethod::Get => {
                let pairs = match payload_override {
                    Some(payload) => query_pairs(payload),
                    None => {
                        let raw = self.read_fixture(definition)?;
                        serde_json::from_str::<Value>(&raw)
                            .ok()
                            .and_then(|payload| query_pairs(&payload))
                    }
                };

                let url = match pairs {
                    Some(pairs) => append_query(destination_url, &pairs),
                    None => destination_url.to_string(),
                };

                Ok(OutboundRequest {
                    method: HttpMethod::Get,
                    url,
                    headers,
                    body: None,
                })
            }
            HttpMethod::Post => {
                let body = match payload_override {
                    Some(payload) => serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string()),
                    None => self.read_fixture(definition)?,
                };

                if get_header(caller_headers, CONTENT_TYPE).is_none() {
                    set_header(&mut headers, CONTENT_TYPE, JSON_CONTENT_TYPE);
                }

                Ok(OutboundRequest {
                    method: HttpMethod::Post,
                    url: destination_url.to_string(),
                    headers,
                    body: Some(body),
                })
            }
        }
    }
}

/// Flatten the top level of a JSON object into query pairs, skipping nulls.
///
/// Returns `None` when the payload is not an object.
pub fn query_pairs(payload: &Value) -> Option<Vec<(String, String)>> {
    let object = payload.as_object()?;
    let pairs = object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect();
    Some(pairs)
}

fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }

    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().extend_pairs(pairs.iter());
            parsed.to_string()
        }
        Err(_) => {
            let encoded: String = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish();
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{encoded}")
        }
    }
}
