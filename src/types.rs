use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header name/value pairs.
///
/// Names are compared case-insensitively when merged through [`set_header`].
pub type Headers = BTreeMap<String, String>;

/// Insert a header, replacing any existing entry whose name differs only by case.
pub fn set_header(headers: &mut Headers, name: &str, value: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}

/// Look up a header by name, ignoring case.
pub fn get_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Identifier of a supported payment gateway.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of gateway IDs with event identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayId(pub String);

impl GatewayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for GatewayId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GatewayId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a persisted log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(pub u64);

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gateway-agnostic classification every gateway event maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonicalEvent {
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
}

impl CanonicalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalEvent::PaymentSucceeded => "payment.succeeded",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Payload travels as a query string; no body.
    Get,
    #[default]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Everything needed to replay one gateway event.
///
/// Produced by a gateway adapter for exactly one event identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDefinition {
    pub canonical_event: CanonicalEvent,

    /// Absolute path of the byte-exact fixture in the catalog.
    pub payload_source: PathBuf,

    /// Static headers declared by the gateway's sidecar file.
    pub headers: Headers,

    pub method: HttpMethod,
}

/// Persisted destination for one gateway.
///
/// `url_final` already embeds query parameters; `url_base` is the
/// same URL without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub gateway: GatewayId,
    pub url_base: String,
    pub url_final: String,
    #[serde(default)]
    pub headers: Headers,
}

impl GatewayConfig {
    /// Build a config from a final URL, deriving the base URL by dropping the query.
    pub fn new(gateway: GatewayId, url_final: impl Into<String>, headers: Headers) -> Self {
        let url_final = url_final.into();
        Self {
            gateway,
            url_base: strip_query(&url_final),
            url_final,
            headers,
        }
    }
}

fn strip_query(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}

/// Delay applied before a dispatch hits the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelaySelector {
    #[default]
    #[serde(rename = "instant")]
    Instant,
    #[serde(rename = "5s")]
    FiveSeconds,
}

impl DelaySelector {
    pub fn delay_ms(&self) -> u64 {
        match self {
            DelaySelector::Instant => 0,
            DelaySelector::FiveSeconds => 5_000,
        }
    }
}

/// Input to a single dispatch attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub gateway: String,

    #[serde(default)]
    pub event: String,

    /// Replaces the fixture when present. An explicit `null` is an override too.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload_override: Option<serde_json::Value>,

    /// Caller-supplied destination; persisted as the gateway's config when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Caller-supplied headers; persisted as the gateway's headers when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<Headers>,

    #[serde(default)]
    pub delay: DelaySelector,
}

impl DispatchRequest {
    pub fn new(gateway: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn with_payload_override(mut self, payload: serde_json::Value) -> Self {
        self.payload_override = Some(payload);
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_extra_headers(mut self, headers: Headers) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    pub fn with_delay(mut self, delay: DelaySelector) -> Self {
        self.delay = delay;
        self
    }
}

/// `Some` whenever the field is present, `null` included; a missing field falls back to `None`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// Concrete request ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    /// Always `None` for GET.
    pub body: Option<String>,
}

/// Outcome of one network attempt as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// True only for HTTP 200.
    pub success: bool,

    /// HTTP status, or 0 when no response was received.
    pub status: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn from_status(status: u16, response_body: Option<String>) -> Self {
        Self {
            success: status == 200,
            status,
            response_body,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 0,
            response_body: None,
            error: Some(error.into()),
        }
    }
}

/// Acknowledgement returned by [`crate::Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DispatchAck {
    /// Instant mode: the attempt already completed.
    Completed(DispatchResult),

    /// Delayed mode: a pending log row exists and will be completed later.
    Queued(QueuedDispatch),
}

impl DispatchAck {
    pub fn is_queued(&self) -> bool {
        matches!(self, DispatchAck::Queued(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedDispatch {
    pub queued: bool,
    pub delay_ms: u64,
    pub log_id: LogId,
}

/// Persisted record of one dispatch attempt.
///
/// A pending row has `http_status == 0` and no error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Assigned by the store on append; ignored on input.
    pub id: LogId,
    pub gateway: GatewayId,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub http_status: u16,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
}

impl LogEntry {
    /// A row for a delayed dispatch that has not hit the network yet.
    pub fn pending(gateway: GatewayId, event: impl Into<String>, url: Option<String>) -> Self {
        Self {
            id: LogId(0),
            gateway,
            event: event.into(),
            timestamp: Utc::now(),
            http_status: 0,
            ok: false,
            response_body: None,
            error: None,
            url,
            headers: None,
        }
    }

    /// A finished row; `ok` is derived from the result.
    pub fn completed(
        gateway: GatewayId,
        event: impl Into<String>,
        result: &DispatchResult,
        url: Option<String>,
        headers: Option<Headers>,
    ) -> Self {
        Self {
            id: LogId(0),
            gateway,
            event: event.into(),
            timestamp: Utc::now(),
            http_status: result.status,
            ok: result.status == 200,
            response_body: result.response_body.clone(),
            error: result.error.clone(),
            url,
            headers,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.http_status == 0 && self.error.is_none()
    }

    pub(crate) fn apply(&mut self, update: &LogUpdate) {
        if let Some(status) = update.http_status {
            self.http_status = status;
        }
        if let Some(ok) = update.ok {
            self.ok = ok;
        }
        if let Some(ref body) = update.response_body {
            self.response_body = Some(body.clone());
        }
        if let Some(ref error) = update.error {
            self.error = Some(error.clone());
        }
        if let Some(ref url) = update.url {
            self.url = Some(url.clone());
        }
        if let Some(ref headers) = update.headers {
            self.headers = Some(headers.clone());
        }
    }
}

/// Partial update applied to an existing log row. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogUpdate {
    pub http_status: Option<u16>,
    pub ok: Option<bool>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub url: Option<String>,
    pub headers: Option<Headers>,
}

impl LogUpdate {
    pub fn completed(result: &DispatchResult, url: Option<String>, headers: Option<Headers>) -> Self {
        Self {
            http_status: Some(result.status),
            ok: Some(result.status == 200),
            response_body: result.response_body.clone(),
            error: result.error.clone(),
            url,
            headers,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            http_status: Some(0),
            ok: Some(false),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Named, reusable payload override for a `(gateway, event)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub gateway: GatewayId,
    pub event: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Input for saving a template. An existing `id` updates that template in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub gateway: GatewayId,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Supported events of one gateway, for the UI metadata query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayMeta {
    pub gateway: GatewayId,
    pub events: Vec<String>,
}
