use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{headers_path, payloads_dir, FixtureCatalog};
use crate::types::{CanonicalEvent, EventDefinition, GatewayId, Headers, HttpMethod};

#[cfg(feature = "tracing")]
fn trace_degraded_headers(gateway: &GatewayId, reason: &str) {
    tracing::debug!(gateway = %gateway, reason, "header sidecar unavailable, using no static headers");
}

#[cfg(not(feature = "tracing"))]
fn trace_degraded_headers(_gateway: &GatewayId, _reason: &str) {}

const FIXTURE_EXTENSION: &str = ".json";

/// Maps one gateway's event identifiers to replayable definitions.
///
/// Adapters are immutable after construction and share no state.
pub trait GatewayAdapter: Send + Sync {
    fn gateway(&self) -> &GatewayId;

    /// Supported event identifiers.
    fn list_events(&self) -> Vec<String>;

    /// `None` when the event is not supported.
    fn resolve_event(&self, event: &str) -> Option<EventDefinition>;
}

/// How an adapter picks the HTTP method for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRule {
    AlwaysPost,

    /// Notification-style events (matching the prefix) go out as GET.
    GetForPrefix(&'static str),
}

impl MethodRule {
    pub fn method_for(&self, event: &str) -> HttpMethod {
        match self {
            MethodRule::AlwaysPost => HttpMethod::Post,
            MethodRule::GetForPrefix(prefix) if event.starts_with(prefix) => HttpMethod::Get,
            MethodRule::GetForPrefix(_) => HttpMethod::Post,
        }
    }
}

/// One entry of a hard-coded event list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEvent {
    pub event: &'static str,
    pub fixture: &'static str,
    pub method: Option<HttpMethod>,
}

impl CatalogEvent {
    pub const fn new(event: &'static str, fixture: &'static str) -> Self {
        Self {
            event,
            fixture,
            method: None,
        }
    }

    pub const fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }
}

/// Adapter with a finite, hard-coded list of events.
pub struct FixedCatalogAdapter {
    gateway: GatewayId,
    payloads_dir: PathBuf,
    events: Vec<CatalogEvent>,
    headers: Headers,
}

impl FixedCatalogAdapter {
    pub fn new(
        gateway: impl Into<String>,
        catalog_root: &Path,
        events: Vec<CatalogEvent>,
        catalog: &dyn FixtureCatalog,
    ) -> Self {
        let gateway = GatewayId(gateway.into());
        let headers = load_headers(&gateway, catalog_root, catalog);
        Self {
            payloads_dir: payloads_dir(catalog_root, gateway.as_str()),
            gateway,
            events,
            headers,
        }
    }
}

impl GatewayAdapter for FixedCatalogAdapter {
    fn gateway(&self) -> &GatewayId {
        &self.gateway
    }

    fn list_events(&self) -> Vec<String> {
        self.events.iter().map(|e| e.event.to_string()).collect()
    }

    fn resolve_event(&self, event: &str) -> Option<EventDefinition> {
        let entry = self.events.iter().find(|e| e.event == event)?;
        Some(EventDefinition {
            canonical_event: CanonicalEvent::PaymentSucceeded,
            payload_source: self.payloads_dir.join(entry.fixture),
            headers: self.headers.clone(),
            method: entry.method.unwrap_or_default(),
        })
    }
}

/// Adapter whose events are whatever fixtures exist in its payload directory.
pub struct DirectoryScanAdapter {
    gateway: GatewayId,
    payloads_dir: PathBuf,
    method_rule: MethodRule,
    headers: Headers,
    catalog: Arc<dyn FixtureCatalog>,
}

impl DirectoryScanAdapter {
    pub fn new(
        gateway: impl Into<String>,
        catalog_root: &Path,
        method_rule: MethodRule,
        catalog: Arc<dyn FixtureCatalog>,
    ) -> Self {
        let gateway = GatewayId(gateway.into());
        let headers = load_headers(&gateway, catalog_root, catalog.as_ref());
        Self {
            payloads_dir: payloads_dir(catalog_root, gateway.as_str()),
            gateway,
            method_rule,
            headers,
            catalog,
        }
    }
}

impl GatewayAdapter for DirectoryScanAdapter {
    fn gateway(&self) -> &GatewayId {
        &self.gateway
    }

    fn list_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .catalog
            .list_files(&self.payloads_dir)
            .into_iter()
            .filter(|name| !name.starts_with('.'))
            .filter_map(|name| name.strip_suffix(FIXTURE_EXTENSION).map(str::to_string))
            .filter(|event| !event.is_empty())
            .collect();
        events.sort();
        events
    }

    fn resolve_event(&self, event: &str) -> Option<EventDefinition> {
        if !is_plain_event_name(event) {
            return None;
        }

        let payload_source = self.payloads_dir.join(format!("{event}{FIXTURE_EXTENSION}"));
        if !self.catalog.exists(&payload_source) {
            return None;
        }

        Some(EventDefinition {
            canonical_event: CanonicalEvent::PaymentSucceeded,
            payload_source,
            headers: self.headers.clone(),
            method: self.method_rule.method_for(event),
        })
    }
}

/// Event names map to file names; anything that could escape the directory is rejected.
fn is_plain_event_name(event: &str) -> bool {
    !event.is_empty()
        && !event.starts_with('.')
        && !event.contains("..")
        && !event.contains('/')
        && !event.contains('\\')
}

/// Load a gateway's static headers, degrading to none on any failure.
fn load_headers(gateway: &GatewayId, catalog_root: &Path, catalog: &dyn FixtureCatalog) -> Headers {
    let path = headers_path(catalog_root, gateway.as_str());
    let content = match catalog.read_fixture(&path) {
        Ok(content) => content,
        Err(err) => {
            trace_degraded_headers(gateway, &err.to_string());
            return Headers::new();
        }
    };

    match serde_json::from_str::<Headers>(&content) {
        Ok(headers) => headers,
        Err(err) => {
            trace_degraded_headers(gateway, &err.to_string());
            Headers::new()
        }
    }
}
