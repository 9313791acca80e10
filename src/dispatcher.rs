use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{FixtureCatalog, FsCatalog};
use crate::destination::{ContainerProbe, DestinationResolver, SystemProbe, DEFAULT_BRIDGE_HOST};
use crate::error::DispatchError;
use crate::registry::AdapterRegistry;
use crate::request::RequestBuilder;
use crate::storage::{InMemoryStorage, Storage};
use crate::types::{
    DispatchAck, DispatchRequest, DispatchResult, GatewayConfig, GatewayId, GatewayMeta, Headers,
    LogEntry, NewTemplate, QueuedDispatch, Template,
};
use crate::worker::{deliver, record_outcome, run_deferred, Task, WorkerContext};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_dispatch(message: &'static str, gateway: &str, event: &str) {
    tracing::info!(gateway, event, message);
}

#[cfg(not(feature = "tracing"))]
fn trace_dispatch(_message: &'static str, _gateway: &str, _event: &str) {}

#[cfg(feature = "tracing")]
fn trace_rejected(error: &DispatchError) {
    tracing::debug!(error = %error, "dispatch rejected");
}

#[cfg(not(feature = "tracing"))]
fn trace_rejected(_error: &DispatchError) {}

pub const CATALOG_DIR_ENV: &str = "WEBHOOK_SIM_CATALOG_DIR";
pub const REQUEST_TIMEOUT_ENV: &str = "WEBHOOK_SIM_REQUEST_TIMEOUT_MS";
pub const BRIDGE_HOST_ENV: &str = "WEBHOOK_SIM_BRIDGE_HOST";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Root of the fixture catalog: `<root>/<gateway>/payloads/*.json`.
    pub catalog_dir: PathBuf,

    /// Maximum time allowed for a single delivery attempt.
    pub request_timeout: Duration,

    /// Host that replaces loopback destinations inside a container.
    pub bridge_host: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("gateways"),
            request_timeout: Duration::from_secs(30),
            bridge_host: DEFAULT_BRIDGE_HOST.to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by `WEBHOOK_SIM_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(CATALOG_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.catalog_dir = PathBuf::from(dir.trim());
            }
        }

        if let Some(ms) = std::env::var(REQUEST_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_millis(ms);
        }

        if let Ok(host) = std::env::var(BRIDGE_HOST_ENV) {
            if !host.trim().is_empty() {
                config.bridge_host = host.trim().to_string();
            }
        }

        config
    }
}

/// Webhook dispatch engine.
///
/// Resolves a `(gateway, event)` pair, builds the outbound request, sends it
/// now or after the selected delay, and records every attempt in the log store.
pub struct Dispatcher {
    ctx: Arc<WorkerContext>,
    resolver: DestinationResolver,
    storage: Arc<dyn Storage>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Filesystem catalog, built-in gateways, in-memory storage.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let catalog: Arc<dyn FixtureCatalog> = Arc::new(FsCatalog::new());
        let registry = AdapterRegistry::builtin(&config.catalog_dir, catalog.clone());
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        Self::with_parts(config, Arc::new(registry), catalog, storage, Arc::new(SystemProbe))
    }

    pub fn with_parts(
        config: DispatcherConfig,
        registry: Arc<AdapterRegistry>,
        catalog: Arc<dyn FixtureCatalog>,
        storage: Arc<dyn Storage>,
        probe: Arc<dyn ContainerProbe>,
    ) -> Result<Self, DispatchError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DispatchError::ClientInit(e.to_string()))?;

        let ctx = Arc::new(WorkerContext {
            registry,
            builder: RequestBuilder::new(catalog),
            storage: storage.clone(),
            http_client,
        });

        Ok(Self {
            ctx,
            resolver: DestinationResolver::new(storage.clone(), probe, config.bridge_host.clone()),
            storage,
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.ctx.registry
    }

    /// Decode a JSON request body and dispatch it.
    pub async fn dispatch_json(&self, body: &str) -> Result<DispatchAck, DispatchError> {
        let request: DispatchRequest = serde_json::from_str(body).map_err(|e| {
            DispatchError::InvalidRequest {
                reason: format!("invalid JSON body: {e}"),
            }
        })?;
        self.dispatch(request).await
    }

    /// Dispatch one webhook.
    ///
    /// Configuration errors are returned before any log row exists. Transport
    /// failures never surface here; they are recorded in the attempt's log row.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchAck, DispatchError> {
        let result = self.dispatch_inner(request).await;
        if let Err(ref err) = result {
            if err.is_client_error() {
                metric_inc("webhook.dispatch.rejected");
            }
            trace_rejected(err);
        }
        result
    }

    async fn dispatch_inner(&self, request: DispatchRequest) -> Result<DispatchAck, DispatchError> {
        let gateway = request.gateway.trim();
        let event = request.event.trim();
        if gateway.is_empty() {
            return Err(DispatchError::MissingField { field: "gateway" });
        }
        if event.is_empty() {
            return Err(DispatchError::MissingField { field: "event" });
        }

        let adapter = self
            .ctx
            .registry
            .get(gateway)
            .ok_or_else(|| DispatchError::UnknownGateway {
                gateway: GatewayId::new(gateway),
            })?;
        let gateway = adapter.gateway().clone();
        let definition = adapter
            .resolve_event(event)
            .ok_or_else(|| DispatchError::UnknownEvent {
                gateway: gateway.clone(),
                event: event.to_string(),
            })?;

        let destination = self
            .resolver
            .resolve(
                &gateway,
                request.webhook_url.as_deref(),
                request.extra_headers.as_ref(),
            )
            .await?;

        let delay_ms = request.delay.delay_ms();
        if delay_ms > 0 {
            let pending = LogEntry::pending(gateway.clone(), event, Some(destination.url.clone()));
            let log_id = self.storage.append_log(pending).await?;

            trace_dispatch("webhook.dispatch.queued", gateway.as_str(), event);
            let task = Task {
                log_id,
                gateway,
                event: event.to_string(),
                payload_override: request.payload_override,
                destination,
                delay: Duration::from_millis(delay_ms),
            };
            tokio::spawn(run_deferred(task, self.ctx.clone()));

            metric_inc("webhook.dispatch.queued");
            return Ok(DispatchAck::Queued(QueuedDispatch {
                queued: true,
                delay_ms,
                log_id,
            }));
        }

        let (result, url, headers) = match self.ctx.builder.build(
            &definition,
            request.payload_override.as_ref(),
            &destination.url,
            &destination.headers,
        ) {
            Ok(outbound) => {
                let result = deliver(&self.ctx.http_client, &outbound).await;
                (result, outbound.url, Some(outbound.headers))
            }
            Err(err) => (DispatchResult::failed(err.to_string()), destination.url, None),
        };
        record_outcome(&gateway, &result);

        let entry = LogEntry::completed(gateway.clone(), event, &result, Some(url), headers);
        self.storage.append_log(entry).await?;

        metric_inc("webhook.dispatch.completed");
        trace_dispatch("webhook.dispatch.completed", gateway.as_str(), event);
        Ok(DispatchAck::Completed(result))
    }

    /// Supported events of every gateway.
    pub fn gateway_metadata(&self) -> Vec<GatewayMeta> {
        self.ctx.registry.metadata()
    }

    /// Raw, unparsed base payload of a `(gateway, event)` pair.
    pub fn base_payload(&self, gateway: &str, event: &str) -> Result<String, DispatchError> {
        let adapter = self
            .ctx
            .registry
            .get(gateway)
            .ok_or_else(|| DispatchError::UnknownGateway {
                gateway: GatewayId::new(gateway),
            })?;
        let definition = adapter
            .resolve_event(event)
            .ok_or_else(|| DispatchError::UnknownEvent {
                gateway: adapter.gateway().clone(),
                event: event.to_string(),
            })?;
        Ok(self.ctx.builder.read_fixture(&definition)?)
    }

    /// Persist the destination of a gateway. `url` is the final URL, query included.
    ///
    /// Headers are left untouched when `headers` is `None`.
    pub async fn save_gateway_config(
        &self,
        gateway: &str,
        url: &str,
        headers: Option<Headers>,
    ) -> Result<GatewayConfig, DispatchError> {
        let gateway = gateway.trim();
        if gateway.is_empty() {
            return Err(DispatchError::MissingField { field: "gateway" });
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(DispatchError::MissingField { field: "url" });
        }

        let gateway = GatewayId::new(gateway);
        let headers = match headers {
            Some(headers) => headers,
            None => self
                .storage
                .gateway_config(&gateway)
                .await?
                .map(|config| config.headers)
                .unwrap_or_default(),
        };

        let config = GatewayConfig::new(gateway, url, headers);
        self.storage.save_gateway_config(&config).await?;
        Ok(config)
    }

    pub async fn gateway_config(&self, gateway: &str) -> Result<Option<GatewayConfig>, DispatchError> {
        Ok(self.storage.gateway_config(&GatewayId::new(gateway)).await?)
    }

    pub async fn gateway_configs(&self) -> Result<Vec<GatewayConfig>, DispatchError> {
        Ok(self.storage.gateway_configs().await?)
    }

    /// Most recent first, at most 100 rows.
    pub async fn logs(&self) -> Result<Vec<LogEntry>, DispatchError> {
        Ok(self.storage.list_logs().await?)
    }

    pub async fn clear_logs(&self) -> Result<(), DispatchError> {
        Ok(self.storage.clear_logs().await?)
    }

    pub async fn templates(&self) -> Result<Vec<Template>, DispatchError> {
        Ok(self.storage.templates().await?)
    }

    pub async fn templates_for_event(&self, gateway: &str, event: &str) -> Result<Vec<Template>, DispatchError> {
        Ok(self
            .storage
            .templates_for_event(&GatewayId::new(gateway), event)
            .await?)
    }

    pub async fn template(&self, id: &str) -> Result<Option<Template>, DispatchError> {
        Ok(self.storage.template(id).await?)
    }

    /// Save a template after checking that name, gateway, event and payload are present.
    pub async fn save_template(&self, template: NewTemplate) -> Result<Template, DispatchError> {
        if template.name.trim().is_empty() {
            return Err(DispatchError::MissingField { field: "name" });
        }
        if template.gateway.as_str().trim().is_empty() {
            return Err(DispatchError::MissingField { field: "gateway" });
        }
        if template.event.trim().is_empty() {
            return Err(DispatchError::MissingField { field: "event" });
        }
        if template.payload.is_null() {
            return Err(DispatchError::MissingField { field: "payload" });
        }
        Ok(self.storage.save_template(template).await?)
    }

    pub async fn delete_template(&self, id: &str) -> Result<bool, DispatchError> {
        Ok(self.storage.delete_template(id).await?)
    }
}
