use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::destination::Destination;
use crate::registry::AdapterRegistry;
use crate::request::RequestBuilder;
use crate::storage::Storage;
use crate::types::{DispatchResult, GatewayId, HttpMethod, LogId, LogUpdate, OutboundRequest};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
fn metric_inc_gateway(name: &'static str, gateway: &GatewayId) {
    metrics::increment_counter!(name, "gateway" => gateway.0.clone());
}

#[cfg(not(feature = "metrics"))]
fn metric_inc_gateway(_name: &'static str, _gateway: &GatewayId) {}

#[cfg(feature = "tracing")]
fn trace_delivery(request: &OutboundRequest, result: &DispatchResult) {
    match result.error {
        Some(ref error) => tracing::warn!(
            method = request.method.as_str(),
            url = %request.url,
            error = %error,
            "webhook delivery failed"
        ),
        None => tracing::info!(
            method = request.method.as_str(),
            url = %request.url,
            status = result.status,
            "webhook delivered"
        ),
    }
}

#[cfg(not(feature = "tracing"))]
fn trace_delivery(_request: &OutboundRequest, _result: &DispatchResult) {}

#[cfg(feature = "tracing")]
fn trace_log_write(log_id: LogId, message: &'static str) {
    tracing::warn!(log_id = %log_id, message);
}

#[cfg(not(feature = "tracing"))]
fn trace_log_write(_log_id: LogId, _message: &'static str) {}

/// A delayed dispatch waiting to complete its pending log row.
#[derive(Debug, Clone)]
pub struct Task {
    pub log_id: LogId,
    pub gateway: GatewayId,
    pub event: String,
    pub payload_override: Option<Value>,
    pub destination: Destination,
    pub delay: Duration,
}

/// Shared, read-only context for deferred tasks.
pub struct WorkerContext {
    /// Immutable gateway adapters.
    pub registry: Arc<AdapterRegistry>,

    pub builder: RequestBuilder,

    /// Where deferred tasks write their outcome.
    pub storage: Arc<dyn Storage>,

    pub http_client: reqwest::Client,
}

/// Complete a delayed dispatch.
///
/// Runs detached from the caller. Every failure ends up in the task's
/// log row; nothing is returned.
pub async fn run_deferred(task: Task, ctx: Arc<WorkerContext>) {
    tokio::time::sleep(task.delay).await;

    let update = match build_request(&task, &ctx) {
        Ok(request) => {
            let result = deliver(&ctx.http_client, &request).await;
            record_outcome(&task.gateway, &result);
            LogUpdate::completed(&result, Some(request.url), Some(request.headers))
        }
        Err(message) => {
            metric_inc("webhook.delivery.aborted");
            LogUpdate::failed(message)
        }
    };

    match ctx.storage.update_log(task.log_id, &update).await {
        Ok(true) => {}
        Ok(false) => trace_log_write(task.log_id, "pending log row evicted before completion"),
        Err(_) => trace_log_write(task.log_id, "failed to complete pending log row"),
    }
}

fn build_request(task: &Task, ctx: &WorkerContext) -> Result<OutboundRequest, String> {
    let adapter = ctx
        .registry
        .get(task.gateway.as_str())
        .ok_or_else(|| format!("gateway \"{}\" not found", task.gateway))?;
    let definition = adapter
        .resolve_event(&task.event)
        .ok_or_else(|| format!("event \"{}\" not found for gateway \"{}\"", task.event, task.gateway))?;

    ctx.builder
        .build(
            &definition,
            task.payload_override.as_ref(),
            &task.destination.url,
            &task.destination.headers,
        )
        .map_err(|e| e.to_string())
}

pub(crate) fn record_outcome(gateway: &GatewayId, result: &DispatchResult) {
    if result.error.is_some() {
        metric_inc("webhook.delivery.failure");
        metric_inc_gateway("webhook.delivery.failure.gateway", gateway);
    } else if result.success {
        metric_inc("webhook.delivery.success");
        metric_inc_gateway("webhook.delivery.success.gateway", gateway);
    } else {
        metric_inc("webhook.delivery.rejected");
        metric_inc_gateway("webhook.delivery.rejected.gateway", gateway);
    }
}

/// Send one request. Exactly one attempt; no retries.
///
/// Transport failures are folded into the result with status 0.
pub async fn deliver(client: &reqwest::Client, request: &OutboundRequest) -> DispatchResult {
    let method = match request.method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
    };

    let mut builder = client.request(method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(ref body) = request.body {
        builder = builder.body(body.clone());
    }

    let result = match builder.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.ok();
            DispatchResult::from_status(status, body)
        }
        Err(err) => DispatchResult::failed(describe_transport_error(&err)),
    };

    trace_delivery(request, &result);
    result
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
