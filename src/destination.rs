//! Destination resolution: where a dispatch goes and with which caller headers.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use url::Url;

use crate::error::DispatchError;
use crate::storage::Storage;
use crate::types::{GatewayConfig, GatewayId, Headers};

#[cfg(feature = "tracing")]
fn trace_rewrite(from: &str, to: &str) {
    tracing::debug!(from, to, "rewrote loopback destination for container runtime");
}

#[cfg(not(feature = "tracing"))]
fn trace_rewrite(_from: &str, _to: &str) {}

/// Default alias containers use to reach the host.
pub const DEFAULT_BRIDGE_HOST: &str = "host.docker.internal";

const LOOPBACK_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "[::1]"];

/// Answers whether this process runs inside a container runtime.
pub trait ContainerProbe: Send + Sync {
    fn is_containerized(&self) -> bool;
}

/// Probe that inspects the host filesystem once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

static CONTAINERIZED: OnceLock<bool> = OnceLock::new();

impl ContainerProbe for SystemProbe {
    fn is_containerized(&self) -> bool {
        *CONTAINERIZED.get_or_init(detect_container)
    }
}

fn detect_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    match std::fs::read_to_string("/proc/1/cgroup") {
        Ok(cgroup) => cgroup.contains("docker") || cgroup.contains("containerd"),
        Err(_) => false,
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl ContainerProbe for StaticProbe {
    fn is_containerized(&self) -> bool {
        self.0
    }
}

/// Final destination of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub headers: Headers,
}

/// Merges caller-supplied destination data with persisted gateway config.
///
/// Caller input is the source of truth: a non-empty URL or any header map
/// given by the caller is written back to the gateway's config.
pub struct DestinationResolver {
    storage: Arc<dyn Storage>,
    probe: Arc<dyn ContainerProbe>,
    bridge_host: String,
}

impl DestinationResolver {
    pub fn new(
        storage: Arc<dyn Storage>,
        probe: Arc<dyn ContainerProbe>,
        bridge_host: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            probe,
            bridge_host: bridge_host.into(),
        }
    }

    pub async fn resolve(
        &self,
        gateway: &GatewayId,
        caller_url: Option<&str>,
        caller_headers: Option<&Headers>,
    ) -> Result<Destination, DispatchError> {
        let stored = self.storage.gateway_config(gateway).await?;
        let caller_url = caller_url.map(str::trim).filter(|url| !url.is_empty());

        let url = match (caller_url, stored.as_ref()) {
            (Some(url), _) => url.to_string(),
            (None, Some(config)) if !config.url_final.is_empty() => config.url_final.clone(),
            _ => {
                return Err(DispatchError::DestinationNotConfigured {
                    gateway: gateway.clone(),
                })
            }
        };

        let headers = match (caller_headers, stored.as_ref()) {
            (Some(headers), _) => headers.clone(),
            (None, Some(config)) => config.headers.clone(),
            (None, None) => Headers::new(),
        };

        if caller_url.is_some() || caller_headers.is_some() {
            let config = match stored {
                Some(mut config) if caller_url.is_none() => {
                    config.headers = headers.clone();
                    config
                }
                _ => GatewayConfig::new(gateway.clone(), url.clone(), headers.clone()),
            };
            self.storage.save_gateway_config(&config).await?;
        }

        let url = if self.probe.is_containerized() {
            rewrite_loopback(&url, &self.bridge_host)
        } else {
            url
        };

        Ok(Destination { url, headers })
    }
}

/// Replace a loopback host with `bridge_host`, keeping scheme, port, path and query.
///
/// Malformed URLs and non-loopback hosts are returned unchanged.
pub fn rewrite_loopback(url: &str, bridge_host: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let is_loopback = parsed
        .host_str()
        .map(|host| LOOPBACK_HOSTS.contains(&host.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !is_loopback {
        return url.to_string();
    }

    if parsed.set_host(Some(bridge_host)).is_err() {
        return url.to_string();
    }

    let rewritten = parsed.to_string();
    trace_rewrite(url, &rewritten);
    rewritten
}
