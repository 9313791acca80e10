use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::FixtureCatalog;
use crate::gateway::{CatalogEvent, DirectoryScanAdapter, FixedCatalogAdapter, GatewayAdapter, MethodRule};
use crate::types::{GatewayId, GatewayMeta};

/// Immutable mapping from gateway identifier to its adapter.
///
/// Built once at startup; lookups never mutate it.
pub struct AdapterRegistry {
    adapters: HashMap<GatewayId, Arc<dyn GatewayAdapter>>,
    order: Vec<GatewayId>,
}

impl AdapterRegistry {
    /// Build a registry from adapters. Later adapters replace earlier ones for the same gateway.
    pub fn from_adapters<I>(adapters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn GatewayAdapter>>,
    {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for adapter in adapters {
            let id = adapter.gateway().clone();
            if map.insert(id.clone(), adapter).is_none() {
                order.push(id);
            }
        }
        Self { adapters: map, order }
    }

    /// The built-in gateways, reading fixtures under `catalog_root`.
    pub fn builtin(catalog_root: &Path, catalog: Arc<dyn FixtureCatalog>) -> Self {
        let adapters: Vec<Arc<dyn GatewayAdapter>> = vec![
            Arc::new(DirectoryScanAdapter::new(
                "stripe",
                catalog_root,
                MethodRule::AlwaysPost,
                catalog.clone(),
            )),
            Arc::new(FixedCatalogAdapter::new(
                "abacatepay",
                catalog_root,
                vec![
                    CatalogEvent::new("billing.paid.pix.qrcode", "billing.paid.pix.qrcode.json"),
                    CatalogEvent::new("billing.paid.pix.billing", "billing.paid.pix.billing.json"),
                    CatalogEvent::new("withdraw.done", "withdraw.done.json"),
                    CatalogEvent::new("withdraw.failed", "withdraw.failed.json"),
                ],
                catalog.as_ref(),
            )),
            Arc::new(DirectoryScanAdapter::new(
                "asaas",
                catalog_root,
                MethodRule::AlwaysPost,
                catalog.clone(),
            )),
            Arc::new(DirectoryScanAdapter::new(
                "mercadopago",
                catalog_root,
                MethodRule::GetForPrefix("ipn."),
                catalog.clone(),
            )),
            Arc::new(DirectoryScanAdapter::new(
                "pagarme",
                catalog_root,
                MethodRule::AlwaysPost,
                catalog.clone(),
            )),
            Arc::new(DirectoryScanAdapter::new(
                "paguedev",
                catalog_root,
                MethodRule::AlwaysPost,
                catalog,
            )),
        ];
        Self::from_adapters(adapters)
    }

    pub fn get(&self, gateway: &str) -> Option<&Arc<dyn GatewayAdapter>> {
        self.adapters.get(gateway)
    }

    /// Gateway identifiers in registration order.
    pub fn gateways(&self) -> &[GatewayId] {
        &self.order
    }

    /// Supported events of every gateway.
    pub fn metadata(&self) -> Vec<GatewayMeta> {
        self.order
            .iter()
            .filter_map(|id| self.adapters.get(id))
            .map(|adapter| GatewayMeta {
                gateway: adapter.gateway().clone(),
                events: adapter.list_events(),
            })
            .collect()
    }
}
