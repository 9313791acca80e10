use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use webhook_simulator::{
    query_pairs, rewrite_loopback, DestinationResolver, DispatchError, DispatchRequest, FsCatalog, GatewayConfig, GatewayId,
    HttpMethod, InMemoryStorage, RequestBuilder, StaticProbe, Storage,
};

mod common;
use common::write_fixture;

fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_query_pairs_flattens_top_level() {
    let pairs = query_pairs(&json!({
        "id": 7,
        "topic": "payment",
        "skip": null,
        "flag": true,
        "nested": {"a": 1}
    }))
    .unwrap();

    assert_eq!(
        pairs,
        vec![
            ("id".to_string(), "7".to_string()),
            ("topic".to_string(), "payment".to_string()),
            ("flag".to_string(), "true".to_string()),
            ("nested".to_string(), "{\"a\":1}".to_string()),
        ]
    );
    assert!(query_pairs(&json!([1, 2])).is_none());
}

#[test]
fn test_get_override_appends_to_existing_query() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "mercadopago", "ipn.payment.json", r#"{"id": 1}"#);

    let catalog = Arc::new(FsCatalog::new());
    let registry = webhook_simulator::AdapterRegistry::builtin(dir.path(), catalog.clone());
    let definition = registry.get("mercadopago").unwrap().resolve_event("ipn.payment").unwrap();
    let builder = RequestBuilder::new(catalog);

    let request = builder
        .build(
            &definition,
            Some(&json!({"topic": "payment", "id": "99"})),
            "http://localhost:3000/ipn?source=sim",
            &BTreeMap::new(),
        )
        .unwrap();

    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(request.url, "http://localhost:3000/ipn?source=sim&topic=payment&id=99");
    assert!(request.body.is_none());
}

#[test]
fn test_unparseable_get_fixture_leaves_url_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "mercadopago", "ipn.merchant_order.json", "not json");

    let catalog = Arc::new(FsCatalog::new());
    let registry = webhook_simulator::AdapterRegistry::builtin(dir.path(), catalog.clone());
    let definition = registry
        .get("mercadopago")
        .unwrap()
        .resolve_event("ipn.merchant_order")
        .unwrap();
    let builder = RequestBuilder::new(catalog);

    let request = builder
        .build(&definition, None, "http://localhost:3000/ipn?k=v", &BTreeMap::new())
        .unwrap();

    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(request.url, "http://localhost:3000/ipn?k=v");
    assert!(request.body.is_none());
}

#[test]
fn test_null_override_is_distinct_from_absent() {
    let explicit: DispatchRequest =
        serde_json::from_str(r#"{"gateway":"stripe","event":"charge.succeeded","payloadOverride":null}"#).unwrap();
    assert_eq!(explicit.payload_override, Some(serde_json::Value::Null));

    let absent: DispatchRequest = serde_json::from_str(r#"{"gateway":"stripe","event":"charge.succeeded"}"#).unwrap();
    assert_eq!(absent.payload_override, None);
}

#[test]
fn test_post_sets_json_content_type_unless_caller_overrides() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "pagarme", "order.paid.json", r#"{"type":"order.paid"}"#);

    let catalog = Arc::new(FsCatalog::new());
    let registry = webhook_simulator::AdapterRegistry::builtin(dir.path(), catalog.clone());
    let definition = registry.get("pagarme").unwrap().resolve_event("order.paid").unwrap();
    let builder = RequestBuilder::new(catalog);

    let request = builder
        .build(&definition, None, "http://localhost:3000/", &BTreeMap::new())
        .unwrap();
    assert_eq!(request.headers.get("Content-Type").map(String::as_str), Some("application/json"));
    assert_eq!(request.body.as_deref(), Some(r#"{"type":"order.paid"}"#));

    let request = builder
        .build(
            &definition,
            None,
            "http://localhost:3000/",
            &headers(&[("CONTENT-TYPE", "application/x-www-form-urlencoded")]),
        )
        .unwrap();
    assert_eq!(request.headers.len(), 1);
    assert_eq!(
        request.headers.get("CONTENT-TYPE").map(String::as_str),
        Some("application/x-www-form-urlencoded")
    );
}

#[test]
fn test_rewrite_loopback_hosts() {
    assert_eq!(
        rewrite_loopback("http://localhost:3000/webhook?x=1", "host.docker.internal"),
        "http://host.docker.internal:3000/webhook?x=1"
    );
    assert_eq!(
        rewrite_loopback("https://127.0.0.1:8443/hooks", "host.docker.internal"),
        "https://host.docker.internal:8443/hooks"
    );
    assert_eq!(
        rewrite_loopback("https://api.example.com/hooks", "host.docker.internal"),
        "https://api.example.com/hooks"
    );
    assert_eq!(rewrite_loopback("not a url", "host.docker.internal"), "not a url");
}

#[tokio::test]
async fn test_resolver_prefers_caller_and_persists_it() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let gateway = GatewayId::new("asaas");
    storage
        .save_gateway_config(&GatewayConfig::new(
            gateway.clone(),
            "http://localhost:3000/stored",
            headers(&[("X-Stored", "1")]),
        ))
        .await
        .unwrap();

    let resolver = DestinationResolver::new(storage.clone(), Arc::new(StaticProbe(false)), "host.docker.internal");

    let stored = resolver.resolve(&gateway, None, None).await.unwrap();
    assert_eq!(stored.url, "http://localhost:3000/stored");
    assert_eq!(stored.headers, headers(&[("X-Stored", "1")]));

    // Blank caller URL falls back to the stored one.
    let blank = resolver.resolve(&gateway, Some("   "), None).await.unwrap();
    assert_eq!(blank.url, "http://localhost:3000/stored");

    let caller = resolver
        .resolve(&gateway, Some("http://localhost:4000/caller"), None)
        .await
        .unwrap();
    assert_eq!(caller.url, "http://localhost:4000/caller");
    assert_eq!(caller.headers, headers(&[("X-Stored", "1")]));

    let config = storage.gateway_config(&gateway).await.unwrap().unwrap();
    assert_eq!(config.url_final, "http://localhost:4000/caller");
    assert_eq!(config.headers, headers(&[("X-Stored", "1")]));
}

#[tokio::test]
async fn test_resolver_persists_caller_headers_only() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let gateway = GatewayId::new("stripe");
    storage
        .save_gateway_config(&GatewayConfig::new(gateway.clone(), "http://localhost:3000/s", BTreeMap::new()))
        .await
        .unwrap();

    let resolver = DestinationResolver::new(storage.clone(), Arc::new(StaticProbe(false)), "host.docker.internal");
    let caller_headers = headers(&[("Authorization", "Bearer x")]);
    resolver.resolve(&gateway, None, Some(&caller_headers)).await.unwrap();

    let config = storage.gateway_config(&gateway).await.unwrap().unwrap();
    assert_eq!(config.url_final, "http://localhost:3000/s");
    assert_eq!(config.headers, caller_headers);
}

#[tokio::test]
async fn test_resolver_requires_a_destination() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let resolver = DestinationResolver::new(storage.clone(), Arc::new(StaticProbe(true)), "host.docker.internal");
    let gateway = GatewayId::new("asaas");

    let err = resolver.resolve(&gateway, None, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::DestinationNotConfigured { .. }));

    // Headers alone cannot stand in for a URL, and nothing is persisted.
    let err = resolver
        .resolve(&gateway, None, Some(&headers(&[("X", "1")])))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::DestinationNotConfigured { .. }));
    assert!(storage.gateway_config(&gateway).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resolver_rewrites_only_when_containerized() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let gateway = GatewayId::new("stripe");

    let outside = DestinationResolver::new(storage.clone(), Arc::new(StaticProbe(false)), "host.docker.internal");
    let destination = outside
        .resolve(&gateway, Some("http://localhost:3000/hook"), None)
        .await
        .unwrap();
    assert_eq!(destination.url, "http://localhost:3000/hook");

    let inside = DestinationResolver::new(storage.clone(), Arc::new(StaticProbe(true)), "host.docker.internal");
    let destination = inside.resolve(&gateway, None, None).await.unwrap();
    assert_eq!(destination.url, "http://host.docker.internal:3000/hook");

    let config = storage.gateway_config(&gateway).await.unwrap().unwrap();
    assert_eq!(config.url_final, "http://localhost:3000/hook");
}
