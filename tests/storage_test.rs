use std::collections::BTreeMap;

use serde_json::json;
use webhook_simulator::{
    DispatchResult, GatewayConfig, GatewayId, InMemoryStorage, LogEntry, LogId, LogUpdate, NewTemplate, Storage,
    MAX_LOG_ENTRIES,
};

fn pending(event: &str) -> LogEntry {
    LogEntry::pending(GatewayId::new("stripe"), event, Some("http://localhost:3000/hook".to_string()))
}

#[tokio::test]
async fn test_log_cap_evicts_oldest() {
    let storage = InMemoryStorage::new();

    for i in 0..=MAX_LOG_ENTRIES {
        storage.append_log(pending(&format!("e{i}"))).await.unwrap();
    }

    let logs = storage.list_logs().await.unwrap();
    assert_eq!(logs.len(), MAX_LOG_ENTRIES);
    assert!(logs.iter().all(|row| row.event != "e0"));
    assert_eq!(logs[0].event, format!("e{MAX_LOG_ENTRIES}"));
    assert_eq!(logs[MAX_LOG_ENTRIES - 1].event, "e1");
}

#[tokio::test]
async fn test_store_assigns_increasing_ids() {
    let storage = InMemoryStorage::new();

    let mut entry = pending("first");
    entry.id = LogId(42);
    let first = storage.append_log(entry).await.unwrap();
    let second = storage.append_log(pending("second")).await.unwrap();

    assert_ne!(first, LogId(42));
    assert!(second > first);
}

#[tokio::test]
async fn test_pending_row_is_updated_in_place() {
    let storage = InMemoryStorage::new();
    let id = storage.append_log(pending("payment_intent.succeeded")).await.unwrap();
    let before = storage.list_logs().await.unwrap();
    assert!(before[0].is_pending());

    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    let result = DispatchResult::from_status(200, Some("ok".to_string()));
    let updated = storage
        .update_log(id, &LogUpdate::completed(&result, None, Some(headers)))
        .await
        .unwrap();
    assert!(updated);

    let after = storage.list_logs().await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, id);
    assert_eq!(after[0].timestamp, before[0].timestamp);
    assert_eq!(after[0].http_status, 200);
    assert!(after[0].ok);
    assert_eq!(after[0].response_body.as_deref(), Some("ok"));
    // Fields absent from the update are kept.
    assert_eq!(after[0].url.as_deref(), Some("http://localhost:3000/hook"));
    assert!(after[0].headers.is_some());
}

#[tokio::test]
async fn test_update_of_evicted_row_reports_missing() {
    let storage = InMemoryStorage::new();
    let id = storage.append_log(pending("old")).await.unwrap();
    storage.clear_logs().await.unwrap();

    let updated = storage.update_log(id, &LogUpdate::failed("boom")).await.unwrap();
    assert!(!updated);
    assert!(storage.list_logs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_config_upsert() {
    let storage = InMemoryStorage::new();
    let gateway = GatewayId::new("asaas");
    assert!(storage.gateway_config(&gateway).await.unwrap().is_none());

    let config = GatewayConfig::new(gateway.clone(), "http://localhost:3000/asaas?key=1", BTreeMap::new());
    assert_eq!(config.url_base, "http://localhost:3000/asaas");
    storage.save_gateway_config(&config).await.unwrap();

    let replaced = GatewayConfig::new(gateway.clone(), "http://localhost:4000/asaas", BTreeMap::new());
    storage.save_gateway_config(&replaced).await.unwrap();

    assert_eq!(storage.gateway_config(&gateway).await.unwrap(), Some(replaced));
    assert_eq!(storage.gateway_configs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_templates_for_event_filters_by_pair() {
    let storage = InMemoryStorage::new();

    for (gateway, event) in [("stripe", "charge.succeeded"), ("stripe", "payment_intent.succeeded"), ("asaas", "charge.succeeded")] {
        storage
            .save_template(NewTemplate {
                id: None,
                name: format!("{gateway} {event}"),
                gateway: gateway.into(),
                event: event.to_string(),
                payload: json!({"gateway": gateway}),
            })
            .await
            .unwrap();
    }

    let matching = storage
        .templates_for_event(&GatewayId::new("stripe"), "charge.succeeded")
        .await
        .unwrap();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].name, "stripe charge.succeeded");
    assert_eq!(storage.templates().await.unwrap().len(), 3);
}
