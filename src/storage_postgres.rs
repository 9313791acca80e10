#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use chrono::{DateTime, Utc};
#[cfg(feature = "postgres")]
use serde_json::Value;
#[cfg(feature = "postgres")]
use tokio::sync::Mutex;
#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Row};

#[cfg(feature = "postgres")]
use crate::error::StorageError;
#[cfg(feature = "postgres")]
use crate::storage::{new_template_id, Storage, MAX_LOG_ENTRIES};
#[cfg(feature = "postgres")]
use crate::types::{GatewayConfig, GatewayId, Headers, LogEntry, LogId, LogUpdate, NewTemplate, Template};

#[cfg(feature = "postgres")]
const LOG_COLUMNS: &str =
    "id, gateway, event, timestamp, http_status, ok, response_body, error, url, headers";

#[cfg(feature = "postgres")]
const TEMPLATE_COLUMNS: &str = "id, name, gateway, event, payload, updated_at";

/// Postgres-backed storage.
///
/// The client sits behind a mutex so log appends and their eviction run in
/// one transaction.
#[cfg(feature = "postgres")]
pub struct PostgresStorage {
    client: Mutex<Client>,
}

#[cfg(feature = "postgres")]
impl PostgresStorage {
    pub async fn new(client: Client) -> Result<Self, tokio_postgres::Error> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS webhook_configs (
                    gateway TEXT PRIMARY KEY,
                    url_base TEXT NOT NULL,
                    url_final TEXT NOT NULL,
                    headers JSONB NOT NULL
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS webhook_logs (
                    id BIGSERIAL PRIMARY KEY,
                    gateway TEXT NOT NULL,
                    event TEXT NOT NULL,
                    timestamp TIMESTAMPTZ NOT NULL,
                    http_status INTEGER NOT NULL,
                    ok BOOLEAN NOT NULL,
                    response_body TEXT,
                    error TEXT,
                    url TEXT,
                    headers JSONB
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS webhook_templates (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    gateway TEXT NOT NULL,
                    event TEXT NOT NULL,
                    payload JSONB NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )",
                &[],
            )
            .await?;

        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[cfg(feature = "postgres")]
fn backend(err: tokio_postgres::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[cfg(feature = "postgres")]
fn headers_to_json(headers: &Headers) -> Result<Value, StorageError> {
    Ok(serde_json::to_value(headers)?)
}

#[cfg(feature = "postgres")]
fn headers_from_json(value: Value) -> Result<Headers, StorageError> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(feature = "postgres")]
fn config_from_row(row: &Row) -> Result<GatewayConfig, StorageError> {
    Ok(GatewayConfig {
        gateway: GatewayId(row.get("gateway")),
        url_base: row.get("url_base"),
        url_final: row.get("url_final"),
        headers: headers_from_json(row.get("headers"))?,
    })
}

#[cfg(feature = "postgres")]
fn log_from_row(row: &Row) -> Result<LogEntry, StorageError> {
    let id: i64 = row.get("id");
    let status: i32 = row.get("http_status");
    let headers: Option<Value> = row.get("headers");
    Ok(LogEntry {
        id: LogId(id as u64),
        gateway: GatewayId(row.get("gateway")),
        event: row.get("event"),
        timestamp: row.get("timestamp"),
        http_status: u16::try_from(status).unwrap_or(0),
        ok: row.get("ok"),
        response_body: row.get("response_body"),
        error: row.get("error"),
        url: row.get("url"),
        headers: headers.map(headers_from_json).transpose()?,
    })
}

#[cfg(feature = "postgres")]
fn template_from_row(row: &Row) -> Template {
    let updated_at: DateTime<Utc> = row.get("updated_at");
    Template {
        id: row.get("id"),
        name: row.get("name"),
        gateway: GatewayId(row.get("gateway")),
        event: row.get("event"),
        payload: row.get("payload"),
        updated_at,
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl Storage for PostgresStorage {
    async fn gateway_config(&self, gateway: &GatewayId) -> Result<Option<GatewayConfig>, StorageError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT gateway, url_base, url_final, headers FROM webhook_configs WHERE gateway = $1",
                &[&gateway.as_str()],
            )
            .await
            .map_err(backend)?;
        row.as_ref().map(config_from_row).transpose()
    }

    async fn save_gateway_config(&self, config: &GatewayConfig) -> Result<(), StorageError> {
        let headers = headers_to_json(&config.headers)?;
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO webhook_configs (gateway, url_base, url_final, headers)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (gateway) DO UPDATE SET
                    url_base = EXCLUDED.url_base,
                    url_final = EXCLUDED.url_final,
                    headers = EXCLUDED.headers",
                &[&config.gateway.as_str(), &config.url_base, &config.url_final, &headers],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn gateway_configs(&self) -> Result<Vec<GatewayConfig>, StorageError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT gateway, url_base, url_final, headers FROM webhook_configs ORDER BY gateway",
                &[],
            )
            .await
            .map_err(backend)?;
        rows.iter().map(config_from_row).collect()
    }

    async fn append_log(&self, entry: LogEntry) -> Result<LogId, StorageError> {
        let headers = entry.headers.as_ref().map(headers_to_json).transpose()?;
        let status = i32::from(entry.http_status);
        let cap = MAX_LOG_ENTRIES as i64;

        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(backend)?;

        let row = tx
            .query_one(
                "INSERT INTO webhook_logs
                    (gateway, event, timestamp, http_status, ok, response_body, error, url, headers)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 RETURNING id",
                &[
                    &entry.gateway.as_str(),
                    &entry.event,
                    &entry.timestamp,
                    &status,
                    &entry.ok,
                    &entry.response_body,
                    &entry.error,
                    &entry.url,
                    &headers,
                ],
            )
            .await
            .map_err(backend)?;

        tx.execute(
            "DELETE FROM webhook_logs WHERE id NOT IN (
                SELECT id FROM webhook_logs ORDER BY timestamp DESC, id DESC LIMIT $1
             )",
            &[&cap],
        )
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;

        let id: i64 = row.get(0);
        Ok(LogId(id as u64))
    }

    async fn update_log(&self, id: LogId, update: &LogUpdate) -> Result<bool, StorageError> {
        let key = id.0 as i64;
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(backend)?;

        let query = format!("SELECT {LOG_COLUMNS} FROM webhook_logs WHERE id = $1 FOR UPDATE");
        let Some(row) = tx.query_opt(&query, &[&key]).await.map_err(backend)? else {
            return Ok(false);
        };

        let mut entry = log_from_row(&row)?;
        entry.apply(update);
        let headers = entry.headers.as_ref().map(headers_to_json).transpose()?;
        let status = i32::from(entry.http_status);

        tx.execute(
            "UPDATE webhook_logs SET
                http_status = $2, ok = $3, response_body = $4, error = $5, url = $6, headers = $7
             WHERE id = $1",
            &[
                &key,
                &status,
                &entry.ok,
                &entry.response_body,
                &entry.error,
                &entry.url,
                &headers,
            ],
        )
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn list_logs(&self) -> Result<Vec<LogEntry>, StorageError> {
        let client = self.client.lock().await;
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM webhook_logs ORDER BY timestamp DESC, id DESC LIMIT $1"
        );
        let rows = client
            .query(&query, &[&(MAX_LOG_ENTRIES as i64)])
            .await
            .map_err(backend)?;
        rows.iter().map(log_from_row).collect()
    }

    async fn clear_logs(&self) -> Result<(), StorageError> {
        let client = self.client.lock().await;
        client
            .execute("DELETE FROM webhook_logs", &[])
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn templates(&self) -> Result<Vec<Template>, StorageError> {
        let client = self.client.lock().await;
        let query = format!("SELECT {TEMPLATE_COLUMNS} FROM webhook_templates ORDER BY updated_at");
        let rows = client.query(&query, &[]).await.map_err(backend)?;
        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn templates_for_event(&self, gateway: &GatewayId, event: &str) -> Result<Vec<Template>, StorageError> {
        let client = self.client.lock().await;
        let query = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM webhook_templates
             WHERE gateway = $1 AND event = $2
             ORDER BY updated_at DESC"
        );
        let rows = client
            .query(&query, &[&gateway.as_str(), &event])
            .await
            .map_err(backend)?;
        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn template(&self, id: &str) -> Result<Option<Template>, StorageError> {
        let client = self.client.lock().await;
        let query = format!("SELECT {TEMPLATE_COLUMNS} FROM webhook_templates WHERE id = $1");
        let row = client.query_opt(&query, &[&id]).await.map_err(backend)?;
        Ok(row.as_ref().map(template_from_row))
    }

    async fn save_template(&self, template: NewTemplate) -> Result<Template, StorageError> {
        let saved = Template {
            id: template.id.unwrap_or_else(new_template_id),
            name: template.name,
            gateway: template.gateway,
            event: template.event,
            payload: template.payload,
            updated_at: Utc::now(),
        };

        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO webhook_templates (id, name, gateway, event, payload, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    gateway = EXCLUDED.gateway,
                    event = EXCLUDED.event,
                    payload = EXCLUDED.payload,
                    updated_at = EXCLUDED.updated_at",
                &[
                    &saved.id,
                    &saved.name,
                    &saved.gateway.as_str(),
                    &saved.event,
                    &saved.payload,
                    &saved.updated_at,
                ],
            )
            .await
            .map_err(backend)?;
        Ok(saved)
    }

    async fn delete_template(&self, id: &str) -> Result<bool, StorageError> {
        let client = self.client.lock().await;
        let removed = client
            .execute("DELETE FROM webhook_templates WHERE id = $1", &[&id])
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }
}
