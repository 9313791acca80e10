#[cfg(feature = "redis")]
use async_trait::async_trait;
#[cfg(feature = "redis")]
use chrono::Utc;
#[cfg(feature = "redis")]
use redis::aio::MultiplexedConnection;
#[cfg(feature = "redis")]
use redis::AsyncCommands;

#[cfg(feature = "redis")]
use crate::error::StorageError;
#[cfg(feature = "redis")]
use crate::storage::{new_template_id, sort_logs_newest_first, Storage, MAX_LOG_ENTRIES};
#[cfg(feature = "redis")]
use crate::types::{GatewayConfig, GatewayId, LogEntry, LogId, LogUpdate, NewTemplate, Template};

/// Insert a log row and evict the oldest rows beyond the cap in one step.
#[cfg(feature = "redis")]
const APPEND_LOG_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
local excess = redis.call('ZCARD', KEYS[2]) - tonumber(ARGV[4])
if excess > 0 then
  local evicted = redis.call('ZRANGE', KEYS[2], 0, excess - 1)
  for _, id in ipairs(evicted) do
    redis.call('HDEL', KEYS[1], id)
  end
  redis.call('ZREMRANGEBYRANK', KEYS[2], 0, excess - 1)
end
return excess
"#;

/// Overwrite a log row only if it has not been evicted.
#[cfg(feature = "redis")]
const UPDATE_LOG_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#;

#[cfg(feature = "redis")]
pub struct RedisStorage {
    client: redis::Client,
    prefix: String,
}

#[cfg(feature = "redis")]
impl RedisStorage {
    pub fn new(client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }

    fn configs_key(&self) -> String {
        format!("{}:configs", self.prefix)
    }

    fn logs_key(&self) -> String {
        format!("{}:logs", self.prefix)
    }

    fn logs_index_key(&self) -> String {
        format!("{}:logs:index", self.prefix)
    }

    fn logs_seq_key(&self) -> String {
        format!("{}:logs:seq", self.prefix)
    }

    fn templates_key(&self) -> String {
        format!("{}:templates", self.prefix)
    }

    /// Zero-padded so lexicographic order in the index matches numeric order.
    fn log_field(id: LogId) -> String {
        format!("{:020}", id.0)
    }

    async fn all_templates(&self) -> Result<Vec<Template>, StorageError> {
        let mut conn = self.connection().await?;
        let values: Vec<String> = conn.hvals(self.templates_key()).await.map_err(backend)?;
        values
            .iter()
            .map(|v| serde_json::from_str::<Template>(v).map_err(StorageError::from))
            .collect()
    }
}

#[cfg(feature = "redis")]
fn backend(err: redis::RedisError) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[cfg(feature = "redis")]
#[async_trait]
impl Storage for RedisStorage {
    async fn gateway_config(&self, gateway: &GatewayId) -> Result<Option<GatewayConfig>, StorageError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .hget(self.configs_key(), gateway.as_str())
            .await
            .map_err(backend)?;
        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn save_gateway_config(&self, config: &GatewayConfig) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(config)?;
        conn.hset::<_, _, _, ()>(self.configs_key(), config.gateway.as_str(), payload)
            .await
            .map_err(backend)
    }

    async fn gateway_configs(&self) -> Result<Vec<GatewayConfig>, StorageError> {
        let mut conn = self.connection().await?;
        let values: Vec<String> = conn.hvals(self.configs_key()).await.map_err(backend)?;
        let mut configs = values
            .iter()
            .map(|v| serde_json::from_str::<GatewayConfig>(v).map_err(StorageError::from))
            .collect::<Result<Vec<_>, _>>()?;
        configs.sort_by(|a, b| a.gateway.cmp(&b.gateway));
        Ok(configs)
    }

    async fn append_log(&self, mut entry: LogEntry) -> Result<LogId, StorageError> {
        let mut conn = self.connection().await?;
        let seq: u64 = conn.incr(self.logs_seq_key(), 1u64).await.map_err(backend)?;
        entry.id = LogId(seq);

        let payload = serde_json::to_string(&entry)?;
        let score = entry.timestamp.timestamp_micros();
        redis::Script::new(APPEND_LOG_SCRIPT)
            .key(self.logs_key())
            .key(self.logs_index_key())
            .arg(Self::log_field(entry.id))
            .arg(payload)
            .arg(score)
            .arg(MAX_LOG_ENTRIES)
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(backend)?;

        Ok(entry.id)
    }

    async fn update_log(&self, id: LogId, update: &LogUpdate) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        let field = Self::log_field(id);
        let current: Option<String> = conn.hget(self.logs_key(), &field).await.map_err(backend)?;
        let Some(current) = current else {
            return Ok(false);
        };

        let mut entry: LogEntry = serde_json::from_str(&current)?;
        entry.apply(update);
        let payload = serde_json::to_string(&entry)?;

        let written: i64 = redis::Script::new(UPDATE_LOG_SCRIPT)
            .key(self.logs_key())
            .arg(field)
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(written == 1)
    }

    async fn list_logs(&self) -> Result<Vec<LogEntry>, StorageError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .zrevrange(self.logs_index_key(), 0, MAX_LOG_ENTRIES as isize - 1)
            .await
            .map_err(backend)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.logs_key())
            .arg(&ids)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let mut logs = values
            .into_iter()
            .flatten()
            .map(|v| serde_json::from_str::<LogEntry>(&v).map_err(StorageError::from))
            .collect::<Result<Vec<_>, _>>()?;
        sort_logs_newest_first(&mut logs);
        Ok(logs)
    }

    async fn clear_logs(&self) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(vec![self.logs_key(), self.logs_index_key()])
            .await
            .map_err(backend)
    }

    async fn templates(&self) -> Result<Vec<Template>, StorageError> {
        let mut templates = self.all_templates().await?;
        templates.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(templates)
    }

    async fn templates_for_event(&self, gateway: &GatewayId, event: &str) -> Result<Vec<Template>, StorageError> {
        let mut matching: Vec<Template> = self
            .all_templates()
            .await?
            .into_iter()
            .filter(|t| &t.gateway == gateway && t.event == event)
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matching)
    }

    async fn template(&self, id: &str) -> Result<Option<Template>, StorageError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.hget(self.templates_key(), id).await.map_err(backend)?;
        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
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

        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&saved)?;
        conn.hset::<_, _, _, ()>(self.templates_key(), &saved.id, payload)
            .await
            .map_err(backend)?;
        Ok(saved)
    }

    async fn delete_template(&self, id: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.hdel(self.templates_key(), id).await.map_err(backend)?;
        Ok(removed > 0)
    }
}
