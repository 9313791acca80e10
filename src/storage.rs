use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::types::{GatewayConfig, GatewayId, LogEntry, LogId, LogUpdate, NewTemplate, Template};

/// Maximum number of log rows kept; older rows are evicted on append.
pub const MAX_LOG_ENTRIES: usize = 100;

/// Persistent store for gateway configs, dispatch logs and templates.
///
/// Every method is atomic on its own; no operation spans several calls.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn gateway_config(&self, gateway: &GatewayId) -> Result<Option<GatewayConfig>, StorageError>;

    /// Insert or replace the config row of `config.gateway`.
    async fn save_gateway_config(&self, config: &GatewayConfig) -> Result<(), StorageError>;

    async fn gateway_configs(&self) -> Result<Vec<GatewayConfig>, StorageError>;

    /// Append a row, evicting the oldest rows beyond [`MAX_LOG_ENTRIES`].
    ///
    /// The store assigns the id; `entry.id` is ignored.
    async fn append_log(&self, entry: LogEntry) -> Result<LogId, StorageError>;

    /// Returns `false` when the row no longer exists.
    async fn update_log(&self, id: LogId, update: &LogUpdate) -> Result<bool, StorageError>;

    /// Most recent first, at most [`MAX_LOG_ENTRIES`] rows.
    async fn list_logs(&self) -> Result<Vec<LogEntry>, StorageError>;

    async fn clear_logs(&self) -> Result<(), StorageError>;

    async fn templates(&self) -> Result<Vec<Template>, StorageError>;

    /// Templates of one `(gateway, event)` pair, most recently updated first.
    async fn templates_for_event(&self, gateway: &GatewayId, event: &str) -> Result<Vec<Template>, StorageError>;

    async fn template(&self, id: &str) -> Result<Option<Template>, StorageError>;

    /// Insert a template, or update it in place when `template.id` names an existing one.
    async fn save_template(&self, template: NewTemplate) -> Result<Template, StorageError>;

    /// Returns `false` when nothing was deleted.
    async fn delete_template(&self, id: &str) -> Result<bool, StorageError>;
}

/// Identifier for templates saved without one.
pub fn new_template_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sort newest first; ties keep the later-assigned id first.
pub(crate) fn sort_logs_newest_first(logs: &mut [LogEntry]) {
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

#[derive(Default)]
struct LogTable {
    next_id: u64,
    rows: Vec<LogEntry>,
}

/// In-memory storage for lightweight deployments and tests.
#[derive(Default)]
pub struct InMemoryStorage {
    configs: Mutex<HashMap<GatewayId, GatewayConfig>>,
    logs: Mutex<LogTable>,
    templates: Mutex<Vec<Template>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn gateway_config(&self, gateway: &GatewayId) -> Result<Option<GatewayConfig>, StorageError> {
        Ok(self.configs.lock().await.get(gateway).cloned())
    }

    async fn save_gateway_config(&self, config: &GatewayConfig) -> Result<(), StorageError> {
        self.configs
            .lock()
            .await
            .insert(config.gateway.clone(), config.clone());
        Ok(())
    }

    async fn gateway_configs(&self) -> Result<Vec<GatewayConfig>, StorageError> {
        let mut configs: Vec<GatewayConfig> = self.configs.lock().await.values().cloned().collect();
        configs.sort_by(|a, b| a.gateway.cmp(&b.gateway));
        Ok(configs)
    }

    async fn append_log(&self, mut entry: LogEntry) -> Result<LogId, StorageError> {
        let mut table = self.logs.lock().await;
        table.next_id += 1;
        let id = LogId(table.next_id);
        entry.id = id;
        table.rows.push(entry);

        while table.rows.len() > MAX_LOG_ENTRIES {
            let oldest = table
                .rows
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
                .map(|(index, _)| index);
            match oldest {
                Some(index) => {
                    table.rows.remove(index);
                }
                None => break,
            }
        }

        Ok(id)
    }

    async fn update_log(&self, id: LogId, update: &LogUpdate) -> Result<bool, StorageError> {
        let mut table = self.logs.lock().await;
        match table.rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                row.apply(update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_logs(&self) -> Result<Vec<LogEntry>, StorageError> {
        let mut logs = self.logs.lock().await.rows.clone();
        sort_logs_newest_first(&mut logs);
        logs.truncate(MAX_LOG_ENTRIES);
        Ok(logs)
    }

    async fn clear_logs(&self) -> Result<(), StorageError> {
        self.logs.lock().await.rows.clear();
        Ok(())
    }

    async fn templates(&self) -> Result<Vec<Template>, StorageError> {
        Ok(self.templates.lock().await.clone())
    }

    async fn templates_for_event(&self, gateway: &GatewayId, event: &str) -> Result<Vec<Template>, StorageError> {
        let mut matching: Vec<Template> = self
            .templates
            .lock()
            .await
            .iter()
            .filter(|t| &t.gateway == gateway && t.event == event)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matching)
    }

    async fn template(&self, id: &str) -> Result<Option<Template>, StorageError> {
        Ok(self.templates.lock().await.iter().find(|t| t.id == id).cloned())
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

        let mut templates = self.templates.lock().await;
        match templates.iter_mut().find(|t| t.id == saved.id) {
            Some(existing) => *existing = saved.clone(),
            None => templates.push(saved.clone()),
        }
        Ok(saved)
    }

    async fn delete_template(&self, id: &str) -> Result<bool, StorageError> {
        let mut templates = self.templates.lock().await;
        let before = templates.len();
        templates.retain(|t| t.id != id);
        Ok(templates.len() != before)
    }
}
