use std::fmt;
use std::path::PathBuf;

use crate::types::GatewayId;

/// Errors returned when dispatching fails *before* any log row is written.
///
/// Transport failures are never reported through this type; they end up
/// in the log entry of the attempt instead.
#[derive(Debug)]
pub enum DispatchError {
    /// A required request field was missing or empty.
    MissingField {
        field: &'static str,
    },

    /// Request body could not be decoded or failed validation.
    InvalidRequest {
        reason: String,
    },

    /// Gateway is not in the registry.
    UnknownGateway {
        gateway: GatewayId,
    },

    /// Gateway does not support the event.
    UnknownEvent {
        gateway: GatewayId,
        event: String,
    },

    /// No caller URL and no stored config for the gateway.
    DestinationNotConfigured {
        gateway: GatewayId,
    },

    /// Fixture could not be read from the catalog.
    Catalog(CatalogError),

    /// Persistent store failed.
    Storage(StorageError),

    /// HTTP client could not be constructed.
    ClientInit(String),
}

impl DispatchError {
    /// Whether the failure is the caller's fault (bad input or missing setup).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::MissingField { .. }
                | DispatchError::InvalidRequest { .. }
                | DispatchError::UnknownGateway { .. }
                | DispatchError::UnknownEvent { .. }
                | DispatchError::DestinationNotConfigured { .. }
        )
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MissingField { field } =>
                write!(f, "invalid request: '{}' is required", field),
            DispatchError::InvalidRequest { reason } =>
                write!(f, "invalid request: {}", reason),
            DispatchError::UnknownGateway { gateway } =>
                write!(f, "gateway \"{}\" not found", gateway),
            DispatchError::UnknownEvent { gateway, event } =>
                write!(f, "event \"{}\" not found for gateway \"{}\"", event, gateway),
            DispatchError::DestinationNotConfigured { gateway } =>
                write!(f, "webhook URL not configured for gateway \"{}\", please configure it first", gateway),
            DispatchError::Catalog(err) =>
                write!(f, "fixture catalog error: {}", err),
            DispatchError::Storage(err) =>
                write!(f, "storage error: {}", err),
            DispatchError::ClientInit(reason) =>
                write!(f, "failed to build HTTP client: {}", reason),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Catalog(err) => Some(err),
            DispatchError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for DispatchError {
    fn from(err: StorageError) -> Self {
        DispatchError::Storage(err)
    }
}

impl From<CatalogError> for DispatchError {
    fn from(err: CatalogError) -> Self {
        DispatchError::Catalog(err)
    }
}

/// Failures of the persistent store backing configs, logs and templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend connection or query failed.
    Backend(String),

    /// Stored row could not be (de)serialized.
    Serialization(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Backend(reason) =>
                write!(f, "backend failure: {}", reason),
            StorageError::Serialization(reason) =>
                write!(f, "serialization failure: {}", reason),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Failures reading fixtures from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    NotFound {
        path: PathBuf,
    },
    Io {
        path: PathBuf,
        reason: String,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound { path } =>
                write!(f, "fixture not found: {}", path.display()),
            CatalogError::Io { path, reason } =>
                write!(f, "failed to read {}: {}", path.display(), reason),
        }
    }
}

impl std::error::Error for CatalogError {}
