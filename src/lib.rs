//! A local payment-gateway webhook simulator.
//!
//! This crate replays **realistic gateway webhook notifications**
//! against a developer's own HTTP endpoint, without a live gateway.
//!
//! ## Guarantees
//! - Unedited base payloads are sent byte-for-byte as stored
//! - Every attempted dispatch is recorded in the log, including failures
//! - Delayed dispatches never block the caller
//! - Bounded log retention (most recent 100 attempts)
//!
//! ## Non-Guarantees
//! - Retries (exactly one network attempt per dispatch)
//! - Payload signing or signature verification
//! - Cancellation of queued dispatches
//! - Schema validity of fixtures for the real gateway
//!
//! Configuration errors (unknown gateway or event, no destination) fail
//! fast and leave no log row. Transport errors are captured in the log.

mod catalog;
mod destination;
mod dispatcher;
mod error;
mod gateway;
mod registry;
mod request;
mod storage;
mod types;
mod worker;

#[cfg(feature = "redis")]
mod storage_redis;

#[cfg(feature = "postgres")]
mod storage_postgres;

pub use catalog::{headers_path, payloads_dir, FixtureCatalog, FsCatalog};
pub use destination::{
    rewrite_loopback,
    ContainerProbe,
    Destination,
    DestinationResolver,
    StaticProbe,
    SystemProbe,
    DEFAULT_BRIDGE_HOST,
};
pub use dispatcher::{Dispatcher, DispatcherConfig, BRIDGE_HOST_ENV, CATALOG_DIR_ENV, REQUEST_TIMEOUT_ENV};
pub use error::{CatalogError, DispatchError, StorageError};
pub use gateway::{CatalogEvent, DirectoryScanAdapter, FixedCatalogAdapter, GatewayAdapter, MethodRule};
pub use registry::AdapterRegistry;
pub use request::{query_pairs, RequestBuilder};
pub use storage::{new_template_id, InMemoryStorage, Storage, MAX_LOG_ENTRIES};
pub use types::{
    get_header,
    set_header,
    CanonicalEvent,
    DelaySelector,
    DispatchAck,
    DispatchRequest,
    DispatchResult,
    EventDefinition,
    GatewayConfig,
    GatewayId,
    GatewayMeta,
    Headers,
    HttpMethod,
    LogEntry,
    LogId,
    LogUpdate,
    NewTemplate,
    OutboundRequest,
    QueuedDispatch,
    Template,
};
pub use worker::deliver;

#[cfg(feature = "redis")]
pub use storage_redis::RedisStorage;

#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresStorage;
