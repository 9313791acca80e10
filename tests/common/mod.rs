#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use webhook_simulator::{
    AdapterRegistry, Dispatcher, DispatcherConfig, FixtureCatalog, FsCatalog, InMemoryStorage, StaticProbe,
    Storage,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write `<root>/<gateway>/payloads/<name>`.
pub fn write_fixture(root: &Path, gateway: &str, name: &str, content: &str) {
    let dir = root.join(gateway).join("payloads");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

/// Write `<root>/<gateway>/headers.json`.
pub fn write_headers(root: &Path, gateway: &str, content: &str) {
    let dir = root.join(gateway);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("headers.json"), content).unwrap();
}

/// Dispatcher over a catalog rooted at `root`, with in-memory storage.
///
/// Fixtures must be written before calling this: adapters read their
/// header sidecars at construction.
pub fn dispatcher_at(root: &Path, containerized: bool, bridge_host: &str) -> (Dispatcher, Arc<InMemoryStorage>) {
    let config = DispatcherConfig {
        catalog_dir: root.to_path_buf(),
        bridge_host: bridge_host.to_string(),
        ..Default::default()
    };
    let catalog: Arc<dyn FixtureCatalog> = Arc::new(FsCatalog::new());
    let registry = AdapterRegistry::builtin(root, catalog.clone());
    let storage = Arc::new(InMemoryStorage::new());
    let dispatcher = Dispatcher::with_parts(
        config,
        Arc::new(registry),
        catalog,
        storage.clone() as Arc<dyn Storage>,
        Arc::new(StaticProbe(containerized)),
    )
    .unwrap();
    (dispatcher, storage)
}

pub fn dispatcher(root: &Path) -> Dispatcher {
    dispatcher_at(root, false, "host.docker.internal").0
}

/// One request as seen by the receiver.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

#[derive(Clone)]
struct ReceiverState {
    captured: Arc<Mutex<Vec<Captured>>>,
    status: StatusCode,
}

/// Local HTTP endpoint that records every request and answers with a fixed status.
pub struct Receiver {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl Receiver {
    pub async fn start(status: u16) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = ReceiverState {
            captured: captured.clone(),
            status: StatusCode::from_u16(status).unwrap(),
        };
        let app = Router::new().fallback(capture).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn localhost_url(&self, path: &str) -> String {
        format!("http://localhost:{}{}", self.addr.port(), path)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

async fn capture(
    State(state): State<ReceiverState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.captured.lock().unwrap().push(Captured {
        method,
        uri,
        headers,
        body: body.to_vec(),
    });
    (state.status, "received".to_string())
}
