#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use http::{HeaderMap, StatusCode, Uri};
use parking_lot::Mutex;

use offcache::cache::CacheStore;
use offcache::manifest::Manifest;
use offcache::net::Network;
use offcache::request::{FetchRequest, FetchResponse};
use offcache::worker::{Worker, WorkerConfig};

pub const ORIGIN: &str = "https://hub.example";

/// In-memory upstream keyed by full URL. Counts every fetch and can be
/// switched offline to simulate a dead network.
pub struct MockNetwork {
    routes: Mutex<HashMap<String, FetchResponse>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        })
    }

    pub fn route(&self, url: &str, response: FetchResponse) {
        self.routes.lock().insert(url.to_string(), response);
    }

    pub fn route_ok(&self, url: &str, body: &str) {
        self.route(url, text_response(StatusCode::OK, body));
    }

    pub fn remove_route(&self, url: &str) {
        self.routes.lock().remove(url);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            bail!("network unreachable");
        }
        let url = request.uri.to_string();
        match self.routes.lock().get(&url) {
            Some(response) => Ok(response.clone()),
            None => Ok(text_response(StatusCode::NOT_FOUND, "not found")),
        }
    }
}

pub fn text_response(status: StatusCode, body: &str) -> FetchResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "text/html".parse().unwrap());
    FetchResponse {
        status,
        headers,
        body: body.as_bytes().to_vec(),
    }
}

pub fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

pub fn uri(path: &str) -> Uri {
    url(path).parse().unwrap()
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        origin: ORIGIN.parse().unwrap(),
        offline_path: "/offline.html".to_string(),
        max_dynamic_items: 50,
        max_image_items: 100,
        icon_host_patterns: vec!["favicons".to_string()],
        data_extensions: vec![".json".to_string()],
        network_timeout: Some(Duration::from_secs(5)),
    }
}

pub fn manifest(paths: &[&str]) -> Manifest {
    Manifest::new(paths.iter().map(|p| p.to_string()).collect()).unwrap()
}

/// Standard two-asset manifest with routes already registered upstream.
pub fn seeded_manifest(net: &MockNetwork) -> Manifest {
    net.route_ok("https://hub.example/index.html", "<html>home</html>");
    net.route_ok("https://hub.example/offline.html", "<html>offline</html>");
    manifest(&["/index.html", "/offline.html"])
}

pub fn build_worker(store: CacheStore, net: Arc<MockNetwork>, manifest: Manifest) -> Worker {
    build_worker_with_config(store, net, manifest, worker_config())
}

pub fn build_worker_with_config(
    store: CacheStore,
    net: Arc<MockNetwork>,
    manifest: Manifest,
    config: WorkerConfig,
) -> Worker {
    Worker::new(store, net, config, manifest).unwrap()
}
