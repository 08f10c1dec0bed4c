use http::{Method, Uri};

use crate::cache::CacheRole;
use crate::manifest::Manifest;
use crate::request::{Destination, FetchRequest};
use crate::worker::WorkerConfig;

/// How an intercepted request will be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Serve from cache, falling back to the network. `max_items` of `None`
    /// means the cache is unbounded.
    CacheFirst {
        role: CacheRole,
        max_items: Option<usize>,
    },
    /// Try the network, falling back to cache.
    NetworkFirst { role: CacheRole, max_items: usize },
    /// Hand the request back to the host untouched.
    Passthrough,
}

impl Route {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Route::CacheFirst { .. } => "cache_first",
            Route::NetworkFirst { .. } => "network_first",
            Route::Passthrough => "passthrough",
        }
    }
}

/// Classifies requests into routes. Order matters: method, then origin, then
/// resource kind, most specific first.
#[derive(Debug, Clone)]
pub struct FetchRouter {
    origin: Uri,
    manifest: Manifest,
    max_dynamic_items: usize,
    max_image_items: usize,
    icon_host_patterns: Vec<String>,
    data_extensions: Vec<String>,
}

impl FetchRouter {
    pub fn new(config: &WorkerConfig, manifest: Manifest) -> Self {
        Self {
            origin: config.origin.clone(),
            manifest,
            max_dynamic_items: config.max_dynamic_items,
            max_image_items: config.max_image_items,
            icon_host_patterns: config.icon_host_patterns.clone(),
            data_extensions: config.data_extensions.clone(),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn classify(&self, request: &FetchRequest) -> Route {
        if request.method != Method::GET {
            return Route::Passthrough;
        }

        let icon_fetch = self.is_icon_url(&request.uri);
        if !self.same_origin(&request.uri) && !icon_fetch {
            return Route::Passthrough;
        }

        if request.destination == Destination::Image || icon_fetch {
            return Route::CacheFirst {
                role: CacheRole::Image,
                max_items: Some(self.max_image_items),
            };
        }

        let path = request.uri.path();
        if self.is_data_path(path) {
            return Route::NetworkFirst {
                role: CacheRole::Dynamic,
                max_items: self.max_dynamic_items,
            };
        }

        if self.manifest.contains(path) {
            return Route::CacheFirst {
                role: CacheRole::Static,
                max_items: None,
            };
        }

        Route::NetworkFirst {
            role: CacheRole::Dynamic,
            max_items: self.max_dynamic_items,
        }
    }

    fn same_origin(&self, uri: &Uri) -> bool {
        uri.scheme() == self.origin.scheme() && uri.authority() == self.origin.authority()
    }

    fn is_icon_url(&self, uri: &Uri) -> bool {
        let url = uri.to_string();
        self.icon_host_patterns
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
    }

    fn is_data_path(&self, path: &str) -> bool {
        self.data_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }
}
