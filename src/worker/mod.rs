use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use http::Uri;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheName, CacheRole, CacheStore, EntryKey};
use crate::logging::FetchLogBuilder;
use crate::manifest::Manifest;
use crate::net::Network;
use crate::request::{FetchRequest, FetchResponse, uri_for_path};

mod router;
mod strategy;

pub use router::{FetchRouter, Route};
pub use strategy::{OfflinePage, ServedFrom, StrategyOutcome};

/// Lifecycle of a worker generation. A fresh worker installs its assets,
/// waits, then activates and takes over fetch handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Installing,
    Installed,
    Activating,
    Active,
}

/// Out-of-band instructions from the host, e.g. a settings page button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Activate the waiting worker immediately instead of on next startup.
    SkipWaiting,
    /// Wipe every cache, current version included.
    ClearCache,
}

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    Respond(FetchResponse),
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Uri,
    pub offline_path: String,
    pub max_dynamic_items: usize,
    pub max_image_items: usize,
    pub icon_host_patterns: Vec<String>,
    pub data_extensions: Vec<String>,
    pub network_timeout: Option<Duration>,
}

/// The offline worker: owns the cache store, a network seam, and the routing
/// table, and drives the install/activate lifecycle.
pub struct Worker {
    store: CacheStore,
    net: Arc<dyn Network>,
    router: FetchRouter,
    phase: Mutex<WorkerPhase>,
    origin: Uri,
    offline: OfflinePage,
    network_timeout: Option<Duration>,
}

impl Worker {
    pub fn new(
        store: CacheStore,
        net: Arc<dyn Network>,
        config: WorkerConfig,
        manifest: Manifest,
    ) -> Result<Self> {
        let offline_uri = uri_for_path(&config.origin, &config.offline_path)?;
        let offline = OfflinePage {
            cache: CacheName::new(store.version_tag().clone(), CacheRole::Static),
            key: EntryKey::new(&http::Method::GET, &offline_uri),
        };
        let router = FetchRouter::new(&config, manifest);
        Ok(Self {
            store,
            net,
            router,
            phase: Mutex::new(WorkerPhase::Installing),
            origin: config.origin,
            offline,
            network_timeout: config.network_timeout,
        })
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock()
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn static_cache(&self) -> CacheName {
        self.offline.cache.clone()
    }

    /// Seeds the static cache with every manifest asset. All-or-nothing: a
    /// single failed asset aborts the install and removes the partial cache,
    /// leaving the previous generation in charge.
    pub async fn install(&self) -> Result<()> {
        if self.phase() != WorkerPhase::Installing {
            bail!("install is only valid from the installing phase");
        }

        let static_cache = self.static_cache();
        self.store.open_cache(&static_cache).await?;

        let paths = self.router.manifest().paths().to_vec();
        info!(cache = %static_cache, assets = paths.len(), "installing static assets");

        for path in &paths {
            if let Err(err) = self.install_asset(&static_cache, path).await {
                warn!(path, error = %err, "install aborted");
                self.store.delete_cache(&static_cache).await?;
                return Err(err).with_context(|| format!("failed to install asset {path}"));
            }
        }

        *self.phase.lock() = WorkerPhase::Installed;
        info!(cache = %static_cache, "install complete");
        Ok(())
    }

    async fn install_asset(&self, static_cache: &CacheName, path: &str) -> Result<()> {
        let uri = uri_for_path(&self.origin, path)?;
        let request = FetchRequest::get(
            uri,
            crate::request::Destination::Other,
            crate::request::RequestMode::SameOrigin,
        );
        let response = match self.network_timeout {
            Some(limit) => tokio::time::timeout(limit, self.net.fetch(&request))
                .await
                .map_err(|_| anyhow::anyhow!("fetch timed out after {limit:?}"))??,
            None => self.net.fetch(&request).await?,
        };
        if !response.is_success() {
            bail!("unexpected status {} for {path}", response.status);
        }
        let key = EntryKey::new(&request.method, &request.uri);
        let stored = self.store.put(static_cache, &key, &response, None).await?;
        if !stored {
            bail!("response for {path} was not cacheable");
        }
        Ok(())
    }

    /// Resumes a generation whose static cache already survives on disk,
    /// skipping the install fetches. Used after a restart with an unchanged
    /// version tag.
    pub async fn resume(&self) -> Result<()> {
        if self.phase() != WorkerPhase::Installing {
            bail!("resume is only valid from the installing phase");
        }
        let static_cache = self.static_cache();
        if self.store.is_empty(&static_cache) {
            bail!("cannot resume: cache {static_cache} is empty");
        }
        *self.phase.lock() = WorkerPhase::Installed;
        self.activate().await
    }

    /// Takes over from the previous generation: every cache carrying a
    /// different version tag is deleted, then fetch handling switches on.
    pub async fn activate(&self) -> Result<()> {
        match self.phase() {
            WorkerPhase::Active => return Ok(()),
            WorkerPhase::Installed | WorkerPhase::Activating => {}
            WorkerPhase::Installing => bail!("cannot activate before install has finished"),
        }
        *self.phase.lock() = WorkerPhase::Activating;

        let removed = self
            .store
            .delete_caches_not_matching(self.store.version_tag())
            .await?;
        *self.phase.lock() = WorkerPhase::Active;
        info!(
            version = self.store.version_tag().as_str(),
            stale_caches_removed = removed,
            "worker active"
        );
        Ok(())
    }

    /// Promotes an installed worker straight to active without waiting for
    /// the next startup. Ignored in any other phase.
    pub async fn skip_waiting(&self) -> Result<()> {
        if self.phase() != WorkerPhase::Installed {
            debug!(phase = ?self.phase(), "skip_waiting ignored");
            return Ok(());
        }
        self.activate().await
    }

    /// Control messages are fire-and-forget for the sender; failures are
    /// logged, never surfaced.
    pub async fn handle_command(&self, command: ControlCommand) {
        match command {
            ControlCommand::SkipWaiting => {
                if let Err(err) = self.skip_waiting().await {
                    warn!(error = %err, "skip_waiting failed");
                }
            }
            ControlCommand::ClearCache => {
                if let Err(err) = self.store.clear_all().await {
                    warn!(error = %err, "clear_cache failed");
                }
            }
        }
    }

    /// Routes one intercepted request. Anything the worker does not handle,
    /// including every request before activation, passes through untouched.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> FetchOutcome {
        if self.phase() != WorkerPhase::Active {
            return FetchOutcome::Passthrough;
        }

        let route = self.router.classify(request);
        let tag = self.store.version_tag().clone();
        let outcome = match route {
            Route::Passthrough => return FetchOutcome::Passthrough,
            Route::CacheFirst { role, max_items } => {
                let name = CacheName::new(tag, role);
                let outcome = strategy::cache_first(
                    &self.store,
                    self.net.as_ref(),
                    &name,
                    request,
                    max_items,
                    &self.offline,
                    self.network_timeout,
                )
                .await;
                self.log_fetch(request, &route, Some(&name), &outcome);
                outcome
            }
            Route::NetworkFirst { role, max_items } => {
                let name = CacheName::new(tag, role);
                let outcome = strategy::network_first(
                    &self.store,
                    self.net.as_ref(),
                    &name,
                    request,
                    max_items,
                    &self.offline,
                    self.network_timeout,
                )
                .await;
                self.log_fetch(request, &route, Some(&name), &outcome);
                outcome
            }
        };
        FetchOutcome::Respond(outcome.response)
    }

    fn log_fetch(
        &self,
        request: &FetchRequest,
        route: &Route,
        cache: Option<&CacheName>,
        outcome: &StrategyOutcome,
    ) {
        let mut builder = FetchLogBuilder::new(request.method.as_str(), request.uri.path())
            .destination(request.destination.as_str())
            .strategy(route.strategy_name())
            .decision(outcome.served.as_str())
            .status(outcome.response.status);
        if let Some(cache) = cache {
            builder = builder.cache(cache.dir_name());
        }
        builder.log();
    }
}
