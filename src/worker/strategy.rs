use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use http::StatusCode;
use tracing::{debug, warn};

use crate::cache::{CacheName, CacheStore, EntryKey};
use crate::net::Network;
use crate::request::{FetchRequest, FetchResponse};

/// Where the response ultimately came from. Logged verbatim as the fetch
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Network,
    CacheFallback,
    OfflineFallback,
    Synthetic,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedFrom::Cache => "CACHE_HIT",
            ServedFrom::Network => "NETWORK",
            ServedFrom::CacheFallback => "CACHE_FALLBACK",
            ServedFrom::OfflineFallback => "OFFLINE_FALLBACK",
            ServedFrom::Synthetic => "SYNTHETIC",
        }
    }
}

#[derive(Debug)]
pub struct StrategyOutcome {
    pub response: FetchResponse,
    pub served: ServedFrom,
}

/// Location of the offline page inside the static cache, resolved once at
/// worker construction.
#[derive(Debug, Clone)]
pub struct OfflinePage {
    pub cache: CacheName,
    pub key: EntryKey,
}

/// Serve from cache when possible; go to the network on a miss and remember
/// the answer. A request that cannot be satisfied either way degrades to the
/// offline page.
pub async fn cache_first(
    store: &CacheStore,
    net: &dyn Network,
    name: &CacheName,
    request: &FetchRequest,
    max_items: Option<usize>,
    offline: &OfflinePage,
    timeout: Option<Duration>,
) -> StrategyOutcome {
    let key = EntryKey::new(&request.method, &request.uri);
    if let Some(response) = store.lookup(name, &key).await {
        return StrategyOutcome {
            response,
            served: ServedFrom::Cache,
        };
    }

    match fetch_from_network(net, request, timeout).await {
        Ok(response) => {
            store_response(store, name, &key, &response, max_items).await;
            StrategyOutcome {
                response,
                served: ServedFrom::Network,
            }
        }
        Err(err) => {
            debug!(uri = %request.uri, error = %err, "network fetch failed, serving offline fallback");
            offline_fallback(store, offline).await
        }
    }
}

/// Always try the network first so fresh content wins; fall back to the last
/// cached copy, then to the offline page for navigations or a synthetic
/// timeout for subresources.
pub async fn network_first(
    store: &CacheStore,
    net: &dyn Network,
    name: &CacheName,
    request: &FetchRequest,
    max_items: usize,
    offline: &OfflinePage,
    timeout: Option<Duration>,
) -> StrategyOutcome {
    let key = EntryKey::new(&request.method, &request.uri);

    match fetch_from_network(net, request, timeout).await {
        Ok(response) => {
            store_response(store, name, &key, &response, Some(max_items)).await;
            StrategyOutcome {
                response,
                served: ServedFrom::Network,
            }
        }
        Err(err) => {
            debug!(uri = %request.uri, error = %err, "network fetch failed, trying cache");
            if let Some(response) = store.lookup(name, &key).await {
                return StrategyOutcome {
                    response,
                    served: ServedFrom::CacheFallback,
                };
            }
            if request.is_navigation() {
                offline_fallback(store, offline).await
            } else {
                StrategyOutcome {
                    response: FetchResponse::synthetic(
                        StatusCode::REQUEST_TIMEOUT,
                        "Network error",
                    ),
                    served: ServedFrom::Synthetic,
                }
            }
        }
    }
}

/// Anything other than a 200 counts as a failed fetch for strategy purposes.
fn require_success(response: FetchResponse) -> Result<FetchResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        bail!("upstream answered {}", response.status);
    }
}

async fn fetch_from_network(
    net: &dyn Network,
    request: &FetchRequest,
    timeout: Option<Duration>,
) -> Result<FetchResponse> {
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, net.fetch(request))
            .await
            .map_err(|_| anyhow!("network fetch timed out after {limit:?}"))??,
        None => net.fetch(request).await?,
    };
    require_success(response)
}

/// A failed store never fails the request: the page already has its
/// response, caching is best-effort.
async fn store_response(
    store: &CacheStore,
    name: &CacheName,
    key: &EntryKey,
    response: &FetchResponse,
    max_items: Option<usize>,
) {
    if let Err(err) = store.put(name, key, response, max_items).await {
        warn!(cache = %name, key = key.key_base(), error = %err, "failed to store response");
    }
}

async fn offline_fallback(store: &CacheStore, offline: &OfflinePage) -> StrategyOutcome {
    if let Some(response) = store.lookup(&offline.cache, &offline.key).await {
        return StrategyOutcome {
            response,
            served: ServedFrom::OfflineFallback,
        };
    }
    StrategyOutcome {
        response: FetchResponse::synthetic(StatusCode::OK, "Offline"),
        served: ServedFrom::Synthetic,
    }
}
