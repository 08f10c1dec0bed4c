mod support;

use std::sync::Arc;

use anyhow::Result;
use http::StatusCode;
use tempfile::TempDir;

use http::Method;
use offcache::cache::{CacheStore, EntryKey, VersionTag};
use offcache::request::{Destination, FetchRequest, FetchResponse, RequestMode};
use offcache::worker::{ControlCommand, FetchOutcome, WorkerPhase};

use support::*;

fn respond(outcome: FetchOutcome) -> FetchResponse {
    match outcome {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::Passthrough => panic!("expected a response, got passthrough"),
    }
}

async fn open_store(dir: &TempDir, tag: &str) -> Result<CacheStore> {
    CacheStore::open(dir.path().to_path_buf(), VersionTag::new(tag)).await
}

#[tokio::test]
async fn install_seeds_static_cache_for_offline_use() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);

    worker.install().await?;
    worker.activate().await?;
    let calls_after_install = net.calls();

    net.set_offline(true);
    let response = respond(worker.handle_fetch(&FetchRequest::navigation(uri("/index.html"))).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"<html>home</html>");
    assert_eq!(net.calls(), calls_after_install, "static asset hit the network");
    Ok(())
}

#[tokio::test]
async fn cache_first_serves_second_image_request_from_cache() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route_ok("https://hub.example/img/logo.png", "png-bytes");
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    let request = FetchRequest::get(uri("/img/logo.png"), Destination::Image, RequestMode::NoCors);
    let first = respond(worker.handle_fetch(&request).await);
    let calls_after_first = net.calls();
    let second = respond(worker.handle_fetch(&request).await);

    assert_eq!(first.body, second.body);
    assert_eq!(net.calls(), calls_after_first, "second request hit the network");
    Ok(())
}

#[tokio::test]
async fn dynamic_cache_evicts_oldest_insertions_first() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    for page in ["/a.html", "/b.html", "/c.html"] {
        net.route_ok(&url(page), page);
    }
    let mut config = worker_config();
    config.max_dynamic_items = 2;
    let worker =
        build_worker_with_config(open_store(&dir, "v1").await?, net.clone(), manifest, config);
    worker.install().await?;
    worker.activate().await?;

    for page in ["/a.html", "/b.html", "/c.html"] {
        respond(worker.handle_fetch(&FetchRequest::navigation(uri(page))).await);
    }

    net.set_offline(true);
    let a = respond(worker.handle_fetch(&FetchRequest::navigation(uri("/a.html"))).await);
    let b = respond(worker.handle_fetch(&FetchRequest::navigation(uri("/b.html"))).await);
    let c = respond(worker.handle_fetch(&FetchRequest::navigation(uri("/c.html"))).await);

    // /a.html was evicted when /c.html arrived, so only the offline page is left for it.
    assert_eq!(a.body, b"<html>offline</html>");
    assert_eq!(b.body, b"/b.html");
    assert_eq!(c.body, b"/c.html");
    Ok(())
}

#[tokio::test]
async fn network_first_falls_back_to_cached_copy() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route_ok("https://hub.example/news.html", "fresh news");
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    let request = FetchRequest::navigation(uri("/news.html"));
    respond(worker.handle_fetch(&request).await);

    net.set_offline(true);
    let fallback = respond(worker.handle_fetch(&request).await);
    assert_eq!(fallback.status, StatusCode::OK);
    assert_eq!(fallback.body, b"fresh news");
    Ok(())
}

#[tokio::test]
async fn offline_navigation_without_cache_gets_offline_page() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    net.set_offline(true);
    let response =
        respond(worker.handle_fetch(&FetchRequest::navigation(uri("/never-seen.html"))).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"<html>offline</html>");
    Ok(())
}

#[tokio::test]
async fn offline_subresource_without_cache_gets_synthetic_timeout() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    net.set_offline(true);
    let request = FetchRequest::get(
        uri("/js/widget.js"),
        Destination::Script,
        RequestMode::SameOrigin,
    );
    let response = respond(worker.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(response.body, b"Network error");
    Ok(())
}

#[tokio::test]
async fn version_rollover_drops_previous_generation_caches() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route_ok("https://hub.example/news.html", "news");
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;
    respond(worker.handle_fetch(&FetchRequest::navigation(uri("/news.html"))).await);

    let store = open_store(&dir, "v2").await?;
    let manifest = seeded_manifest(&net);
    let next = build_worker(store.clone(), net.clone(), manifest);
    next.install().await?;
    next.activate().await?;

    let caches = store.list_caches().await?;
    let names: Vec<String> = caches.iter().map(|(name, _)| name.dir_name()).collect();
    assert_eq!(names, vec!["v2-static"]);
    assert_eq!(caches[0].1, 2);
    Ok(())
}

#[tokio::test]
async fn clear_cache_command_forces_a_refetch() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route_ok("https://hub.example/img/logo.png", "png-bytes");
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    let request = FetchRequest::get(uri("/img/logo.png"), Destination::Image, RequestMode::NoCors);
    respond(worker.handle_fetch(&request).await);
    let calls_before = net.calls();

    worker.handle_command(ControlCommand::ClearCache).await;
    respond(worker.handle_fetch(&request).await);
    assert_eq!(net.calls(), calls_before + 1, "cleared entry was not refetched");
    Ok(())
}

#[tokio::test]
async fn install_aborts_when_an_asset_is_missing() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    net.route_ok("https://hub.example/index.html", "<html>home</html>");
    // /offline.html is not routed, so the upstream answers 404.
    let manifest = manifest(&["/index.html", "/offline.html"]);
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);

    let err = worker.install().await.unwrap_err();
    assert!(err.to_string().contains("/offline.html"), "{err}");
    assert_eq!(worker.phase(), WorkerPhase::Installing);
    assert!(
        !dir.path().join("v1-static").exists(),
        "partial static cache left behind"
    );

    let outcome = worker.handle_fetch(&FetchRequest::navigation(uri("/index.html"))).await;
    assert!(matches!(outcome, FetchOutcome::Passthrough));
    Ok(())
}

#[tokio::test]
async fn skip_waiting_promotes_an_installed_worker() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    assert_eq!(worker.phase(), WorkerPhase::Installed);

    let outcome = worker.handle_fetch(&FetchRequest::navigation(uri("/index.html"))).await;
    assert!(matches!(outcome, FetchOutcome::Passthrough));

    worker.handle_command(ControlCommand::SkipWaiting).await;
    assert_eq!(worker.phase(), WorkerPhase::Active);

    net.set_offline(true);
    let response = respond(worker.handle_fetch(&FetchRequest::navigation(uri("/index.html"))).await);
    assert_eq!(response.body, b"<html>home</html>");
    Ok(())
}

#[tokio::test]
async fn non_success_responses_count_as_network_failures() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route(
        "https://hub.example/gone.html",
        text_response(StatusCode::NOT_FOUND, "gone"),
    );
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    // A 404 navigation falls through to the offline page and caches nothing.
    let request = FetchRequest::navigation(uri("/gone.html"));
    let response = respond(worker.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"<html>offline</html>");

    net.set_offline(true);
    let again = respond(worker.handle_fetch(&request).await);
    assert_eq!(again.body, b"<html>offline</html>", "404 was cached");
    Ok(())
}

#[tokio::test]
async fn cross_origin_requests_pass_through_untouched() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;
    let calls = net.calls();

    let request = FetchRequest::get(
        "https://cdn.example/lib.js".parse().unwrap(),
        Destination::Script,
        RequestMode::Cors,
    );
    let outcome = worker.handle_fetch(&request).await;
    assert!(matches!(outcome, FetchOutcome::Passthrough));
    assert_eq!(net.calls(), calls);
    Ok(())
}

/// Makes every store of `path` into the named cache fail by occupying its
/// metadata path with a directory.
fn wedge_entry(root: &std::path::Path, cache_dir_name: &str, path: &str) {
    let key = EntryKey::new(&Method::GET, &uri(path));
    let meta = root
        .join(cache_dir_name)
        .join(format!("{}.meta", key.entry_id()));
    if meta.is_file() {
        std::fs::remove_file(&meta).unwrap();
    }
    std::fs::create_dir_all(&meta).unwrap();
}

#[tokio::test]
async fn failed_store_never_blocks_the_response() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route_ok("https://hub.example/news.html", "fresh news");
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    wedge_entry(dir.path(), "v1-dynamic", "/news.html");

    // The page still gets the network response even though caching failed.
    let request = FetchRequest::navigation(uri("/news.html"));
    let response = respond(worker.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"fresh news");

    // Nothing was cached, so going offline falls through to the offline page.
    net.set_offline(true);
    let fallback = respond(worker.handle_fetch(&request).await);
    assert_eq!(fallback.body, b"<html>offline</html>");
    Ok(())
}

#[tokio::test]
async fn failed_refresh_keeps_the_cached_copy_servable() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    net.route_ok("https://hub.example/news.html", "first edition");
    let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
    worker.install().await?;
    worker.activate().await?;

    let request = FetchRequest::navigation(uri("/news.html"));
    respond(worker.handle_fetch(&request).await);

    net.route_ok("https://hub.example/news.html", "second edition");
    wedge_entry(dir.path(), "v1-dynamic", "/news.html");

    // The refresh is served fresh; the failed store must not evict the
    // previously cached copy.
    let refreshed = respond(worker.handle_fetch(&request).await);
    assert_eq!(refreshed.body, b"second edition");

    net.set_offline(true);
    let fallback = respond(worker.handle_fetch(&request).await);
    assert_eq!(fallback.body, b"first edition");
    Ok(())
}

#[tokio::test]
async fn restart_reuses_the_persisted_static_cache() -> Result<()> {
    let dir = TempDir::new()?;
    let net = MockNetwork::new();
    let manifest = seeded_manifest(&net);
    {
        let worker = build_worker(open_store(&dir, "v1").await?, net.clone(), manifest);
        worker.install().await?;
        worker.activate().await?;
    }

    // Same version tag: the rebuilt store serves without re-seeding.
    let store = open_store(&dir, "v1").await?;
    let manifest = seeded_manifest(&net);
    let worker = build_worker(store, net.clone(), manifest);
    worker.resume().await?;

    net.set_offline(true);
    let response = respond(worker.handle_fetch(&FetchRequest::navigation(uri("/index.html"))).await);
    assert_eq!(response.body, b"<html>home</html>");
    Ok(())
}
