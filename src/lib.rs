pub mod cache;
pub mod cli;
pub mod logging;
pub mod manifest;
pub mod net;
pub mod request;
pub mod settings;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::CacheStore;
use crate::cli::Command;
use crate::manifest::Manifest;
use crate::net::HttpNetwork;
use crate::settings::Settings;
use crate::worker::Worker;

pub async fn run(command: Command, settings: Settings) -> Result<()> {
    let store = CacheStore::open(settings.cache_dir.clone(), settings.version_tag())
        .await
        .context("failed to open cache store")?;

    match command {
        Command::Install => {
            let manifest = Manifest::load(&settings.manifest).await?;
            let net = Arc::new(HttpNetwork::new(settings.network_timeout())?);
            let worker = Worker::new(store, net, settings.worker_config()?, manifest)?;
            worker.install().await?;
            worker.activate().await?;
            info!(version = settings.version_tag().as_str(), "install finished");
        }
        Command::Status => {
            let caches = store.list_caches().await?;
            if caches.is_empty() {
                println!("no caches");
            }
            for (name, count) in caches {
                println!("{:<32} {count} entries", name.dir_name());
            }
        }
        Command::Clear => {
            store.clear_all().await?;
            info!("all caches cleared");
        }
    }
    Ok(())
}
