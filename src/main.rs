// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process entry point: load configuration, wire up the shared pool, bus,
//! and node client, then run the four pipelines concurrently until shutdown.

use std::sync::Arc;

use chainweb_indexer::db::build_pool;
use chainweb_indexer::node::{ArchiveStore, NodeClient};
use chainweb_indexer::pipelines::{backfiller, gapfiller, guards, streamer};
use chainweb_indexer::shutdown::{install_signal_handlers, Shutdown};
use chainweb_indexer::{Bus, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(
        area = "startup",
        network = %settings.sync_network,
        chain_count = settings.chain_count,
        "starting indexer"
    );

    let settings = Arc::new(settings);

    {
        let database_url = settings.database_url.clone();
        tokio::task::spawn_blocking(move || chainweb_indexer::db::run_pending_migrations(&database_url))
            .await
            .map_err(|e| anyhow::anyhow!("migration task panicked: {e}"))??;
    }

    let pool = build_pool(&settings.database_url).await?;

    let archive_url = url::Url::parse(&settings.archive_bucket_url)?;
    let (object_store, _path) = object_store::parse_url(&archive_url)?;
    let store = ArchiveStore::new(Arc::from(object_store));

    let node_client = NodeClient::new(
        settings.sync_base_url.to_string(),
        settings.sync_network.clone(),
        settings.node_api_concurrency,
    );
    let bus = Bus::new();
    let shutdown = Shutdown::new();

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(backfiller::run(
        pool.clone(),
        store,
        bus.clone(),
        settings.clone(),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(streamer::run(
        pool.clone(),
        settings.clone(),
        bus.clone(),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(gapfiller::run(
        pool.clone(),
        node_client.clone(),
        bus.clone(),
        settings.clone(),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(guards::run(
        pool.clone(),
        node_client.clone(),
        settings.clone(),
        shutdown.clone(),
    )));

    install_signal_handlers(shutdown.clone()).await;

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!(area = "shutdown", "all pipelines stopped, exiting");
    Ok(())
}
