// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Archive Backfiller (§4.2): walks an object-store listing of historical
//! headers/payloads, deep-past to present, one chain at a time.

use std::sync::Arc;

use scoped_futures::ScopedFutureExt;
use tokio::sync::Semaphore;

use crate::bus::Bus;
use crate::config::Settings;
use crate::db::models::{NewSyncStatus, SyncSource};
use crate::db::{ledger, run_in_transaction, DbPool};
use crate::decode::DecodedBlock;
use crate::materialiser;
use crate::metrics;
use crate::node::ArchiveStore;
use crate::shutdown::Shutdown;
use crate::error::Result;

/// Run a single archive page for `chain_id` (§4.2 steps 1-7): the whole page
/// — listing, fetch, decode, materialise, cursor advance — commits as one
/// transaction, or none of it does.
///
/// Object-store fetch+decode for the page's keys runs concurrently (bounded
/// by `concurrency`); the actual transactional writes are applied
/// sequentially against the single connection the transaction owns, since a
/// database transaction is inherently single-connection. Concurrency here
/// buys overlap on the I/O-bound fetch, not parallel writes.
pub async fn run_archive_page(
    pool: &DbPool,
    store: &ArchiveStore,
    bus: &Bus,
    network: &str,
    chain_id: i32,
    prefix: &str,
    max_keys: usize,
    concurrency: usize,
) -> Result<usize> {
    let store = store.clone();
    let network_owned = network.to_string();
    let prefix_owned = prefix.to_string();

    let (persisted, batch) = run_in_transaction(pool, move |conn| {
        let store = store.clone();
        let network = network_owned.clone();
        let prefix = prefix_owned.clone();
        async move {
            let last_cursor = ledger::find_last_cursor(
                conn,
                &network,
                chain_id,
                &prefix,
                SyncSource::Archive,
            )
            .await?;
            let start_after = last_cursor.as_ref().and_then(|c| c.object_key.clone());

            let keys = store.list(&prefix, max_keys, start_after.as_deref()).await?;
            if keys.is_empty() {
                return Ok((0usize, Vec::new()));
            }

            let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
            let fetches = keys.iter().cloned().map(|key| {
                let store = store.clone();
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");
                    let envelope = store.get_envelope(&key).await?;
                    envelope.decode()
                }
            });
            let decoded_blocks: Vec<DecodedBlock> = futures::future::try_join_all(fetches).await?;

            let mut batch = Vec::new();
            for decoded in decoded_blocks {
                if let Some(dispatch) =
                    materialiser::materialise(conn, &network, SyncSource::Archive, decoded).await?
                {
                    batch.push(dispatch);
                }
            }

            let last_key = keys.last().cloned().expect("checked non-empty above");
            ledger::save_cursor(
                conn,
                NewSyncStatus::archive_cursor(&network, chain_id, &prefix, last_key),
            )
            .await?;

            Ok((keys.len(), batch))
        }
        .scope_boxed()
    })
    .await?;

    if persisted > 0 {
        metrics::ARCHIVE_PAGES_COMMITTED
            .with_label_values(&[&chain_id.to_string()])
            .inc();
    }
    bus.publish_batch(batch);
    Ok(persisted)
}

/// Drive one chain's backfill to exhaustion: loop `run_archive_page` until a
/// page comes back empty or `max_iterations` is hit (§4.2), logging and
/// continuing past page failures so one bad page doesn't wedge the chain.
async fn run_chain(
    pool: DbPool,
    store: ArchiveStore,
    bus: Bus,
    settings: Arc<Settings>,
    chain_id: i32,
    shutdown: Shutdown,
) {
    let prefix = format!("{}chain-{chain_id}/", settings.archive_prefix);

    for _ in 0..settings.archive_max_iterations {
        if shutdown.is_triggered() {
            break;
        }
        match run_archive_page(
            &pool,
            &store,
            &bus,
            &settings.sync_network,
            chain_id,
            &prefix,
            settings.archive_page_size,
            settings.archive_concurrency,
        )
        .await
        {
            Ok(0) => break,
            Ok(_persisted) => continue,
            Err(e) => {
                tracing::error!(
                    area = "archive",
                    kind = "page_failed",
                    chain_id,
                    error = %e,
                    "archive page failed; cursor unchanged"
                );
                break;
            }
        }
    }
}

/// Entry point: fan out one task per chain (§5).
pub async fn run(
    pool: DbPool,
    store: ArchiveStore,
    bus: Bus,
    settings: Arc<Settings>,
    shutdown: Shutdown,
) {
    let mut tasks = Vec::new();
    for chain_id in 0..settings.chain_count as i32 {
        tasks.push(tokio::spawn(run_chain(
            pool.clone(),
            store.clone(),
            bus.clone(),
            settings.clone(),
            chain_id,
            shutdown.clone(),
        )));
    }
    for task in tasks {
        let _ = task.await;
    }
}
