// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tip Streamer (§4.3): subscribes to the node's server-sent-event feed of
//! new block headers and materialises each one as it arrives, independent of
//! the Archive Backfiller and Gap Filler.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use diesel_async::RunQueryDsl;
use scoped_futures::ScopedFutureExt;

use crate::bus::Bus;
use crate::config::Settings;
use crate::db::models::{NewStreamingError, SyncSource};
use crate::db::schema::streaming_errors;
use crate::db::{run_in_transaction, DbPool};
use crate::materialiser;
use crate::node::BlockUpdatesStream;
use crate::shutdown::Shutdown;

/// One connection's worth of streaming: reconnect is handled by
/// `reqwest-eventsource` internally, so this only needs to run until the
/// stream closes for good or shutdown is requested, then the caller decides
/// whether to reconnect.
async fn run_connection(pool: &DbPool, settings: &Settings, bus: &Bus, shutdown: &Shutdown) {
    let mut stream =
        BlockUpdatesStream::connect(settings.sync_base_url.as_str(), &settings.sync_network);
    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut last_flush = Instant::now();
    let flush_after = Duration::from_secs(settings.dedup_flush_minutes * 60);
    let cancelled = shutdown.child_token();

    loop {
        if last_flush.elapsed() >= flush_after {
            seen_hashes.clear();
            last_flush = Instant::now();
        }

        let envelope = tokio::select! {
            _ = cancelled.cancelled() => break,
            next = stream.next_envelope() => next,
        };

        let envelope = match envelope {
            None => break,
            Some(Err(e)) => {
                tracing::warn!(area = "streaming", error = %e, "dropped malformed SSE event");
                continue;
            }
            Some(Ok(envelope)) => envelope,
        };

        if !seen_hashes.insert(envelope.header.hash.clone()) {
            continue;
        }

        let hash = envelope.header.hash.clone();
        let chain_id = envelope.header.chain_id as i32;
        let decoded = match envelope.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(area = "streaming", hash = %hash, error = %e, "undecodable envelope");
                record_streaming_error(pool, hash, chain_id).await;
                continue;
            }
        };

        let network = settings.sync_network.clone();
        let result = run_in_transaction(pool, move |conn| {
            async move {
                materialiser::materialise(conn, &network, SyncSource::Streaming, decoded).await
            }
            .scope_boxed()
        })
        .await;

        match result {
            Ok(Some(dispatch)) => bus.publish_batch(vec![dispatch]),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(area = "streaming", hash = %hash, error = %e, "materialise failed");
                record_streaming_error(pool, hash, chain_id).await;
            }
        }
    }
}

async fn record_streaming_error(pool: &DbPool, hash: String, chain_id: i32) {
    let outcome = run_in_transaction(pool, move |conn| {
        async move {
            diesel::insert_into(streaming_errors::table)
                .values(&NewStreamingError { hash, chain_id })
                .execute(conn)
                .await
                .map_err(crate::error::IndexerError::from)
        }
        .scope_boxed()
    })
    .await;
    if let Err(e) = outcome {
        tracing::error!(area = "streaming", error = %e, "failed to record streaming error row");
    }
}

/// Entry point: reconnect for as long as shutdown hasn't been requested.
pub async fn run(pool: DbPool, settings: Arc<Settings>, bus: Bus, shutdown: Shutdown) {
    while !shutdown.is_triggered() {
        run_connection(&pool, &settings, &bus, &shutdown).await;
        if shutdown.is_triggered() {
            break;
        }
        tracing::info!(area = "streaming", "SSE stream closed; reconnecting");
        shutdown.sleep_or_shutdown(Duration::from_secs(1)).await;
    }
}
