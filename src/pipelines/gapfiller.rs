// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Gap Filler (§4.4): periodically finds missing height ranges per chain and
//! fetches them from the node API, with bounded exponential backoff and a
//! durable record of ranges that exhaust their retry budget.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use scoped_futures::ScopedFutureExt;

use crate::bus::Bus;
use crate::config::Settings;
use crate::db::ledger::{self, HeightRange};
use crate::db::models::{NewSyncError, NewSyncStatus, SyncError, SyncSource};
use crate::db::schema::sync_errors;
use crate::db::{run_in_transaction, DbPool};
use crate::decode::envelope::BlockEnvelope;
use crate::error::{IndexerError, Result};
use crate::materialiser;
use crate::metrics;
use crate::node::NodeClient;
use crate::shutdown::Shutdown;

/// Bounded exponential backoff matching §5: base 500ms, factor 2, cap 30s,
/// at most 8 attempts total.
fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        multiplier: 2.0,
        max_interval: Duration::from_secs(30),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

const MAX_ATTEMPTS: u32 = 8;

/// Fetch `[from_height, to_height]` on `chain_id`, retrying transient
/// failures under `retry_policy()` up to `MAX_ATTEMPTS` times.
async fn fetch_with_retry(
    client: &NodeClient,
    chain_id: i32,
    from_height: i64,
    to_height: i64,
) -> Result<Vec<BlockEnvelope>> {
    let mut backoff = retry_policy();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.fetch_headers(chain_id, from_height, to_height).await {
            Ok(envelopes) => return Ok(envelopes),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
                tracing::warn!(
                    area = "gapfiller",
                    chain_id,
                    from_height,
                    to_height,
                    attempt,
                    error = %e,
                    "retrying after transient failure"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                metrics::RETRY_EXHAUSTIONS
                    .with_label_values(&["gapfiller"])
                    .inc();
                return Err(e);
            }
        }
    }
}

/// Fetch and materialise one chunk, within one transaction: all blocks in
/// the chunk commit together, or none do, and the cursor only advances on
/// success (§4.1, §4.4).
async fn fill_chunk(
    pool: &DbPool,
    client: &NodeClient,
    bus: &Bus,
    network: &str,
    chain_id: i32,
    chunk: HeightRange,
) -> Result<()> {
    let envelopes = fetch_with_retry(client, chain_id, chunk.from_height, chunk.to_height).await?;

    let network_owned = network.to_string();
    let batch = run_in_transaction(pool, move |conn| {
        let network = network_owned.clone();
        async move {
            let mut batch = Vec::new();
            for envelope in envelopes {
                let decoded = envelope.decode()?;
                if let Some(dispatch) =
                    materialiser::materialise(conn, &network, SyncSource::Api, decoded)
                        .await?
                {
                    batch.push(dispatch);
                }
            }
            ledger::save_cursor(
                conn,
                NewSyncStatus::height_cursor(
                    &network,
                    chain_id,
                    "api/",
                    SyncSource::Api,
                    chunk.from_height,
                    chunk.to_height,
                ),
            )
            .await?;
            Ok(batch)
        }
        .scope_boxed()
    })
    .await?;

    bus.publish_batch(batch);
    Ok(())
}

/// Split a gap into `chunk_size`-height pieces, in ascending order.
fn split_into_chunks(gap: HeightRange, chunk_size: i64) -> Vec<HeightRange> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut from_height = gap.from_height;
    while from_height <= gap.to_height {
        let to_height = (from_height + chunk_size - 1).min(gap.to_height);
        chunks.push(HeightRange {
            from_height,
            to_height,
        });
        from_height = to_height + 1;
    }
    chunks
}

async fn record_sync_error(pool: &DbPool, network: &str, chain_id: i32, chunk: HeightRange) {
    let network = network.to_string();
    let outcome = run_in_transaction(pool, move |conn| {
        async move {
            diesel::insert_into(sync_errors::table)
                .values(&NewSyncError {
                    network,
                    chain_id,
                    from_height: chunk.from_height,
                    to_height: chunk.to_height,
                    source: SyncSource::Api.as_str().to_string(),
                })
                .execute(conn)
                .await
                .map_err(IndexerError::from)
        }
        .scope_boxed()
    })
    .await;
    if let Err(e) = outcome {
        tracing::error!(area = "gapfiller", error = %e, "failed to record sync error row");
    }
}

/// One tick of gap detection + fetch for a single chain (§4.4 steps 1-5).
async fn tick_chain(
    pool: &DbPool,
    client: &NodeClient,
    bus: &Bus,
    settings: &Settings,
    chain_id: i32,
) {
    let tip = match client.cut().await {
        Ok(cut) => match cut.height(chain_id) {
            Some(height) => height as i64,
            None => return,
        },
        Err(e) => {
            tracing::warn!(area = "gapfiller", chain_id, error = %e, "failed to fetch cut");
            return;
        }
    };

    let gaps = {
        let pool = pool.clone();
        let floor = settings.sync_min_height as i64;
        let limit = settings.gap_ranges_per_tick;
        run_in_transaction(&pool, move |conn| {
            async move { ledger::next_missing_range(conn, chain_id, floor, tip, limit).await }
                .scope_boxed()
        })
        .await
    };

    let gaps = match gaps {
        Ok(gaps) => gaps,
        Err(e) => {
            tracing::warn!(area = "gapfiller", chain_id, error = %e, "failed to detect gaps");
            return;
        }
    };

    if !gaps.is_empty() {
        metrics::GAP_RANGES_DETECTED
            .with_label_values(&[&chain_id.to_string()])
            .inc_by(gaps.len() as u64);
    }

    for gap in gaps {
        for chunk in split_into_chunks(gap, settings.sync_fetch_interval_in_blocks as i64) {
            if let Err(e) = fill_chunk(
                pool,
                client,
                bus,
                &settings.sync_network,
                chain_id,
                chunk,
            )
            .await
            {
                tracing::warn!(
                    area = "gapfiller",
                    chain_id,
                    from_height = chunk.from_height,
                    to_height = chunk.to_height,
                    error = %e,
                    "gap chunk exhausted retries"
                );
                record_sync_error(pool, &settings.sync_network, chain_id, chunk).await;
            }
        }
    }
}

/// Re-attempt previously recorded `SyncError` rows; delete the row on
/// success so a chunk is never retried twice for the same failure (§4.4).
async fn retry_recorded_errors(pool: &DbPool, client: &NodeClient, bus: &Bus, network: &str) {
    let rows: Result<Vec<SyncError>> = run_in_transaction(pool, {
        let network = network.to_string();
        move |conn| {
            async move {
                sync_errors::table
                    .filter(sync_errors::network.eq(&network))
                    .load::<SyncError>(conn)
                    .await
                    .map_err(IndexerError::from)
            }
            .scope_boxed()
        }
    })
    .await;

    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(area = "gapfiller", error = %e, "failed to load sync errors");
            return;
        }
    };

    for row in rows {
        let chunk = HeightRange {
            from_height: row.from_height,
            to_height: row.to_height,
        };
        match fill_chunk(pool, client, bus, network, row.chain_id, chunk).await {
            Ok(()) => {
                let outcome = run_in_transaction(pool, move |conn| {
                    async move {
                        diesel::delete(sync_errors::table.filter(sync_errors::id.eq(row.id)))
                            .execute(conn)
                            .await
                            .map_err(IndexerError::from)
                    }
                    .scope_boxed()
                })
                .await;
                if let Err(e) = outcome {
                    tracing::error!(area = "gapfiller", error = %e, "failed to clear sync error row");
                }
            }
            Err(e) => {
                tracing::warn!(
                    area = "gapfiller",
                    chain_id = row.chain_id,
                    error = %e,
                    "recorded sync error still unresolved"
                );
            }
        }
    }
}

/// Entry point: ticks every `sleep_interval_ms`. Each tick fans chains out
/// in parallel (§5: "within a pipeline, per-chain work is parallel") — the
/// node client's own semaphore, not sequential iteration, is what bounds
/// concurrency against the node — then sweeps previously recorded errors.
pub async fn run(
    pool: DbPool,
    client: NodeClient,
    bus: Bus,
    settings: Arc<Settings>,
    shutdown: Shutdown,
) {
    let tick = Duration::from_millis(settings.sleep_interval_ms);
    while !shutdown.is_triggered() {
        let chain_ticks = (0..settings.chain_count as i32).map(|chain_id| {
            tick_chain(&pool, &client, &bus, &settings, chain_id)
        });
        futures::future::join_all(chain_ticks).await;
        retry_recorded_errors(&pool, &client, &bus, &settings.sync_network).await;
        shutdown.sleep_or_shutdown(tick).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_gap_into_even_chunks() {
        let gap = HeightRange {
            from_height: 100,
            to_height: 104,
        };
        let chunks = split_into_chunks(gap, 2);
        assert_eq!(
            chunks,
            vec![
                HeightRange {
                    from_height: 100,
                    to_height: 101
                },
                HeightRange {
                    from_height: 102,
                    to_height: 103
                },
                HeightRange {
                    from_height: 104,
                    to_height: 104
                },
            ]
        );
    }

    #[test]
    fn single_chunk_when_gap_smaller_than_chunk_size() {
        let gap = HeightRange {
            from_height: 100,
            to_height: 100,
        };
        let chunks = split_into_chunks(gap, 100);
        assert_eq!(chunks, vec![gap]);
    }

    #[test]
    fn zero_chunk_size_falls_back_to_one_height_per_chunk() {
        let gap = HeightRange {
            from_height: 100,
            to_height: 102,
        };
        let chunks = split_into_chunks(gap, 0);
        assert_eq!(
            chunks,
            vec![
                HeightRange {
                    from_height: 100,
                    to_height: 100
                },
                HeightRange {
                    from_height: 101,
                    to_height: 101
                },
                HeightRange {
                    from_height: 102,
                    to_height: 102
                },
            ]
        );
    }
}
