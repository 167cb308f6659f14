// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Sync-Status Ledger (§4.1): a durable record of per-(network, chain,
//! prefix, source) progress cursors and gap descriptors. Read by any
//! pipeline; written only by its owning pipeline.

use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::models::{NewSyncStatus, SyncSource, SyncStatus};
use crate::db::schema::{blocks, sync_status};
use crate::error::Result;

/// A contiguous, not-yet-attempted missing height range (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightRange {
    pub from_height: i64,
    pub to_height: i64,
}

pub async fn find_last_cursor(
    conn: &mut AsyncPgConnection,
    network: &str,
    chain_id: i32,
    prefix: &str,
    source: SyncSource,
) -> Result<Option<SyncStatus>> {
    let row = sync_status::table
        .filter(sync_status::network.eq(network))
        .filter(sync_status::chain_id.eq(chain_id))
        .filter(sync_status::prefix.eq(prefix))
        .filter(sync_status::source.eq(source.as_str()))
        .first::<SyncStatus>(conn)
        .await
        .optional()?;
    Ok(row)
}

/// Upsert within the caller's transaction (§4.1 invariant: the cursor advance
/// commits with the blocks it describes, in the same transaction).
pub async fn save_cursor(conn: &mut AsyncPgConnection, cursor: NewSyncStatus) -> Result<()> {
    diesel::insert_into(sync_status::table)
        .values(&cursor)
        .on_conflict((
            sync_status::network,
            sync_status::chain_id,
            sync_status::prefix,
            sync_status::source,
        ))
        .do_update()
        .set((
            sync_status::object_key.eq(&cursor.object_key),
            sync_status::from_height.eq(&cursor.from_height),
            sync_status::to_height.eq(&cursor.to_height),
            sync_status::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Highest `to_height` per chain, across the given sources.
pub async fn last_sync_for_all_chains(
    conn: &mut AsyncPgConnection,
    network: &str,
    sources: &[SyncSource],
) -> Result<Vec<(i32, Option<i64>)>> {
    let source_strs: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
    let rows = sync_status::table
        .filter(sync_status::network.eq(network))
        .filter(sync_status::source.eq_any(source_strs))
        .group_by(sync_status::chain_id)
        .select((sync_status::chain_id, max(sync_status::to_height)))
        .load::<(i32, Option<i64>)>(conn)
        .await?;
    Ok(rows)
}

/// Detect the lowest-height gaps in `[floor, tip)` for `chain_id`, up to
/// `limit` ranges (§4.4). A gap is a contiguous interval with no `Block` row;
/// this is a one-query derivation over `blocks.height` rather than a
/// maintained materialised view, since the indexer only ever needs the
/// lowest unattempted gap per tick.
pub async fn next_missing_range(
    conn: &mut AsyncPgConnection,
    chain_id: i32,
    floor: i64,
    tip: i64,
    limit: usize,
) -> Result<Vec<HeightRange>> {
    if floor >= tip {
        return Ok(Vec::new());
    }

    let present: Vec<i64> = blocks::table
        .filter(blocks::chain_id.eq(chain_id))
        .filter(blocks::height.ge(floor))
        .filter(blocks::height.lt(tip))
        .select(blocks::height)
        .distinct()
        .order(blocks::height.asc())
        .load::<i64>(conn)
        .await?;

    Ok(gaps_in_range(floor, tip, &present, limit))
}

/// Pure helper (unit-testable without a database): given the sorted set of
/// present heights in `[floor, tip)`, return the lowest-height contiguous
/// gaps, up to `limit`.
pub fn gaps_in_range(floor: i64, tip: i64, present: &[i64], limit: usize) -> Vec<HeightRange> {
    let mut ranges = Vec::new();
    let mut cursor = floor;
    let mut present_iter = present.iter().peekable();

    while cursor < tip && ranges.len() < limit {
        // Skip past any present heights at the cursor.
        while present_iter.peek().is_some_and(|&&h| h == cursor) {
            present_iter.next();
            cursor += 1;
        }
        if cursor >= tip {
            break;
        }
        let gap_start = cursor;
        while cursor < tip && !present_iter.peek().is_some_and(|&&h| h == cursor) {
            cursor += 1;
        }
        ranges.push(HeightRange {
            from_height: gap_start,
            to_height: cursor - 1,
        });
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_gap_at_tip() {
        // heights {100,101,103,104}; tip=105 (exclusive upper bound of
        // "height < tip"). Scenario 4 in §8: gap is [102,102].
        let present = [100, 101, 103, 104];
        let gaps = gaps_in_range(100, 105, &present, 8);
        assert_eq!(
            gaps,
            vec![HeightRange {
                from_height: 102,
                to_height: 102
            }]
        );
    }

    #[test]
    fn no_gap_when_contiguous() {
        let present = [100, 101, 102, 103, 104];
        assert!(gaps_in_range(100, 105, &present, 8).is_empty());
    }

    #[test]
    fn min_height_greater_or_equal_to_max_returns_empty() {
        assert!(gaps_in_range(105, 105, &[], 8).is_empty());
        assert!(gaps_in_range(110, 105, &[], 8).is_empty());
    }

    #[test]
    fn respects_limit() {
        // Two single-height gaps at 101 and 103.
        let present = [100, 102, 104];
        let gaps = gaps_in_range(100, 105, &present, 1);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].from_height, 101);
    }

    #[test]
    fn trailing_gap_before_tip() {
        let present = [100];
        let gaps = gaps_in_range(100, 103, &present, 8);
        assert_eq!(
            gaps,
            vec![HeightRange {
                from_height: 101,
                to_height: 102
            }]
        );
    }
}
