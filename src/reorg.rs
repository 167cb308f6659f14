// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! The background reorg handler (§4.5 "Canonicalisation"): triggered from
//! within the Materialiser's own transaction whenever a second block is
//! observed at an already-occupied `(chainId, height)`. Determines the new
//! heaviest tip at that height and flips `canonical` on transactions and
//! transfers, then walks forward along `parent_hash` links to correct every
//! descendant block that inherits the change.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::models::Block;
use crate::db::schema::{blocks, transactions, transfers};
use crate::error::Result;

/// Compare two chainweb `weight` fields as big-endian magnitudes. Weights
/// arrive as hex strings (little-endian byte order, per the node's wire
/// format); ties are broken by the caller on `hash`. Falls back to a plain
/// string compare if either value isn't valid hex, which only ever affects
/// malformed test fixtures since the node never emits non-hex weights.
fn compare_weight(a: &str, b: &str) -> std::cmp::Ordering {
    match (decode_weight(a), decode_weight(b)) {
        (Some(mut a_le), Some(mut b_le)) => {
            a_le.reverse();
            b_le.reverse();
            let a_trimmed = trim_leading_zeros(&a_le);
            let b_trimmed = trim_leading_zeros(&b_le);
            a_trimmed
                .len()
                .cmp(&b_trimmed.len())
                .then_with(|| a_trimmed.cmp(b_trimmed))
        }
        _ => a.cmp(b),
    }
}

fn decode_weight(raw: &str) -> Option<Vec<u8>> {
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).ok()
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}

/// `true` if `candidate` is the new heaviest tip among blocks at the same
/// height — greatest `weight`, ties broken by `hash` lexicographically
/// (§4.5).
fn is_heavier(candidate: &Block, other: &Block) -> bool {
    match compare_weight(&candidate.weight, &other.weight) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.hash > other.hash,
    }
}

async fn set_canonical_for_block(
    conn: &mut AsyncPgConnection,
    block_id: i64,
    canonical: bool,
) -> Result<()> {
    diesel::update(transactions::table.filter(transactions::block_id.eq(block_id)))
        .set(transactions::canonical.eq(canonical))
        .execute(conn)
        .await?;

    let tx_ids: Vec<i64> = transactions::table
        .filter(transactions::block_id.eq(block_id))
        .select(transactions::id)
        .load(conn)
        .await?;

    diesel::update(transfers::table.filter(transfers::transaction_id.eq_any(tx_ids)))
        .set(transfers::canonical.eq(canonical))
        .execute(conn)
        .await?;

    Ok(())
}

/// Walk forward from `(chain_id, parent_hash)` at `height + 1`, flipping
/// `canonical` on every block descended from it, until the chain tip (no
/// child found) is reached. Used both for the newly-winning path (marked
/// true) and the newly-losing path (marked false) after a fork resolves.
async fn propagate_forward(
    conn: &mut AsyncPgConnection,
    chain_id: i32,
    start_hash: &str,
    start_height: i64,
    canonical: bool,
) -> Result<()> {
    let mut parent_hash = start_hash.to_string();
    let mut next_height = start_height + 1;

    loop {
        let children: Vec<Block> = blocks::table
            .filter(blocks::chain_id.eq(chain_id))
            .filter(blocks::height.eq(next_height))
            .filter(blocks::parent_hash.eq(&parent_hash))
            .load(conn)
            .await?;

        let Some(first) = children.first() else {
            break;
        };

        for child in &children {
            set_canonical_for_block(conn, child.id, canonical).await?;
        }

        parent_hash = first.hash.clone();
        next_height += 1;
    }

    Ok(())
}

/// Resolve a fork at `(chain_id, height)` (§4.5, §8 scenario 6). Called from
/// the Materialiser immediately after a non-duplicate block is inserted at a
/// height that already holds another row. Re-derives the heaviest tip among
/// every block currently at that height, flips `canonical` for the winner
/// and every loser at that exact height, then propagates the change forward
/// along `parent_hash` until each path's tip is reached.
///
/// Runs inside the caller's transaction: on rollback, the reorg itself rolls
/// back with the block insert that triggered it.
pub async fn resolve_fork(
    conn: &mut AsyncPgConnection,
    chain_id: i32,
    height: i64,
) -> Result<()> {
    let contenders: Vec<Block> = blocks::table
        .filter(blocks::chain_id.eq(chain_id))
        .filter(blocks::height.eq(height))
        .load(conn)
        .await?;

    if contenders.len() < 2 {
        return Ok(());
    }

    let winner = contenders
        .iter()
        .fold(None::<&Block>, |best, candidate| match best {
            None => Some(candidate),
            Some(current) if is_heavier(candidate, current) => Some(candidate),
            Some(current) => Some(current),
        })
        .expect("contenders is non-empty");

    for block in &contenders {
        let canonical = block.hash == winner.hash;
        set_canonical_for_block(conn, block.id, canonical).await?;
        propagate_forward(conn, chain_id, &block.hash, height, canonical).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(hash: &str, weight: &str) -> Block {
        Block {
            id: 0,
            hash: hash.to_string(),
            chain_id: 0,
            height: 500,
            parent_hash: "parent".to_string(),
            creation_time: 0,
            epoch_start: 0,
            feature_flags: 0,
            weight: weight.to_string(),
            target: String::new(),
            nonce: String::new(),
            payload_hash: String::new(),
            adjacents: serde_json::json!({}),
            miner_data: serde_json::json!({}),
            transactions_hash: String::new(),
            outputs_hash: String::new(),
            coinbase: serde_json::json!({}),
            transactions_count: 0,
            first_seen_at: chrono::NaiveDateTime::from_timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn heavier_weight_wins() {
        let light = block("B1", "0a");
        let heavy = block("B2", "14");
        assert!(is_heavier(&heavy, &light));
        assert!(!is_heavier(&light, &heavy));
    }

    #[test]
    fn equal_weight_breaks_tie_on_hash() {
        let b1 = block("AAA", "ff");
        let b2 = block("BBB", "ff");
        assert!(is_heavier(&b2, &b1));
        assert!(!is_heavier(&b1, &b2));
    }

    #[test]
    fn weight_compares_as_magnitude_not_string_length() {
        // "c8" (200) decoded as a single little-endian byte is heavier than
        // "0a00" (10, zero-padded to two bytes) despite the shorter hex string.
        assert_eq!(compare_weight("c8", "0a00"), std::cmp::Ordering::Greater);
    }

    #[test]
    fn non_hex_weight_falls_back_to_string_compare() {
        assert_eq!(compare_weight("zz", "aa"), "zz".cmp("aa"));
    }
}
