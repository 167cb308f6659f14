// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde_json::Value;

use crate::db::schema::blocks;
use crate::decode::DecodedBlock;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub id: i64,
    pub hash: String,
    pub chain_id: i32,
    pub height: i64,
    pub parent_hash: String,
    pub creation_time: i64,
    pub epoch_start: i64,
    pub feature_flags: i64,
    pub weight: String,
    pub target: String,
    pub nonce: String,
    pub payload_hash: String,
    pub adjacents: Value,
    pub miner_data: Value,
    pub transactions_hash: String,
    pub outputs_hash: String,
    pub coinbase: Value,
    pub transactions_count: i32,
    pub first_seen_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = blocks)]
pub struct NewBlock {
    pub hash: String,
    pub chain_id: i32,
    pub height: i64,
    pub parent_hash: String,
    pub creation_time: i64,
    pub epoch_start: i64,
    pub feature_flags: i64,
    pub weight: String,
    pub target: String,
    pub nonce: String,
    pub payload_hash: String,
    pub adjacents: Value,
    pub miner_data: Value,
    pub transactions_hash: String,
    pub outputs_hash: String,
    pub coinbase: Value,
    pub transactions_count: i32,
}

impl NewBlock {
    pub fn from_decoded(decoded: &DecodedBlock) -> Self {
        NewBlock {
            hash: decoded.hash.clone(),
            chain_id: decoded.chain_id,
            height: decoded.height,
            parent_hash: decoded.parent_hash.clone(),
            creation_time: decoded.creation_time,
            epoch_start: decoded.epoch_start,
            feature_flags: decoded.feature_flags,
            weight: decoded.weight.clone(),
            target: decoded.target.clone(),
            nonce: decoded.nonce.clone(),
            payload_hash: decoded.payload_hash.clone(),
            adjacents: decoded.adjacents.clone(),
            miner_data: decoded.miner_data.clone(),
            transactions_hash: decoded.transactions_hash.clone(),
            outputs_hash: decoded.outputs_hash.clone(),
            coinbase: decoded.coinbase.clone(),
            transactions_count: decoded.transactions.len() as i32,
        }
    }
}
