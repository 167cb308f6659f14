// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde_json::Value;

use crate::db::schema::transactions;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = transactions)]
pub struct Transaction {
    pub id: i64,
    pub block_id: i64,
    pub request_key: String,
    pub hash: Option<String>,
    pub sender: String,
    pub chain_id: i32,
    pub creation_time: i64,
    pub result: Value,
    pub logs: Option<String>,
    pub num_events: i32,
    pub txid: Option<String>,
    pub canonical: bool,
    pub inserted_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub block_id: i64,
    pub request_key: String,
    pub hash: Option<String>,
    pub sender: String,
    pub chain_id: i32,
    pub creation_time: i64,
    pub result: Value,
    pub logs: Option<String>,
    pub num_events: i32,
    pub txid: Option<String>,
    pub canonical: bool,
}

/// The coinbase output is inserted as a synthetic transaction with
/// `sender = "coinbase"` (§4.5 step 4).
pub const COINBASE_SENDER: &str = "coinbase";
