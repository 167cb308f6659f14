// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use serde_json::Value;

use crate::db::schema::events;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: i64,
    pub transaction_id: i64,
    pub request_key: String,
    pub chain_id: i32,
    pub order_index: i32,
    pub module: String,
    pub name: String,
    pub params: Value,
    pub block_hash: String,
    pub height: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub transaction_id: i64,
    pub request_key: String,
    pub chain_id: i32,
    pub order_index: i32,
    pub module: String,
    pub name: String,
    pub params: Value,
    pub block_hash: String,
    pub height: i64,
}

impl NewEvent {
    /// `module.name`, used as the bus's "qualified event name" filter key.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}
