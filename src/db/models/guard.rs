// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use serde_json::Value;

use crate::db::schema::guards;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = guards)]
pub struct Guard {
    pub id: i64,
    pub account: String,
    pub chain_id: i32,
    pub module: String,
    pub keys: Value,
    pub predicate: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = guards)]
pub struct NewGuard {
    pub account: String,
    pub chain_id: i32,
    pub module: String,
    pub keys: Value,
    pub predicate: String,
}
