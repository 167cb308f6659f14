// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::db::schema::sync_errors;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = sync_errors)]
pub struct SyncError {
    pub id: i64,
    pub network: String,
    pub chain_id: i32,
    pub from_height: i64,
    pub to_height: i64,
    pub source: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sync_errors)]
pub struct NewSyncError {
    pub network: String,
    pub chain_id: i32,
    pub from_height: i64,
    pub to_height: i64,
    pub source: String,
}
