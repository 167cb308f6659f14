// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::db::schema::streaming_errors;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = streaming_errors)]
pub struct StreamingError {
    pub id: i64,
    pub hash: String,
    pub chain_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = streaming_errors)]
pub struct NewStreamingError {
    pub hash: String,
    pub chain_id: i32,
}
