// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use serde_json::Value;

use crate::db::schema::signers;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = signers)]
pub struct Signer {
    pub id: i64,
    pub transaction_id: i64,
    pub pubkey: String,
    pub address: Option<String>,
    pub order_index: Option<i32>,
    pub clist: Value,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = signers)]
pub struct NewSigner {
    pub transaction_id: i64,
    pub pubkey: String,
    pub address: Option<String>,
    pub order_index: Option<i32>,
    pub clist: Value,
}
