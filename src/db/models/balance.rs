// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use bigdecimal::BigDecimal;
use diesel::prelude::*;

use crate::db::schema::balances;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = balances)]
pub struct Balance {
    pub id: i64,
    pub account: String,
    pub chain_id: i32,
    pub module: String,
    pub token_id: Option<String>,
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = balances)]
pub struct NewBalance {
    pub account: String,
    pub chain_id: i32,
    pub module: String,
    pub token_id: Option<String>,
    pub balance: BigDecimal,
}
