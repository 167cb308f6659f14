// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;

use crate::db::schema::contracts;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = contracts)]
pub struct Contract {
    pub id: i64,
    pub network: String,
    pub modulename: String,
    pub chain_id: i32,
    pub symbol: String,
    pub decimals: i32,
    pub contract_type: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contracts)]
pub struct NewContract {
    pub network: String,
    pub modulename: String,
    pub chain_id: i32,
    pub symbol: String,
    pub decimals: i32,
    pub contract_type: String,
}
