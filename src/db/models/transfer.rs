// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use bigdecimal::BigDecimal;
use diesel::prelude::*;

use crate::db::schema::transfers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Fungible,
    NonFungible,
}

impl TransferType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferType::Fungible => "fungible",
            TransferType::NonFungible => "non-fungible",
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = transfers)]
pub struct Transfer {
    pub id: i64,
    pub transaction_id: i64,
    pub contract_id: Option<i64>,
    pub amount: BigDecimal,
    pub from_acct: String,
    pub to_acct: String,
    pub chain_id: i32,
    pub modulehash: Option<String>,
    pub modulename: String,
    pub request_key: String,
    pub payload_hash: String,
    pub transfer_type: String,
    pub has_token_id: bool,
    pub token_id: Option<String>,
    pub network: String,
    pub canonical: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transfers)]
pub struct NewTransfer {
    pub transaction_id: i64,
    pub contract_id: Option<i64>,
    pub amount: BigDecimal,
    pub from_acct: String,
    pub to_acct: String,
    pub chain_id: i32,
    pub modulehash: Option<String>,
    pub modulename: String,
    pub request_key: String,
    pub payload_hash: String,
    pub transfer_type: String,
    pub has_token_id: bool,
    pub token_id: Option<String>,
    pub network: String,
    pub canonical: bool,
}

/// Modules known to mint non-fungible transfers; everything else classifies
/// as `fungible` (§4.5 step 3). A short allow-list rather than a registry
/// lookup — extending it is a config change, not a schema change.
const KNOWN_NFT_MODULES: &[&str] = &["marmalade-v2.ledger", "marmalade.ledger", "poly-fungible-v1"];

pub fn classify_transfer_module(modulename: &str) -> TransferType {
    if KNOWN_NFT_MODULES.contains(&modulename) {
        TransferType::NonFungible
    } else {
        TransferType::Fungible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_classifies_fungible() {
        assert_eq!(
            classify_transfer_module("coin"),
            TransferType::Fungible
        );
    }

    #[test]
    fn known_nft_module_classifies_non_fungible() {
        assert_eq!(
            classify_transfer_module("marmalade-v2.ledger"),
            TransferType::NonFungible
        );
    }
}
