// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hand-declared `diesel::table!` definitions for the entities in §3.
//! There is no live database to run `diesel print-schema` against, so this
//! file plays that role by hand, following the same generated-schema
//! conventions (surrogate `id` primary keys, `diesel::joinable!` edges).

diesel::table! {
    blocks (id) {
        id -> BigInt,
        hash -> Text,
        chain_id -> Integer,
        height -> BigInt,
        parent_hash -> Text,
        creation_time -> BigInt,
        epoch_start -> BigInt,
        feature_flags -> BigInt,
        weight -> Text,
        target -> Text,
        nonce -> Text,
        payload_hash -> Text,
        adjacents -> Jsonb,
        miner_data -> Jsonb,
        transactions_hash -> Text,
        outputs_hash -> Text,
        coinbase -> Jsonb,
        transactions_count -> Integer,
        first_seen_at -> Timestamp,
    }
}

diesel::table! {
    transactions (id) {
        id -> BigInt,
        block_id -> BigInt,
        request_key -> Text,
        hash -> Nullable<Text>,
        sender -> Text,
        chain_id -> Integer,
        creation_time -> BigInt,
        result -> Jsonb,
        logs -> Nullable<Text>,
        num_events -> Integer,
        txid -> Nullable<Text>,
        canonical -> Bool,
        inserted_at -> Timestamp,
    }
}

diesel::table! {
    events (id) {
        id -> BigInt,
        transaction_id -> BigInt,
        request_key -> Text,
        chain_id -> Integer,
        order_index -> Integer,
        module -> Text,
        name -> Text,
        params -> Jsonb,
        block_hash -> Text,
        height -> BigInt,
    }
}

diesel::table! {
    transfers (id) {
        id -> BigInt,
        transaction_id -> BigInt,
        contract_id -> Nullable<BigInt>,
        amount -> Numeric,
        from_acct -> Text,
        to_acct -> Text,
        chain_id -> Integer,
        modulehash -> Nullable<Text>,
        modulename -> Text,
        request_key -> Text,
        payload_hash -> Text,
        transfer_type -> Text,
        has_token_id -> Bool,
        token_id -> Nullable<Text>,
        network -> Text,
        canonical -> Bool,
    }
}

diesel::table! {
    signers (id) {
        id -> BigInt,
        transaction_id -> BigInt,
        pubkey -> Text,
        address -> Nullable<Text>,
        order_index -> Nullable<Integer>,
        clist -> Jsonb,
    }
}

diesel::table! {
    balances (id) {
        id -> BigInt,
        account -> Text,
        chain_id -> Integer,
        module -> Text,
        token_id -> Nullable<Text>,
        balance -> Numeric,
    }
}

diesel::table! {
    guards (id) {
        id -> BigInt,
        account -> Text,
        chain_id -> Integer,
        module -> Text,
        keys -> Jsonb,
        predicate -> Text,
    }
}

diesel::table! {
    contracts (id) {
        id -> BigInt,
        network -> Text,
        modulename -> Text,
        chain_id -> Integer,
        symbol -> Text,
        decimals -> Integer,
        contract_type -> Text,
    }
}

diesel::table! {
    sync_status (id) {
        id -> BigInt,
        network -> Text,
        chain_id -> Integer,
        prefix -> Text,
        source -> Text,
        object_key -> Nullable<Text>,
        from_height -> Nullable<BigInt>,
        to_height -> Nullable<BigInt>,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    sync_errors (id) {
        id -> BigInt,
        network -> Text,
        chain_id -> Integer,
        from_height -> BigInt,
        to_height -> BigInt,
        source -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    streaming_errors (id) {
        id -> BigInt,
        hash -> Text,
        chain_id -> Integer,
        created_at -> Timestamp,
    }
}

diesel::joinable!(transactions -> blocks (block_id));
diesel::joinable!(events -> transactions (transaction_id));
diesel::joinable!(transfers -> transactions (transaction_id));
diesel::joinable!(transfers -> contracts (contract_id));
diesel::joinable!(signers -> transactions (transaction_id));

diesel::allow_tables_to_appear_in_same_query!(
    blocks,
    transactions,
    events,
    transfers,
    signers,
    balances,
    guards,
    contracts,
    sync_status,
    sync_errors,
    streaming_errors,
);
