// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod ledger;
pub mod models;
pub mod pool;
pub mod schema;

pub use pool::{build_pool, run_in_transaction, run_pending_migrations, DbPool};
