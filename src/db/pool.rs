// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Connection pool and the transaction helper every pipeline builds on.
//!
//! §4.1's invariant — "a cursor advance is persisted in the same transaction
//! that persisted the corresponding blocks" — is enforced structurally here:
//! [`run_in_transaction`] is the only way a pipeline opens a database
//! transaction, and it commits iff the caller's future returns `Ok`.

use diesel::Connection;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{IndexerError, Result};

pub type DbPool = Pool<AsyncPgConnection>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub async fn build_pool(database_url: &str) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .await
        .map_err(|e| IndexerError::Config(format!("failed to build database pool: {e}")))
}

/// Apply any pending migrations. `diesel_migrations`'s `MigrationHarness` is
/// synchronous, so this opens its own blocking `PgConnection` rather than
/// going through the async pool — run once at startup, before any pipeline
/// touches the database.
pub fn run_pending_migrations(database_url: &str) -> Result<()> {
    let mut conn = diesel::PgConnection::establish(database_url)
        .map_err(|e| IndexerError::Config(format!("failed to connect for migrations: {e}")))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| IndexerError::Config(format!("failed to run migrations: {e}")))?;
    Ok(())
}

/// Run `body` inside a single database transaction. On `Ok`, the transaction
/// commits; on `Err`, it rolls back and the error propagates unchanged. This
/// is the only entry point pipelines use to get a transactional connection,
/// so the commit-or-rollback behavior described throughout §4 is uniform.
pub async fn run_in_transaction<T, F>(pool: &DbPool, body: F) -> Result<T>
where
    T: Send + 'static,
    F: for<'c> FnOnce(
            &'c mut AsyncPgConnection,
        )
            -> scoped_futures::ScopedBoxFuture<'static, 'c, Result<T>>
        + Send
        + 'static,
{
    let mut conn = pool
        .get()
        .await
        .map_err(|e| IndexerError::Config(format!("failed to acquire connection: {e}")))?;

    conn.transaction(body).await
}
