// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crate-wide error taxonomy, matching the four kinds in the error-handling design:
//! transient network, schema-validation, persistence conflict, fatal configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// Network I/O that is worth retrying: connection resets, timeouts, 5xx.
    #[error("transient network error: {0}")]
    Transient(#[source] anyhow::Error),

    /// A payload or header failed to decode or validate against the expected shape.
    /// Logged and skipped; recorded as a `SyncError` on the API path.
    #[error("schema validation failed: {0}")]
    Schema(String),

    /// A unique-constraint violation other than `Block.hash` (which is idempotent
    /// success, not an error) or any other persistence failure that must roll back
    /// the enclosing transaction.
    #[error("persistence conflict: {0}")]
    Conflict(#[source] diesel::result::Error),

    /// Missing or malformed required configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl IndexerError {
    /// True for errors the caller should retry with backoff rather than give up on.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexerError::Transient(_) | IndexerError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
