// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration, loaded the way `ecosystem/indexer` loads
//! its settings: `dotenv` for local overrides, then `envy::from_env` into a
//! single typed struct. Missing required variables are a fatal configuration
//! error (§7) — the binary aborts startup rather than limping along with
//! defaults.

use serde::Deserialize;

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Node base URL, e.g. `https://api.chainweb.com`.
    pub sync_base_url: url::Url,

    /// e.g. `mainnet01`.
    pub sync_network: String,

    /// Floor height for ingestion; also the lower bound for gap detection.
    #[serde(default = "default_min_height")]
    pub sync_min_height: u64,

    /// Chunk size (in blocks) the Gap Filler splits a detected gap into.
    #[serde(default = "default_fetch_interval")]
    pub sync_fetch_interval_in_blocks: u64,

    /// Daemon tick interval for the Gap Filler and Guards Reconciler scheduling.
    #[serde(default = "default_sleep_interval_ms")]
    pub sleep_interval_ms: u64,

    pub database_url: String,

    /// Number of parallel chains, `C` in the glossary.
    #[serde(default = "default_chain_count")]
    pub chain_count: u32,

    /// Object-store bucket/prefix holding archived headers+payloads.
    pub archive_bucket_url: String,
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Archive Backfiller page size (§4.2, default 20).
    #[serde(default = "default_archive_page_size")]
    pub archive_page_size: usize,
    /// Per-page materialisation concurrency (§5, default 20).
    #[serde(default = "default_archive_concurrency")]
    pub archive_concurrency: usize,
    /// Bound on archive-loop iterations per invocation (§4.2).
    #[serde(default = "default_archive_max_iterations")]
    pub archive_max_iterations: usize,

    /// Global node-API concurrency cap (§5, default 50).
    #[serde(default = "default_node_api_concurrency")]
    pub node_api_concurrency: usize,
    /// Gap ranges fetched per chain per tick (§4.4).
    #[serde(default = "default_gap_ranges_per_tick")]
    pub gap_ranges_per_tick: usize,

    /// Guards Reconciler batch size (§4.6, default 1000).
    #[serde(default = "default_guards_batch_size")]
    pub guards_batch_size: i64,
    /// Guards Reconciler in-flight request bound (§4.6, default 50).
    #[serde(default = "default_guards_concurrency")]
    pub guards_concurrency: usize,

    /// Tip Streamer dedup-set flush interval, minutes (§4.3, default 10).
    #[serde(default = "default_dedup_flush_minutes")]
    pub dedup_flush_minutes: u64,
}

fn default_min_height() -> u64 {
    0
}
fn default_fetch_interval() -> u64 {
    100
}
fn default_sleep_interval_ms() -> u64 {
    5_000
}
fn default_chain_count() -> u32 {
    20
}
fn default_archive_prefix() -> String {
    "headers/".to_string()
}
fn default_archive_page_size() -> usize {
    20
}
fn default_archive_concurrency() -> usize {
    20
}
fn default_archive_max_iterations() -> usize {
    usize::MAX
}
fn default_node_api_concurrency() -> usize {
    50
}
fn default_gap_ranges_per_tick() -> usize {
    8
}
fn default_guards_batch_size() -> i64 {
    1_000
}
fn default_guards_concurrency() -> usize {
    50
}
fn default_dedup_flush_minutes() -> u64 {
    10
}

impl Settings {
    /// Load from the process environment, with `.env` (if present) applied first.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        envy::from_env::<Settings>().map_err(|e| IndexerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_vars_is_config_error() {
        // SYNC_BASE_URL etc. are not set in the test process environment.
        // We don't mutate global env in unit tests (races with parallel tests);
        // instead verify the failure mode directly via envy on an empty map.
        let res: std::result::Result<Settings, _> =
            envy::from_iter(std::iter::empty::<(String, String)>());
        assert!(res.is_err());
    }
}
