// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-global instrumentation, in the style of `aptos-metrics-core`: a
//! handful of `prometheus` counters/histograms registered once and cloned
//! cheaply wherever a pipeline needs to bump them.
//!
//! The HTTP scrape endpoint that would expose this registry is an external
//! collaborator (§1) and is intentionally not built here.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

pub static BLOCKS_MATERIALISED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainweb_indexer_blocks_materialised_total",
        "Blocks successfully persisted by the Materialiser",
        &["chain_id", "source"]
    )
    .expect("metric registration is infallible at startup")
});

pub static DUPLICATE_BLOCKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainweb_indexer_duplicate_blocks_total",
        "Block.hash uniqueness conflicts treated as idempotent success",
        &["chain_id", "source"]
    )
    .expect("metric registration is infallible at startup")
});

pub static ARCHIVE_PAGES_COMMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainweb_indexer_archive_pages_committed_total",
        "Archive Backfiller pages committed",
        &["chain_id"]
    )
    .expect("metric registration is infallible at startup")
});

pub static RETRY_EXHAUSTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainweb_indexer_retry_exhaustions_total",
        "Bounded retries that exhausted their attempt budget",
        &["area"]
    )
    .expect("metric registration is infallible at startup")
});

pub static GAP_RANGES_DETECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainweb_indexer_gap_ranges_detected_total",
        "Missing-height ranges detected by the Gap Filler",
        &["chain_id"]
    )
    .expect("metric registration is infallible at startup")
});

pub static DISPATCHES_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainweb_indexer_dispatches_published_total",
        "DispatchInfo records pushed onto the Publication Bus",
        &["chain_id"]
    )
    .expect("metric registration is infallible at startup")
});

pub static MATERIALISE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "chainweb_indexer_materialise_duration_seconds",
        "Time to decode+persist a single block",
        &["source"]
    )
    .expect("metric registration is infallible at startup")
});
