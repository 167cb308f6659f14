// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! The four ingestion/reconciliation pipelines (§4.2-§4.4, §4.6), each
//! independently schedulable and each driven off the same `DbPool`, `Bus`,
//! and `Shutdown` handle.

pub mod backfiller;
pub mod gapfiller;
pub mod guards;
pub mod streamer;
