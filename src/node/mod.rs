// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod objectstore;
pub mod sse;

pub use client::{Cut, NodeClient};
pub use objectstore::ArchiveStore;
pub use sse::BlockUpdatesStream;
