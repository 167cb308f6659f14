// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod envelope;
pub mod feature_flags;
pub mod payload;

pub use envelope::{BlockEnvelope, DecodedBlock, DecodedTransaction};
pub use feature_flags::{decode_feature_flags, encode_feature_flags};
pub use payload::Payload;
