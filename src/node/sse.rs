// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tip Streamer transport (§4.3, §6): a server-sent-event connection to
//! `{base}/{network}/block/updates`, yielding decoded `BlockHeader` events.
//! `reqwest-eventsource` auto-reconnects on stream error, matching the
//! "the SSE client is expected to auto-reconnect" contract.

use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::decode::envelope::BlockEnvelope;
use crate::error::{IndexerError, Result};

pub struct BlockUpdatesStream {
    source: EventSource,
}

impl BlockUpdatesStream {
    pub fn connect(base_url: &str, network: &str) -> Self {
        let url = format!("{base_url}/chainweb/0.0/{network}/block/updates");
        BlockUpdatesStream {
            source: EventSource::get(url),
        }
    }

    /// Next `BlockHeader` event, decoded. Returns `None` only once the
    /// underlying stream is closed for good (the client itself handles
    /// reconnects transparently, so this is rare in practice).
    pub async fn next_envelope(&mut self) -> Option<Result<BlockEnvelope>> {
        loop {
            match self.source.next().await {
                None => return None,
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(msg))) => {
                    if msg.event != "BlockHeader" {
                        continue;
                    }
                    let parsed = serde_json::from_str::<BlockEnvelope>(&msg.data).map_err(|e| {
                        IndexerError::Schema(format!("malformed BlockHeader event: {e}"))
                    });
                    return Some(parsed);
                }
                Some(Err(e)) => return Some(Err(IndexerError::Transient(e.into()))),
            }
        }
    }
}
