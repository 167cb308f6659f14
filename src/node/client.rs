// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node HTTP API client (§6): `cut`, `header/branch`, `payload/.../outputs`,
//! and the `pact/api/v1/local` POST used by the Guards Reconciler.
//!
//! GETs are retried for transient failures by a `reqwest-middleware` /
//! `reqwest-retry` layer (idempotent by construction); the POST is not, since
//! a `local` call is not safely retriable without idempotency at the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::decode::envelope::{BlockEnvelope, RawHeader, RawPayloadWithOutputs};
use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CutHash {
    pub hash: String,
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cut {
    pub hashes: HashMap<String, CutHash>,
}

impl Cut {
    pub fn height(&self, chain_id: i32) -> Option<u64> {
        self.hashes.get(&chain_id.to_string()).map(|c| c.height)
    }
}

/// Shared node HTTP client (§5): one `reqwest` client underneath, gated by a
/// single process-wide semaphore so every caller — Backfiller cursor lookups
/// aside, since those hit the object store, not the node — competes for the
/// same 50-wide (default) budget rather than each pipeline getting its own.
#[derive(Clone)]
pub struct NodeClient {
    http: ClientWithMiddleware,
    /// Plain, unretried client for the `pact/api/v1/local` POST (§4.6) — a
    /// `local` call isn't safely retried by a transient-retry middleware,
    /// but it still needs to be the one shared `reqwest::Client` so its
    /// connection pool and keep-alives are reused, not the retried `http`
    /// client above wrapped a second time.
    http_unretried: Client,
    base_url: String,
    network: String,
    concurrency: Arc<Semaphore>,
}

impl NodeClient {
    pub fn new(
        base_url: impl Into<String>,
        network: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        let plain = Client::new();
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let http = ClientBuilder::new(plain.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        NodeClient {
            http,
            http_unretried: plain,
            base_url: base_url.into(),
            network: network.into(),
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    fn chainweb_url(&self, path: &str) -> String {
        format!("{}/chainweb/0.0/{}/{}", self.base_url, self.network, path)
    }

    pub async fn cut(&self) -> Result<Cut> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let resp = self.http.get(self.chainweb_url("cut")).send().await?;
        Ok(resp.json::<Cut>().await?)
    }

    pub async fn header_branch(
        &self,
        chain_id: i32,
        min_height: i64,
        max_height: i64,
    ) -> Result<Vec<RawHeader>> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let url = self.chainweb_url(&format!("chain/{chain_id}/header/branch"));
        let resp = self
            .http
            .get(url)
            .query(&[("minheight", min_height), ("maxheight", max_height)])
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(resp.json::<Vec<RawHeader>>().await?)
    }

    pub async fn payload_outputs(
        &self,
        chain_id: i32,
        payload_hash: &str,
    ) -> Result<RawPayloadWithOutputs> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let url = self.chainweb_url(&format!(
            "chain/{chain_id}/payload/{payload_hash}/outputs"
        ));
        let resp = self.http.get(url).send().await?;
        Ok(resp.json::<RawPayloadWithOutputs>().await?)
    }

    /// Fetch and pair headers with payloads for `[from_height, to_height]` on
    /// one chain, producing the same envelope shape the Backfiller and
    /// Streamer hand to the Materialiser.
    pub async fn fetch_headers(
        &self,
        chain_id: i32,
        from_height: i64,
        to_height: i64,
    ) -> Result<Vec<BlockEnvelope>> {
        let headers = self.header_branch(chain_id, from_height, to_height).await?;
        let mut envelopes = Vec::with_capacity(headers.len());
        for header in headers {
            let payload_with_outputs = self.payload_outputs(chain_id, &header.payload_hash).await?;
            envelopes.push(BlockEnvelope {
                header,
                payload_with_outputs,
            });
        }
        Ok(envelopes)
    }

    /// `POST .../pact/api/v1/local`, used only by the Guards Reconciler.
    /// Still counted against the shared semaphore (§5: "one node HTTP
    /// client, shared, with a global concurrency cap"), on top of the
    /// Reconciler's own `guards_concurrency`-wide bound on how many of these
    /// it issues at once.
    pub async fn pact_local(&self, chain_id: i32, body: &Value) -> Result<Value> {
        let _permit = self.concurrency.acquire().await.expect("semaphore is never closed");
        let url = self.chainweb_url(&format!("chain/{chain_id}/pact/api/v1/local"));
        let resp = self
            .http_unretried
            .post(format!("{url}?preflight=false"))
            .json(body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| IndexerError::Transient(e.into()))?;
        Ok(resp.json::<Value>().await?)
    }
}
