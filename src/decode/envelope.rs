// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire shapes for the `{header, payloadWithOutputs}` envelope shared by the
//! object store, the node SSE stream, and (implicitly) the node HTTP API
//! (§6). `RawHeader`/`RawPayloadWithOutputs` are the as-received JSON shape;
//! `DecodedBlock` is what the rest of the crate (materialiser, tests) works
//! with after base64 and numeric-string fields have been resolved.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::feature_flags::encode_feature_flags;
use super::payload::decode_base64_json;
use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct RawHeader {
    pub hash: String,
    #[serde(rename = "chainId")]
    pub chain_id: u32,
    pub height: u64,
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    /// Decimal-string seconds, preserved as a string until consumed (§6).
    #[serde(rename = "creationTime")]
    pub creation_time: String,
    #[serde(rename = "epochStart")]
    pub epoch_start: String,
    #[serde(rename = "featureFlags")]
    pub feature_flags: u64,
    pub weight: String,
    pub target: String,
    pub nonce: String,
    #[serde(rename = "payloadHash")]
    pub payload_hash: String,
    pub adjacents: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPayloadWithOutputs {
    #[serde(rename = "minerData")]
    pub miner_data: String,
    pub coinbase: String,
    /// Each element is `[cmd_base64, result_base64]`.
    pub transactions: Vec<(String, String)>,
    #[serde(rename = "transactionsHash")]
    pub transactions_hash: String,
    #[serde(rename = "outputsHash")]
    pub outputs_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockEnvelope {
    pub header: RawHeader,
    #[serde(rename = "payloadWithOutputs")]
    pub payload_with_outputs: RawPayloadWithOutputs,
}

#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub cmd: Value,
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct DecodedBlock {
    pub hash: String,
    pub chain_id: i32,
    pub height: i64,
    pub parent_hash: String,
    pub creation_time: i64,
    pub epoch_start: i64,
    pub feature_flags: i64,
    pub weight: String,
    pub target: String,
    pub nonce: String,
    pub payload_hash: String,
    pub adjacents: Value,
    pub miner_data: Value,
    pub transactions_hash: String,
    pub outputs_hash: String,
    pub coinbase: Value,
    pub transactions: Vec<DecodedTransaction>,
}

fn parse_decimal_seconds(field: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .map_err(|e| IndexerError::Schema(format!("{field} is not a decimal-string integer: {e}")))
}

impl BlockEnvelope {
    pub fn decode(self) -> Result<DecodedBlock> {
        let BlockEnvelope {
            header,
            payload_with_outputs,
        } = self;

        let adjacents = serde_json::to_value(&header.adjacents)?;
        let miner_data = decode_base64_json(&payload_with_outputs.miner_data)?;
        let coinbase = decode_base64_json(&payload_with_outputs.coinbase)?;

        let mut transactions = Vec::with_capacity(payload_with_outputs.transactions.len());
        for (cmd_b64, result_b64) in &payload_with_outputs.transactions {
            transactions.push(DecodedTransaction {
                cmd: decode_base64_json(cmd_b64)?,
                result: decode_base64_json(result_b64)?,
            });
        }

        Ok(DecodedBlock {
            hash: header.hash,
            chain_id: header.chain_id as i32,
            height: header.height as i64,
            parent_hash: header.parent_hash,
            creation_time: parse_decimal_seconds("creationTime", &header.creation_time)?,
            epoch_start: parse_decimal_seconds("epochStart", &header.epoch_start)?,
            feature_flags: encode_feature_flags(header.feature_flags),
            weight: header.weight,
            target: header.target,
            nonce: header.nonce,
            payload_hash: header.payload_hash,
            adjacents,
            miner_data,
            transactions_hash: payload_with_outputs.transactions_hash,
            outputs_hash: payload_with_outputs.outputs_hash,
            coinbase,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn b64(v: &Value) -> String {
        base64::encode(serde_json::to_string(v).unwrap())
    }

    #[test]
    fn decodes_a_minimal_envelope() {
        let miner_data = json!({"account": "miner", "predicate": "keys-all", "public-keys": []});
        let coinbase = json!({"result": {"status": "success", "data": "0.0"}});
        let cmd = json!({"code": "(+ 1 2)", "data": {}});
        let result = json!({"result": {"status": "success", "data": 3}});

        let envelope = BlockEnvelope {
            header: RawHeader {
                hash: "H1".into(),
                chain_id: 0,
                height: 10,
                parent_hash: "H0".into(),
                creation_time: "1000".into(),
                epoch_start: "900".into(),
                feature_flags: 1 << 63,
                weight: "w".into(),
                target: "t".into(),
                nonce: "n".into(),
                payload_hash: "PH".into(),
                adjacents: HashMap::new(),
            },
            payload_with_outputs: RawPayloadWithOutputs {
                miner_data: b64(&miner_data),
                coinbase: b64(&coinbase),
                transactions: vec![(b64(&cmd), b64(&result))],
                transactions_hash: "TH".into(),
                outputs_hash: "OH".into(),
            },
        };

        let decoded = envelope.decode().unwrap();
        assert_eq!(decoded.hash, "H1");
        assert_eq!(decoded.creation_time, 1000);
        assert_eq!(decoded.epoch_start, 900);
        assert!(decoded.feature_flags < 0);
        assert_eq!(decoded.miner_data, miner_data);
        assert_eq!(decoded.transactions.len(), 1);
        assert_eq!(decoded.transactions[0].cmd, cmd);
    }
}
