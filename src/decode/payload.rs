// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dynamic payload shape (§9): a Pact command's payload is one of two
//! variants, distinguished only by the presence of a `code` field — there is
//! no explicit tag on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    Execution {
        code: String,
        data: Value,
    },
    Continuation {
        pact_id: String,
        step: i64,
        rollback: bool,
        proof: Option<String>,
        data: Value,
    },
}

impl Payload {
    /// `"execution"` or `"continuation"`, for tagging logs/spans (§10.2).
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Execution { .. } => "execution",
            Payload::Continuation { .. } => "continuation",
        }
    }

    /// Decide the variant by the presence of `code`, per §9.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| IndexerError::Schema("command payload is not a JSON object".into()))?;

        if let Some(code) = obj.get("code") {
            let code = code
                .as_str()
                .ok_or_else(|| IndexerError::Schema("payload.code is not a string".into()))?
                .to_string();
            let data = obj.get("data").cloned().unwrap_or(Value::Null);
            Ok(Payload::Execution { code, data })
        } else {
            let pact_id = obj
                .get("pactId")
                .and_then(Value::as_str)
                .ok_or_else(|| IndexerError::Schema("continuation missing pactId".into()))?
                .to_string();
            let step = obj
                .get("step")
                .and_then(Value::as_i64)
                .ok_or_else(|| IndexerError::Schema("continuation missing step".into()))?;
            let rollback = obj
                .get("rollback")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let proof = obj.get("proof").and_then(Value::as_str).map(String::from);
            let data = obj.get("data").cloned().unwrap_or(Value::Null);
            Ok(Payload::Continuation {
                pact_id,
                step,
                rollback,
                proof,
                data,
            })
        }
    }
}

/// Standard padded base64, decoded to bytes that are valid UTF-8 JSON (§6).
pub fn decode_base64_json(encoded: &str) -> Result<Value> {
    let bytes = base64::decode(encoded)
        .map_err(|e| IndexerError::Schema(format!("invalid base64: {e}")))?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| IndexerError::Schema(format!("base64 payload is not UTF-8: {e}")))?;
    serde_json::from_str(text).map_err(IndexerError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_variant_decided_by_code_field() {
        let v = json!({"code": "(+ 1 2)", "data": {}});
        let payload = Payload::from_value(&v).unwrap();
        assert_eq!(
            payload,
            Payload::Execution {
                code: "(+ 1 2)".into(),
                data: json!({})
            }
        );
        assert_eq!(payload.kind(), "execution");
    }

    #[test]
    fn continuation_variant_without_code_field() {
        let v = json!({"pactId": "abc", "step": 1, "rollback": false, "proof": null, "data": {}});
        let payload = Payload::from_value(&v).unwrap();
        assert_eq!(
            payload,
            Payload::Continuation {
                pact_id: "abc".into(),
                step: 1,
                rollback: false,
                proof: None,
                data: json!({})
            }
        );
        assert_eq!(payload.kind(), "continuation");
    }

    #[test]
    fn base64_round_trips_through_json() {
        let original = json!({"a": 1, "b": "two"});
        let encoded = base64::encode(serde_json::to_string(&original).unwrap());
        assert_eq!(decode_base64_json(&encoded).unwrap(), original);
    }
}
