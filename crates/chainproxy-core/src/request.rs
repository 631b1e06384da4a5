//! JSON-RPC 2.0 wire types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC "internal error" code, used for the exhaustion envelope.
pub const INTERNAL_ERROR: i64 = -32603;

/// Message returned to callers when every endpoint failed.
pub const UNAVAILABLE_MESSAGE: &str = "All RPC nodes temporarily unavailable. Please retry.";

/// Method name used when the body carries none (batches, malformed input).
pub const UNKNOWN_METHOD: &str = "unknown";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub id: Value,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: Value::from(id),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The envelope returned when a call could not be served by any endpoint.
    ///
    /// Echoes the caller's `id`, or `null` when the request had none.
    pub fn unavailable(id: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code: INTERNAL_ERROR,
                message: UNAVAILABLE_MESSAGE.into(),
                data: None,
            }),
        }
    }

    /// The `result` value, or the endpoint's error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// One inbound proxy call.
///
/// The raw body is forwarded byte-for-byte; `method` and `id` are read
/// leniently so routing and error envelopes work without validating the
/// payload.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub body: Bytes,
    pub method: String,
    pub id: Option<Value>,
}

impl RpcCall {
    /// Wrap an inbound body. `method` and `id` are read independently, so
    /// a malformed `method` does not cost the caller its `id`.
    pub fn from_body(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let header = serde_json::from_slice::<Value>(&body).ok();
        let header = header.as_ref().and_then(Value::as_object);
        let method = header
            .and_then(|h| h.get("method"))
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_METHOD)
            .to_string();
        let id = header.and_then(|h| h.get("id")).cloned();
        Self { body, method, id }
    }

    pub fn from_request(req: &JsonRpcRequest) -> Result<Self, serde_json::Error> {
        Ok(Self {
            body: Bytes::from(serde_json::to_vec(req)?),
            method: req.method.clone(),
            id: Some(req.id.clone()),
        })
    }
}

/// A successful endpoint reply.
///
/// `body` holds the bytes exactly as the endpoint sent them and is what
/// gets returned to the caller. `value` is a parsed copy for inspection;
/// it may lose precision on very large numbers.
#[derive(Debug, Clone)]
pub struct RpcReply {
    pub body: Bytes,
    pub value: Value,
}

impl RpcReply {
    /// Accept `body` only if it is valid JSON.
    pub fn parse(body: Bytes) -> Result<Self, serde_json::Error> {
        let value = serde_json::from_slice(&body)?;
        Ok(Self { body, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(1, "eth_blockNumber", vec![]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"eth_blockNumber\""));
    }

    #[test]
    fn call_reads_method_and_id_and_keeps_body() {
        let raw = br#"{"jsonrpc":"2.0","method":"eth_call","params":[{"to":"0x1"},"latest"],"id":"abc"}"#;
        let call = RpcCall::from_body(raw.to_vec());
        assert_eq!(call.method, "eth_call");
        assert_eq!(call.id, Some(json!("abc")));
        assert_eq!(&call.body[..], &raw[..]);
    }

    #[test]
    fn batch_or_garbage_is_unknown_method() {
        let batch = RpcCall::from_body(r#"[{"method":"eth_call","id":1}]"#);
        assert_eq!(batch.method, UNKNOWN_METHOD);
        assert_eq!(batch.id, None);

        let garbage = RpcCall::from_body("not json");
        assert_eq!(garbage.method, UNKNOWN_METHOD);
    }

    #[test]
    fn bad_method_keeps_id() {
        let call = RpcCall::from_body(r#"{"jsonrpc":"2.0","method":5,"id":3}"#);
        assert_eq!(call.method, UNKNOWN_METHOD);
        assert_eq!(call.id, Some(json!(3)));

        let falsy = RpcCall::from_body(r#"{"method":"eth_call","id":0}"#);
        assert_eq!(falsy.id, Some(json!(0)));
    }

    #[test]
    fn reply_rejects_non_json() {
        assert!(RpcReply::parse(Bytes::from_static(b"<html>")).is_err());
        let reply = RpcReply::parse(Bytes::from_static(br#"{"id":1,"result":"0x1"}"#)).unwrap();
        assert_eq!(reply.value["result"], "0x1");
    }

    #[test]
    fn unavailable_envelope_shape() {
        let resp = JsonRpcResponse::unavailable(Some(json!(7)));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            v,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "error": { "code": -32603, "message": UNAVAILABLE_MESSAGE }
            })
        );
        let anon = serde_json::to_value(JsonRpcResponse::unavailable(None)).unwrap();
        assert_eq!(anon["id"], Value::Null);
    }

    #[test]
    fn response_into_result_error() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: json!(1),
            result: None,
            error: Some(JsonRpcError {
                code: -32000,
                message: "execution reverted".into(),
                data: None,
            }),
        };
        assert_eq!(resp.into_result().unwrap_err().code, -32000);
    }
}
