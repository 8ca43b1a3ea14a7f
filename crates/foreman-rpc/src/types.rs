//! Wire-format request and response envelopes.
//!
//! A request is `{method, params}`, optionally carrying an `id` echoed by
//! transports. A response is `{success: true, ...result fields}` or
//! `{success: false, error: "<KIND>: <detail>"}` — result fields merge
//! into the top-level object.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::RpcError;

/// Incoming tool-call request.
#[derive(Clone, Debug, Deserialize)]
pub struct RpcRequest {
    /// Optional request identifier, echoed back by transports.
    #[serde(default)]
    pub id: Option<Value>,
    /// Tool name, e.g. `reserve_task`.
    pub method: String,
    /// Parameters object.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Build a success response: `success: true` merged over the payload.
pub fn success_response(payload: Value) -> Value {
    let mut object = match payload {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            let _ = map.insert("result".to_string(), other);
            map
        }
    };
    let _ = object.insert("success".to_string(), Value::Bool(true));
    Value::Object(object)
}

/// Build a failure response from an error.
pub fn error_response(error: &RpcError) -> Value {
    json!({ "success": false, "error": error.to_wire() })
}

/// Attach a transport-level id to a response.
pub fn with_id(mut response: Value, id: Option<Value>) -> Value {
    if let (Some(id), Some(object)) = (id, response.as_object_mut()) {
        let _ = object.insert("id".to_string(), id);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_minimal_form() {
        let request: RpcRequest = serde_json::from_str(r#"{"method": "list_tags"}"#).unwrap();
        assert_eq!(request.method, "list_tags");
        assert!(request.id.is_none());
        assert!(request.params.is_none());
    }

    #[test]
    fn request_parses_full_form() {
        let raw = r#"{"id": "req-1", "method": "reserve_task", "params": {"task_id": 7, "agent_id": "a1"}}"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.id, Some(json!("req-1")));
        assert_eq!(request.params.unwrap()["task_id"], 7);
    }

    #[test]
    fn success_merges_payload_fields() {
        let response = success_response(json!({ "task_id": 3, "reserved": true }));
        assert_eq!(response["success"], true);
        assert_eq!(response["task_id"], 3);
        assert_eq!(response["reserved"], true);
    }

    #[test]
    fn success_wraps_non_object_payload() {
        let response = success_response(json!([1, 2, 3]));
        assert_eq!(response["success"], true);
        assert_eq!(response["result"], json!([1, 2, 3]));
    }

    #[test]
    fn error_is_kind_prefixed_string() {
        let response = error_response(&RpcError::invalid_params("bad limit"));
        assert_eq!(response["success"], false);
        assert_eq!(response["error"], "INVALID_PARAMS: bad limit");
    }

    #[test]
    fn id_is_echoed() {
        let response = with_id(success_response(json!({})), Some(json!(42)));
        assert_eq!(response["id"], 42);
        let response = with_id(success_response(json!({})), None);
        assert!(response.get("id").is_none());
    }
}
