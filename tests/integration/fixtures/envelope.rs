use serde_json::{Value, json};

/// Inbound envelope bytes for room `t1/d1`.
pub fn request(kind: &str, user: &str, request_id: &str, payload: Value) -> Vec<u8> {
    request_in("t1", "d1", kind, user, request_id, payload)
}

pub fn request_in(
    tenant: &str,
    doc: &str,
    kind: &str,
    user: &str,
    request_id: &str,
    payload: Value,
) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "type": kind,
        "version": 1,
        "tenant": tenant,
        "doc_id": doc,
        "user_id": user,
        "request_id": request_id,
        "payload": payload,
    }))
    .expect("encode envelope")
}

pub fn set_op(path: &str, value: Value, ts: u64) -> Value {
    json!({"path": path, "type": "set", "value": value, "ts": ts})
}

pub fn note_op(text: &str, ts: u64) -> Value {
    json!({"type": "append_note", "value": text, "ts": ts})
}

pub fn submit(base_version: u64, ops: Vec<Value>) -> Value {
    json!({"baseVersion": base_version, "ops": ops})
}
