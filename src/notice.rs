//! Purpose: Define a structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`.
//! Role: Shared contract helper for CLI diagnostics (skipped products, fallbacks).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is additive-only once published.
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub collection: String,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn notice_json(notice: &Notice) -> Value {
    json!({
        "notice": {
            "kind": notice.kind,
            "time": notice.time,
            "cmd": notice.cmd,
            "collection": notice.collection,
            "message": notice.message,
            "details": Value::Object(notice.details.clone()),
        }
    })
}
