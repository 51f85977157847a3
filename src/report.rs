//! Result records
//!
//! Every invocation writes exactly one structured record to stdout, shaped
//! `{"success": bool, ...}`; progress notices use `{"status":"info", ...}`.
//! Logs never go to stdout, so the calling agent can parse it blindly.

use serde_json::{json, Value};

use crate::common::Error;

/// Emit the final record for this invocation
pub fn emit(record: &Value) {
    println!("{}", record);
}

/// Emit a progress notice (its own line, before the final record)
pub fn info(message: &str) {
    println!("{}", json!({ "status": "info", "message": message }));
}

/// Success record with operation-specific fields merged in
pub fn ok(fields: Value) -> Value {
    let mut record = json!({ "success": true });
    merge(&mut record, fields);
    record
}

/// Failure record carrying the error and a remediation hint where one exists
pub fn failure(error: &Error) -> Value {
    let mut record = json!({
        "success": false,
        "error": error.to_string(),
    });
    if let Some(hint) = error.hint() {
        record["hint"] = json!(hint);
    }
    record
}

fn merge(record: &mut Value, fields: Value) {
    if let (Some(base), Some(extra)) = (record.as_object_mut(), fields.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_merges_fields() {
        let record = ok(json!({ "url": "https://app.example" }));
        assert_eq!(record["success"], json!(true));
        assert_eq!(record["url"], json!("https://app.example"));
    }

    #[test]
    fn failure_carries_hint() {
        let record = failure(&Error::SessionNotActive);
        assert_eq!(record["success"], json!(false));
        assert!(record["error"].as_str().unwrap().contains("No active browser session"));
        assert!(record["hint"].as_str().is_some());
    }
}
