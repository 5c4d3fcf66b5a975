//! Wire protocol for the script endpoint.
//!
//! Reads come back as script text invoking the issued callback with a
//! JSON array of positional rows; writes are JSON bodies with a required
//! `action` field. Row decoding is tolerant: malformed cells degrade to
//! defaults instead of failing the whole load.

use crate::model::{QuantityUpdate, StockRecord};
use crate::store::{StoreError, StoreResult};
use regex::Regex;
use serde_json::{json, Value};

/// Extracts the JSON payload from a callback-invocation body.
///
/// Accepts optional surrounding whitespace and a trailing `;`. A body
/// invoking any other callback name is rejected.
pub fn extract_payload(callback: &str, body: &str) -> StoreResult<String> {
    let pattern = format!(r"(?s)^\s*{}\((.*)\)\s*;?\s*$", regex::escape(callback));
    let wrapper = Regex::new(&pattern)
        .map_err(|err| StoreError::MalformedPayload(format!("bad wrapper pattern: {err}")))?;

    match wrapper.captures(body) {
        Some(captures) => Ok(captures[1].to_string()),
        None => Err(StoreError::CallbackMismatch {
            expected: callback.to_string(),
        }),
    }
}

/// Decodes the payload into records, defaulting malformed cells.
pub fn decode_rows(payload: &str) -> StoreResult<Vec<StockRecord>> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| StoreError::MalformedPayload(err.to_string()))?;
    let rows = value
        .as_array()
        .ok_or_else(|| StoreError::MalformedPayload("expected a row array".to_string()))?;

    Ok(rows.iter().map(StockRecord::from_row).collect())
}

pub fn add_payload(record: &StockRecord) -> Value {
    json!({
        "action": "add",
        "name": record.name,
        "day": record.day,
        "month": record.month,
        "year": record.year,
        "quantity": record.quantity,
    })
}

pub fn update_payload(update: &QuantityUpdate) -> Value {
    json!({
        "action": "update",
        "name": update.name,
        "quantity": update.quantity,
        "day": update.day,
        "month": update.month,
        "year": update.year,
    })
}
