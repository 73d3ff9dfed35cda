//! Wire types for the record store's REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record returned by the store, decoupled from the wire envelope.
#[derive(Debug, Clone)]
pub struct Record {
    /// Opaque handle used for get/patch operations.
    pub record_key: String,
    /// Modification counter, when the store supplies one.
    pub mod_key: Option<String>,
    /// Flat field bag.
    pub fields: Map<String, Value>,
}

/// Body of a `_find` request. Multiple query entries form a logical OR.
/// The store rejects offsets that are not strictly positive; the first page
/// omits the field entirely.
#[derive(Debug, Clone, Serialize)]
pub struct FindRequest {
    pub query: Vec<Map<String, Value>>,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl FindRequest {
    /// A single-predicate query (`field == value`).
    pub fn by_field(field: &str, value: &str, limit: u64) -> Self {
        let mut predicate = Map::new();
        predicate.insert(field.to_string(), Value::String(value.to_string()));
        Self {
            query: vec![predicate],
            limit,
            offset: None,
        }
    }

    /// A multi-predicate OR query over one field.
    pub fn by_field_or<'a>(field: &str, values: impl IntoIterator<Item = &'a str>, limit: u64) -> Self {
        let query = values
            .into_iter()
            .map(|value| {
                let mut predicate = Map::new();
                predicate.insert(field.to_string(), Value::String(value.to_string()));
                predicate
            })
            .collect();
        Self {
            query,
            limit,
            offset: None,
        }
    }
}

/// Body of a record patch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub field_data: Map<String, Value>,
}

/// Outer envelope of every store response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub response: T,
}

/// Record list payload of find and get responses.
#[derive(Debug, Deserialize)]
pub struct RecordData {
    #[serde(default)]
    pub data: Vec<WireRecord>,
}

/// A record as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    pub field_data: Map<String, Value>,
    pub record_id: String,
    #[serde(default)]
    pub mod_id: Option<String>,
}

impl From<WireRecord> for Record {
    fn from(wire: WireRecord) -> Self {
        Record {
            record_key: wire.record_id,
            mod_key: wire.mod_id,
            fields: wire.field_data,
        }
    }
}

/// Session-creation payload.
#[derive(Debug, Deserialize)]
pub struct SessionData {
    pub token: String,
}

/// Auxiliary script payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptData {
    #[serde(default)]
    pub script_result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_page_omits_offset() {
        let req = FindRequest::by_field("AutoLog_Status", "0 - Pending File Info", 500);
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("offset").is_none());
        assert_eq!(body["limit"], json!(500));
        assert_eq!(body["query"][0]["AutoLog_Status"], json!("0 - Pending File Info"));
    }

    #[test]
    fn or_query_builds_one_predicate_per_value() {
        let req = FindRequest::by_field_or("INFO_FTG_ID", ["AF0001", "AF0002"], 12);
        assert_eq!(req.query.len(), 2);
        assert_eq!(req.query[1]["INFO_FTG_ID"], json!("AF0002"));
    }

    #[test]
    fn wire_record_deserializes() {
        let wire: WireRecord = serde_json::from_value(json!({
            "fieldData": {"INFO_FTG_ID": "AF0001"},
            "recordId": "42",
            "modId": "3"
        }))
        .unwrap();
        let record = Record::from(wire);
        assert_eq!(record.record_key, "42");
        assert_eq!(record.mod_key.as_deref(), Some("3"));
        assert_eq!(record.fields["INFO_FTG_ID"], json!("AF0001"));
    }
}
