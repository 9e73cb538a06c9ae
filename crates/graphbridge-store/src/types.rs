//! Content store data model.
//!
//! The store hands out analysis payloads in several loose shapes: an object or
//! a JSON-encoded string, under `analysis_payload` or `processed_json`, with
//! the entries either at the top level or under an `analysis` key, as one
//! entry or a list. All of that is normalized here, once, so the rest of the
//! bridge only ever sees `Vec<AnalysisEntry>`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Summary used when an entry carries none.
pub const DEFAULT_SUMMARY: &str = "No summary";

/// Opaque content item identifier.
///
/// Rendered back to the store exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    /// Integer id.
    Number(i64),
    /// String id.
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::Text(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId::Text(s)
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        ItemId::Number(n)
    }
}

/// A relationship between an entry's subject and some target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Related entity; `None` when absent or empty.
    pub target: Option<String>,
    /// Relationship type (`"type"` on the wire); `None` when absent or empty.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Free-text context, empty when absent.
    pub description: String,
}

impl Relationship {
    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            target: text_field(map, "target").filter(|s| !s.is_empty()),
            kind: text_field(map, "type").filter(|s| !s.is_empty()),
            description: text_field(map, "description").unwrap_or_default(),
        })
    }
}

/// One analysis entry of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    /// Headline of the signal.
    pub summary: String,
    /// Supporting detail, empty when absent.
    pub detail: String,
    /// Relationships, in payload order.
    pub relationships: Vec<Relationship>,
}

impl AnalysisEntry {
    /// Read an entry leniently; non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let relationships = map
            .get("relationships")
            .and_then(Value::as_array)
            .map(|rels| rels.iter().filter_map(Relationship::from_value).collect())
            .unwrap_or_default();

        Some(Self {
            summary: text_field(map, "summary").unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            detail: text_field(map, "detail").unwrap_or_default(),
            relationships,
        })
    }
}

/// Scalars are accepted as text; objects, arrays and null are not.
fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Keys that make a bare object read as an analysis entry.
const ENTRY_KEYS: [&str; 3] = ["summary", "detail", "relationships"];

/// Raw field an item's analysis was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    /// `analysis_payload`: the entries themselves, or a document wrapping them.
    AnalysisPayload,
    /// `processed_json`: a processing document; entries live under `analysis`.
    ProcessedJson,
}

/// Normalize an `analysis_payload` value into a sequence of entries.
///
/// Fails only when the payload is a string that is not valid JSON.
pub fn normalize_payload(payload: Value) -> Result<Vec<AnalysisEntry>, String> {
    normalize(payload, PayloadField::AnalysisPayload)
}

/// Normalize a payload read from `field`.
///
/// An object without an `analysis` key is a single entry only when it came
/// from `analysis_payload` and carries at least one entry field. Anything
/// else without `analysis` (`{}`, a `processed_json` document) has no entries.
pub fn normalize(payload: Value, field: PayloadField) -> Result<Vec<AnalysisEntry>, String> {
    let document = match payload {
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| format!("analysis payload is not valid JSON: {}", e))?,
        other => other,
    };

    let analysis = match document {
        Value::Object(mut map) => match map.remove("analysis") {
            Some(analysis) => analysis,
            None if field == PayloadField::AnalysisPayload
                && ENTRY_KEYS.iter().any(|k| map.contains_key(*k)) =>
            {
                Value::Object(map)
            }
            None => Value::Null,
        },
        other => other,
    };

    let raw_entries = match analysis {
        Value::Array(entries) => entries,
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        single => vec![single],
    };

    let entries: Vec<AnalysisEntry> = raw_entries
        .iter()
        .filter_map(AnalysisEntry::from_value)
        .collect();
    if entries.len() < raw_entries.len() {
        tracing::debug!(
            dropped = raw_entries.len() - entries.len(),
            "dropped non-object analysis entries"
        );
    }
    Ok(entries)
}

/// A content item ready for fact extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Store identifier.
    pub id: ItemId,
    /// Normalized analysis entries.
    pub analysis: Vec<AnalysisEntry>,
}

/// An item the store returned whose payload could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    /// Store identifier.
    pub id: ItemId,
    /// Why the payload was unusable.
    pub reason: String,
}

/// Everything one fetch returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    /// Items with readable payloads, in store order.
    pub items: Vec<ContentItem>,
    /// Items whose payload could not be decoded.
    pub rejected: Vec<RejectedItem>,
}

impl SyncBatch {
    /// Build a batch from the raw `items` array of a sync response.
    ///
    /// Entries without a usable `id` cannot be acknowledged and are skipped.
    pub fn from_raw_items(raw: Vec<Value>) -> Self {
        let mut batch = SyncBatch::default();

        for value in raw {
            let Value::Object(mut map) = value else {
                tracing::warn!("skipping sync item that is not an object");
                continue;
            };
            let id = match map.remove("id").map(serde_json::from_value::<ItemId>) {
                Some(Ok(id)) => id,
                _ => {
                    tracing::warn!("skipping sync item without a usable id");
                    continue;
                }
            };
            let normalized = match map.remove("analysis_payload") {
                Some(payload) => normalize(payload, PayloadField::AnalysisPayload),
                None => match map.remove("processed_json") {
                    Some(payload) => normalize(payload, PayloadField::ProcessedJson),
                    None => Ok(Vec::new()),
                },
            };

            match normalized {
                Ok(analysis) => batch.items.push(ContentItem { id, analysis }),
                Err(reason) => {
                    tracing::warn!(item_id = %id, reason = %reason, "rejecting sync item");
                    batch.rejected.push(RejectedItem { id, reason });
                }
            }
        }

        batch
    }

    /// Total number of items the store returned (usable or not).
    pub fn len(&self) -> usize {
        self.items.len() + self.rejected.len()
    }

    /// Whether the store returned nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body of `GET /knowledge/sync`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    /// Raw items; decoded individually so one bad item cannot sink the batch.
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Body of `POST /knowledge/mark-synced`.
#[derive(Debug, Clone, Serialize)]
pub struct MarkSyncedRequest<'a> {
    /// Ids to flag as synced.
    pub ids: &'a [ItemId],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_id_round_trips_as_received() {
        let ids: Vec<ItemId> = serde_json::from_value(json!(["A", 42])).unwrap();
        assert_eq!(ids, vec![ItemId::from("A"), ItemId::from(42)]);
        assert_eq!(serde_json::to_value(&ids).unwrap(), json!(["A", 42]));
        assert_eq!(ids[1].to_string(), "42");
    }

    #[test]
    fn test_single_entry_is_wrapped() {
        let entries = normalize_payload(json!({
            "summary": "Fed holds rates",
            "detail": "no cuts 2026",
            "relationships": [{"target": "USD", "type": "bullish_for", "description": "rate stability"}]
        }))
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "Fed holds rates");
        assert_eq!(entries[0].relationships[0].kind.as_deref(), Some("bullish_for"));
    }

    #[test]
    fn test_list_of_entries_keeps_order() {
        let entries = normalize_payload(json!([
            {"summary": "first"},
            {"summary": "second"}
        ]))
        .unwrap();
        let summaries: Vec<_> = entries.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["first", "second"]);
    }

    #[test]
    fn test_string_payload_with_analysis_key() {
        let raw = json!({"analysis": [{"summary": "CPI beat", "detail": "3.1%"}], "model": "x"})
            .to_string();
        let entries = normalize_payload(Value::String(raw)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].detail, "3.1%");
    }

    #[test]
    fn test_invalid_json_string_is_an_error() {
        let err = normalize_payload(Value::String("{not json".to_string())).unwrap_err();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn test_empty_shapes_yield_no_entries() {
        assert!(normalize_payload(Value::Null).unwrap().is_empty());
        assert!(normalize_payload(json!([])).unwrap().is_empty());
        assert!(normalize_payload(json!({"analysis": null})).unwrap().is_empty());
        assert!(normalize_payload(json!({"analysis": []})).unwrap().is_empty());
        assert!(normalize_payload(json!({})).unwrap().is_empty());
        assert!(normalize_payload(json!({"analysis": {}})).unwrap().is_empty());
    }

    #[test]
    fn test_document_without_analysis_has_no_entries() {
        let wrapper = Value::String(json!({"model": "gemini"}).to_string());
        assert!(normalize_payload(wrapper.clone()).unwrap().is_empty());
        assert!(normalize(wrapper, PayloadField::ProcessedJson).unwrap().is_empty());

        // A processing document never reads as an entry, even with entry-like keys.
        let processed = json!({"summary": "stale", "model": "gemini"});
        assert!(normalize(processed.clone(), PayloadField::ProcessedJson).unwrap().is_empty());
        assert_eq!(normalize_payload(processed).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_items_without_analysis_are_empty() {
        let batch = SyncBatch::from_raw_items(vec![
            json!({"id": "blank", "analysis_payload": {}}),
            json!({"id": "meta", "processed_json": "{\"model\": \"gemini\"}"}),
        ]);
        assert_eq!(batch.items.len(), 2);
        assert!(batch.items.iter().all(|i| i.analysis.is_empty()));
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn test_lenient_entry_defaults() {
        let entries = normalize_payload(json!([
            {"detail": 7, "relationships": "not a list"},
            "just a string",
            {"summary": "x", "relationships": [
                {"target": "", "type": "t"},
                {"target": "T"},
                42,
                {"target": "T", "type": "supports"}
            ]}
        ]))
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].summary, DEFAULT_SUMMARY);
        assert_eq!(entries[0].detail, "7");
        assert!(entries[0].relationships.is_empty());

        let rels = &entries[1].relationships;
        assert_eq!(rels.len(), 3);
        assert_eq!(rels[0].target, None);
        assert_eq!(rels[1].kind, None);
        assert_eq!(rels[2].description, "");
    }

    #[test]
    fn test_batch_from_raw_items() {
        let batch = SyncBatch::from_raw_items(vec![
            json!({"id": "A", "analysis_payload": {"summary": "a"}}),
            json!({"id": 7, "processed_json": "{\"analysis\": {\"summary\": \"b\"}}"}),
            json!({"id": "broken", "processed_json": "{oops"}),
            json!({"analysis_payload": {"summary": "no id"}}),
            json!("not an object"),
            json!({"id": "empty"}),
        ]);

        let ids: Vec<String> = batch.items.iter().map(|i| i.id.to_string()).collect();
        assert_eq!(ids, vec!["A", "7", "empty"]);
        assert_eq!(batch.items[1].analysis[0].summary, "b");
        assert!(batch.items[2].analysis.is_empty());

        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].id, ItemId::from("broken"));
        assert_eq!(batch.len(), 4);
    }
}
