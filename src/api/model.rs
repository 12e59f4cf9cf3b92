use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::scalar_to_string;
use crate::error::ApiError;

/// One message in a room's chat feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawChatMessage")]
pub struct ChatMessage {
    pub sender_id: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Wire shape: the sender arrives as `sender`, `ui_id` or `sender_id`, as a
/// string or a number; the timestamp as RFC 3339 text or epoch millis.
#[derive(Deserialize)]
struct RawChatMessage {
    #[serde(default)]
    sender: Option<Value>,
    #[serde(default)]
    ui_id: Option<Value>,
    #[serde(default)]
    sender_id: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<Value>,
}

impl From<RawChatMessage> for ChatMessage {
    fn from(raw: RawChatMessage) -> Self {
        let sender_id = [raw.sender, raw.ui_id, raw.sender_id]
            .iter()
            .flatten()
            .find_map(scalar_to_string)
            .unwrap_or_default();
        let timestamp = raw
            .timestamp
            .as_ref()
            .or(raw.created_at.as_ref())
            .and_then(parse_timestamp);
        Self {
            sender_id,
            message: raw.message.unwrap_or_default(),
            timestamp,
        }
    }
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ChatFeed {
    Wrapped { chat: Vec<ChatMessage> },
    Bare(Vec<ChatMessage>),
}

impl ChatFeed {
    pub(crate) fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            ChatFeed::Wrapped { chat } => chat,
            ChatFeed::Bare(v) => v,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SendChatRequest<'a> {
    pub ui_id: &'a str,
    pub message: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Result of the opaque login POST.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(alias = "admin", alias = "profile")]
    pub user: Value,
}

/// Pull the record array out of a list response: a bare array, or an object
/// holding it under `list_key`, `items` or `data`.
pub fn extract_items(body: Value, list_key: Option<&str>) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in list_key.into_iter().chain(["items", "data"]) {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(ApiError::Shape(format!(
                "no record array among keys [{}]",
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            )))
        }
        Value::Null => Ok(Vec::new()),
        other => Err(ApiError::Shape(format!("expected array or object, got {other}"))),
    }
}

/// Remote search responses: a record, a wrapped record, or a (possibly empty) list.
pub fn extract_search_hit(body: Value, list_key: Option<&str>, id_field: &str) -> Vec<Value> {
    match body {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if [id_field, "_id", "id"].iter().any(|k| map.contains_key(*k)) {
                return vec![Value::Object(map)];
            }
            for key in list_key.into_iter().chain(["items", "data", "result", "user", "room"]) {
                match map.remove(key) {
                    Some(Value::Array(items)) => return items,
                    Some(obj @ Value::Object(_)) => return vec![obj],
                    _ => {}
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Human-readable confirmation from a mutation response, if the server sent one.
pub fn response_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_message_accepts_sender_variants() {
        let m: ChatMessage =
            serde_json::from_value(json!({"sender": "42", "message": "hi"})).unwrap();
        assert_eq!(m.sender_id, "42");
        assert_eq!(m.message, "hi");
        assert!(m.timestamp.is_none());

        let m: ChatMessage = serde_json::from_value(
            json!({"ui_id": 7, "message": "yo", "timestamp": "2024-05-01T10:00:00Z"}),
        )
        .unwrap();
        assert_eq!(m.sender_id, "7");
        assert_eq!(m.timestamp.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");

        let m: ChatMessage =
            serde_json::from_value(json!({"sender_id": "x", "message": "m", "createdAt": 0}))
                .unwrap();
        assert_eq!(m.timestamp.unwrap().timestamp(), 0);
    }

    #[test]
    fn chat_feed_wrapped_or_bare() {
        let feed: ChatFeed =
            serde_json::from_value(json!({"chat": [{"sender": "1", "message": "a"}]})).unwrap();
        assert_eq!(feed.into_messages().len(), 1);
        let feed: ChatFeed = serde_json::from_value(json!([])).unwrap();
        assert!(feed.into_messages().is_empty());
    }

    #[test]
    fn extract_items_shapes() {
        let items = extract_items(json!([{"id": 1}]), None).unwrap();
        assert_eq!(items.len(), 1);
        let items = extract_items(json!({"items": [{"id": 1}, {"id": 2}]}), None).unwrap();
        assert_eq!(items.len(), 2);
        let items = extract_items(json!({"users": [{"id": 1}], "total": 1}), Some("users")).unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(
            extract_items(json!({"total": 0}), Some("users")),
            Err(ApiError::Shape(_))
        ));
    }

    #[test]
    fn search_hit_shapes() {
        assert_eq!(extract_search_hit(json!({"_id": "u1"}), None, "_id").len(), 1);
        assert_eq!(
            extract_search_hit(json!({"user": {"_id": "u1"}}), Some("users"), "_id").len(),
            1
        );
        assert!(extract_search_hit(json!({"user": null}), None, "_id").is_empty());
        assert!(extract_search_hit(json!([]), None, "_id").is_empty());
    }
}
