use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{MAX_TEXT_LEN, PROVISIONAL_PREFIX};
use crate::error::CoreError;

/// Exactly one of text or attachment is populated per message,
/// mirroring the sender's choice at composition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Attachment { url: String, name: String },
}

impl MessageBody {
    /// Classify raw composer input. A bare http(s) URL becomes an
    /// attachment reference; anything else is text, capped at
    /// `MAX_TEXT_LEN` characters.
    pub fn from_input(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::validation("message is empty"));
        }
        if looks_like_url(trimmed) {
            return Ok(Self::Attachment {
                url: trimmed.to_string(),
                name: file_name_from_url(trimmed),
            });
        }
        if trimmed.chars().count() > MAX_TEXT_LEN {
            return Err(CoreError::Validation(format!(
                "message too long, limit is {MAX_TEXT_LEN} characters"
            )));
        }
        Ok(Self::Text(trimmed.to_string()))
    }

    /// Short human-readable form, used for reply previews and logs.
    pub fn preview(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Attachment { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: MessageBody,
    /// Referenced message may no longer exist; rendering degrades.
    pub reply_to: Option<String>,
    /// Milliseconds since epoch. Assigned once by whichever party first
    /// created the durable record; replaced only on promotion.
    pub timestamp: u64,
}

impl Message {
    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_PREFIX)
    }

    /// Map a wire record into the canonical shape. Records with an empty
    /// `from_user` or `to_target` are malformed and yield `None`.
    pub fn from_record(record: &MessageRecord) -> Option<Self> {
        if record.from_user.is_empty() || record.to_target.is_empty() {
            return None;
        }

        let body = if let Some(url) = record.file_url.clone() {
            let name = record
                .file_name
                .clone()
                .unwrap_or_else(|| file_name_from_url(&url));
            MessageBody::Attachment { url, name }
        } else if let Some(text) = record.text.clone() {
            MessageBody::Text(text)
        } else {
            return None;
        };

        Some(Self {
            id: record.id.clone(),
            from: record.from_user.clone(),
            to: record.to_target.clone(),
            body,
            reply_to: record.reply_to.clone(),
            timestamp: record.timestamp,
        })
    }
}

static PROVISIONAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Locally assigned id for a message the server has not confirmed yet.
/// Millisecond timestamp plus a session counter keeps ids unique and
/// roughly ordered.
pub fn next_provisional_id(now_ms: u64) -> String {
    let seq = PROVISIONAL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{PROVISIONAL_PREFIX}{now_ms}-{seq}")
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn looks_like_url(text: &str) -> bool {
    (text.starts_with("http://") || text.starts_with("https://"))
        && !text.contains(char::is_whitespace)
}

/// Last path segment with any query/fragment stripped.
fn file_name_from_url(url: &str) -> String {
    let tail = url.rsplit('/').next().unwrap_or(url);
    let name = tail.split(['?', '#']).next().unwrap_or(tail);
    if name.is_empty() {
        "file".to_string()
    } else {
        name.to_string()
    }
}

// ===== Wire types =====

/// One row of `GET /messages?target=...`. The server hands ids out as
/// numbers but the client treats them as opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub from_user: String,
    pub to_target: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub timestamp: u64,
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageRequest {
    pub from_user: String,
    pub to_target: String,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub reply_to: Option<String>,
    pub timestamp: u64,
}

impl CreateMessageRequest {
    pub fn from_message(message: &Message) -> Self {
        let (text, file_url, file_name) = match &message.body {
            MessageBody::Text(text) => (Some(text.clone()), None, None),
            MessageBody::Attachment { url, name } => {
                (None, Some(url.clone()), Some(name.clone()))
            }
        };
        Self {
            from_user: message.from.clone(),
            to_target: message.to.clone(),
            text,
            file_url,
            file_name,
            reply_to: message.reply_to.clone(),
            timestamp: message.timestamp,
        }
    }

    /// Build the authoritative record from the server's acknowledgement,
    /// so send confirmations ride the same ingest path as poll results.
    pub fn into_record(self, response: CreateMessageResponse) -> MessageRecord {
        MessageRecord {
            id: response.id,
            from_user: self.from_user,
            to_target: self.to_target,
            text: self.text,
            file_url: self.file_url,
            file_name: self.file_name,
            reply_to: self.reply_to,
            timestamp: response.timestamp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageResponse {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub timestamp: u64,
}

fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Str(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Num(n) => n.to_string(),
        RawId::Str(s) => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, text: Option<&str>, file_url: Option<&str>) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            from_user: "alice".to_string(),
            to_target: "bob".to_string(),
            text: text.map(str::to_string),
            file_url: file_url.map(str::to_string),
            file_name: None,
            reply_to: None,
            timestamp: 1000,
        }
    }

    #[test]
    fn text_record_maps_to_text_body() {
        let message = Message::from_record(&record("42", Some("hi"), None)).unwrap();
        assert_eq!(message.body, MessageBody::Text("hi".to_string()));
        assert_eq!(message.id, "42");
        assert!(!message.is_provisional());
    }

    #[test]
    fn attachment_takes_precedence_and_derives_name() {
        let message =
            Message::from_record(&record("42", None, Some("https://x.io/cat.png?s=1"))).unwrap();
        assert_eq!(
            message.body,
            MessageBody::Attachment {
                url: "https://x.io/cat.png?s=1".to_string(),
                name: "cat.png".to_string(),
            }
        );
    }

    #[test]
    fn empty_parties_or_missing_body_are_rejected() {
        let mut missing_from = record("1", Some("hi"), None);
        missing_from.from_user.clear();
        assert!(Message::from_record(&missing_from).is_none());

        assert!(Message::from_record(&record("1", None, None)).is_none());
    }

    #[test]
    fn numeric_wire_ids_become_strings() {
        let json = r#"{"id":42,"from_user":"alice","to_target":"all","text":"hi","timestamp":5}"#;
        let record: MessageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "42");
    }

    #[test]
    fn composer_input_classification() {
        assert!(matches!(
            MessageBody::from_input("  hello  ").unwrap(),
            MessageBody::Text(text) if text == "hello"
        ));
        assert!(matches!(
            MessageBody::from_input("https://x.io/a/b.gif#frag").unwrap(),
            MessageBody::Attachment { name, .. } if name == "b.gif"
        ));
        assert!(MessageBody::from_input("   ").is_err());
        assert!(MessageBody::from_input(&"x".repeat(MAX_TEXT_LEN + 1)).is_err());
        // URLs with spaces are just text
        assert!(matches!(
            MessageBody::from_input("https://x.io/a b").unwrap(),
            MessageBody::Text(_)
        ));
    }

    #[test]
    fn provisional_ids_are_unique_and_prefixed() {
        let a = next_provisional_id(1000);
        let b = next_provisional_id(1000);
        assert_ne!(a, b);
        assert!(a.starts_with(PROVISIONAL_PREFIX));
    }

    #[test]
    fn confirmation_record_carries_server_id_and_timestamp() {
        let message = Message {
            id: next_provisional_id(1000),
            from: "alice".to_string(),
            to: "bob".to_string(),
            body: MessageBody::Text("hi".to_string()),
            reply_to: None,
            timestamp: 1000,
        };
        let request = CreateMessageRequest::from_message(&message);
        let record = request.into_record(CreateMessageResponse {
            id: "42".to_string(),
            timestamp: 1005,
        });
        assert_eq!(record.id, "42");
        assert_eq!(record.timestamp, 1005);
        assert_eq!(record.text.as_deref(), Some("hi"));
        assert_eq!(record.to_target, "bob");
    }
}
