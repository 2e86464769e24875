//! Contact message records as kept in the local store.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_SUBJECT: &str = "No subject";

/// Message identifier. New records get a UUID; records written by the old
/// contact page carry a millisecond timestamp number, kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Numeric(i64),
    Text(String),
}

impl MessageId {
    pub fn generate() -> Self {
        MessageId::Text(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Numeric(n) => write!(f, "{}", n),
            MessageId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, alias = "created", with = "timestamp")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub read: bool,

    #[serde(
        default,
        rename = "pageUrl",
        alias = "page_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_url: Option<String>,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

impl Message {
    /// Milliseconds since the epoch; records without a usable timestamp sort
    /// as the epoch itself.
    pub fn sort_key(&self) -> i64 {
        self.timestamp.map(|t| t.timestamp_millis()).unwrap_or(0)
    }

    pub fn timestamp_string(&self) -> Option<String> {
        self.timestamp.map(format_timestamp)
    }

    /// True when `key` is this record's id or its ISO timestamp.
    pub fn matches_key(&self, key: &str) -> bool {
        if self.id.as_ref().is_some_and(|id| id.to_string() == key) {
            return true;
        }
        self.timestamp_string().is_some_and(|ts| ts == key)
    }

    /// Same calendar day as `now`, judged in `now`'s time zone.
    pub fn is_same_day<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        match self.timestamp {
            Some(ts) => ts.with_timezone(&now.timezone()).date_naive() == now.date_naive(),
            None => false,
        }
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Serde adapter for message timestamps: written as ISO-8601 UTC with
/// milliseconds, read from an ISO string or epoch milliseconds. Anything else
/// reads as missing rather than failing the whole record.
pub mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.and_then(|value| match value {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFilter {
    #[default]
    All,
    Unread,
    Read,
    Today,
}

impl MessageFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFilter::All => "all",
            MessageFilter::Unread => "unread",
            MessageFilter::Read => "read",
            MessageFilter::Today => "today",
        }
    }

    pub fn accepts<Tz: TimeZone>(&self, message: &Message, now: &DateTime<Tz>) -> bool {
        match self {
            MessageFilter::All => true,
            MessageFilter::Unread => !message.read,
            MessageFilter::Read => message.read,
            MessageFilter::Today => message.is_same_day(now),
        }
    }
}

impl FromStr for MessageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(MessageFilter::All),
            "unread" => Ok(MessageFilter::Unread),
            "read" => Ok(MessageFilter::Read),
            "today" => Ok(MessageFilter::Today),
            other => Err(format!("unknown message filter '{}'", other)),
        }
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxStats {
    pub total: usize,
    pub unread: usize,
    pub today: usize,
}

impl InboxStats {
    pub fn compute<Tz: TimeZone>(messages: &[Message], now: &DateTime<Tz>) -> Self {
        Self {
            total: messages.len(),
            unread: messages.iter().filter(|m| !m.read).count(),
            today: messages.iter().filter(|m| m.is_same_day(now)).count(),
        }
    }
}

/// Stable descending sort by timestamp.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by_key(|m| std::cmp::Reverse(m.sort_key()));
}
