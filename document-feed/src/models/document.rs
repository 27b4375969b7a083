use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A stored document as listed by the feed.
///
/// Records are ordered by `(created_at, id)`; that order is what cursors
/// and pages are defined against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }

    /// True when this record comes strictly after `cursor` in feed order.
    pub fn is_after(&self, cursor: &Cursor) -> bool {
        self.sort_key() > (cursor.created_at, cursor.id.as_str())
    }
}

impl PartialOrd for DocumentRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Insert payload; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl NewDocument {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

/// Position of a record in feed order. Only obtainable from a record, so a
/// cursor always points at something that existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    created_at: DateTime<Utc>,
    id: String,
}

impl Cursor {
    pub fn after(record: &DocumentRecord) -> Self {
        Self {
            created_at: record.created_at,
            id: record.id.clone(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// One push from a live page subscription.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub items: Vec<DocumentRecord>,
    pub last: Option<Cursor>,
}

impl PageSnapshot {
    pub fn new(items: Vec<DocumentRecord>) -> Self {
        let last = items.last().map(Cursor::after);
        Self { items, last }
    }
}
