//! Slot records and the small value types that travel with them.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a slot record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a slot. The watcher only ever moves a slot between
/// these two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    #[serde(rename = "training")]
    Training,
    #[serde(rename = "selfTraining")]
    SelfTraining,
}

impl SlotType {
    /// Value as stored in the record store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotType::Training => "training",
            SlotType::SelfTraining => "selfTraining",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "training" => Some(SlotType::Training),
            "selfTraining" => Some(SlotType::SelfTraining),
            _ => None,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled training session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSlot {
    pub id: SlotId,
    /// Calendar day the slot belongs to. Never rewritten by the watcher.
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    /// Participant ids as the writer stored them. May contain duplicates;
    /// use [`TrainingSlot::participant_set`] for anything count-related.
    #[serde(default)]
    pub participant_ids: Vec<String>,
    /// Human label of the slot (e.g. "19:00"), only used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<String>,
}

impl TrainingSlot {
    pub fn new(id: impl Into<String>, date: NaiveDate, slot_type: SlotType) -> Self {
        Self {
            id: SlotId::new(id),
            date,
            slot_type,
            participant_ids: Vec::new(),
            slot_key: None,
        }
    }

    pub fn with_participants<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participant_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.slot_key = Some(key.to_string());
        self
    }

    /// Distinct participants; order and duplicates are irrelevant.
    pub fn participant_set(&self) -> HashSet<&str> {
        self.participant_ids.iter().map(String::as_str).collect()
    }

    /// Number of distinct participants.
    pub fn participant_count(&self) -> usize {
        self.participant_set().len()
    }

    /// Label for log lines.
    pub fn key_or_unknown(&self) -> &str {
        self.slot_key.as_deref().unwrap_or("unknown")
    }
}

/// Exact-match query on `date` and `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub slot_type: SlotType,
    /// `None` = unbounded.
    pub limit: Option<usize>,
}

impl SlotQuery {
    pub fn on(date: NaiveDate, slot_type: SlotType) -> Self {
        Self {
            date,
            slot_type,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, slot: &TrainingSlot) -> bool {
        slot.date == self.date && slot.slot_type == self.slot_type
    }
}

/// Field update for one record. `type` is the only field the watcher writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotUpdate {
    pub id: SlotId,
    pub slot_type: SlotType,
}

impl SlotUpdate {
    pub fn set_type(id: SlotId, slot_type: SlotType) -> Self {
        Self { id, slot_type }
    }
}

/// One entry of the change feed: a record before and after an update.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotChange {
    /// Position in the feed, ascending.
    pub seq: i64,
    pub slot_id: SlotId,
    pub before: TrainingSlot,
    pub after: TrainingSlot,
}

/// Broadcast push message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub body: String,
    pub topic: String,
}

impl NotificationEvent {
    pub fn new(title: &str, body: &str, topic: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            topic: topic.to_string(),
        }
    }
}
