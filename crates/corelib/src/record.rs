//! Application records (news items) and deletion tombstones.

use crate::error::Result;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic reserved for deletion commands.
pub const DELETION_TOPIC: &str = "stergere";

/// Title given to tombstones created locally.
pub const DELETION_TITLE: &str = "Stergere stire";

/// A news item, or a tombstone when `topic == DELETION_TOPIC`.
///
/// The id is `<origin>:<uuid>` and is the dedup key everywhere: the store,
/// the durable log and replication all rely on it never changing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub content: String,
    pub topic: String,
}

impl Record {
    /// Create a record originated by `origin` with a fresh unique id.
    pub fn new(
        origin: &NodeId,
        title: impl Into<String>,
        content: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}:{}", origin, Uuid::new_v4()),
            title: title.into(),
            content: content.into(),
            topic: topic.into(),
        }
    }

    /// Create a tombstone that removes `target_id` wherever it is accepted.
    pub fn tombstone(origin: &NodeId, target_id: impl Into<String>) -> Self {
        Self::new(origin, DELETION_TITLE, target_id, DELETION_TOPIC)
    }

    pub fn is_tombstone(&self) -> bool {
        self.topic == DELETION_TOPIC
    }

    /// The id a tombstone deletes.
    pub fn target_id(&self) -> Option<&str> {
        self.is_tombstone().then(|| self.content.as_str())
    }

    /// The node prefix of the id (everything before the first `:`).
    pub fn origin(&self) -> &str {
        origin_of(&self.id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// The originating node prefix of a record id.
pub fn origin_of(record_id: &str) -> &str {
    record_id.split(':').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_carries_origin() {
        let origin = NodeId::from_index(2);
        let record = Record::new(&origin, "title", "body", "tech");
        assert!(record.id.starts_with("N2:"));
        assert_eq!(record.origin(), "N2");
        assert!(!record.is_tombstone());
        assert_eq!(record.target_id(), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let origin = NodeId::from_index(1);
        let a = Record::new(&origin, "t", "c", "tech");
        let b = Record::new(&origin, "t", "c", "tech");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_tombstone_targets_content() {
        let origin = NodeId::from_index(1);
        let tombstone = Record::tombstone(&origin, "N1:abc");
        assert!(tombstone.is_tombstone());
        assert_eq!(tombstone.topic, DELETION_TOPIC);
        assert_eq!(tombstone.target_id(), Some("N1:abc"));
    }

    #[test]
    fn test_json_has_exactly_four_fields() {
        let record = Record {
            id: "N1:abc".into(),
            title: "t".into(),
            content: "c".into(),
            topic: "tech".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(Record::from_json(&record.to_json().unwrap()).unwrap(), record);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Record::from_json("not json").is_err());
        assert!(Record::from_slice(br#"{"id":"N1:x"}"#).is_err());
    }
}
