//! Identity pairs and qualification evidence.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// An opaque identity pair: a subject kind (e.g. "user", "device") and an
/// id unique within that kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
pub struct Subject {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub id: String,
}

impl Subject {
    pub fn new(subject_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            id: id.into(),
        }
    }

    /// True if both the type and the id match.
    pub fn same_as(&self, other: &Subject) -> bool {
        self.subject_type == other.subject_type && self.id == other.id
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.id)
    }
}

/// An observed event offered as proof that a referee did something the
/// campaign rewards (first purchase, signup completed, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub id: String,
    pub occur_time: Timestamp,
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_as_requires_type_and_id() {
        let a = Subject::new("user", "42");
        assert!(a.same_as(&Subject::new("user", "42")));
        assert!(!a.same_as(&Subject::new("device", "42")));
        assert!(!a.same_as(&Subject::new("user", "43")));
    }

    #[test]
    fn test_subject_wire_field_is_type() {
        let json = serde_json::to_value(Subject::new("user", "7")).expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "user", "id": "7"}));
    }

    #[test]
    fn test_evidence_attrs_default_empty() {
        let ev: Evidence =
            serde_json::from_str(r#"{"type":"purchase","id":"o-1","occur_time":100}"#)
                .expect("parse");
        assert_eq!(ev.evidence_type, "purchase");
        assert!(ev.attrs.is_empty());
    }
}
