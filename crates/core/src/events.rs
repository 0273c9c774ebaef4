//! Change notifications published by collections.

use serde::{Deserialize, Serialize};

/// A committed mutation of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent<R> {
    /// A record was inserted or updated. Carries the stored copy.
    Put { record: R },
    /// A record was deleted.
    Remove { record: R },
    /// The contents changed wholesale; subscribers must assume any cached
    /// view of the collection is stale.
    Reset,
}

impl<R> ChangeEvent<R> {
    pub fn put(record: R) -> Self {
        Self::Put { record }
    }

    pub fn remove(record: R) -> Self {
        Self::Remove { record }
    }

    pub fn reset() -> Self {
        Self::Reset
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Remove { .. } => "remove",
            Self::Reset => "reset",
        }
    }

    /// Returns the record this event is about, if any.
    pub fn record(&self) -> Option<&R> {
        match self {
            Self::Put { record } | Self::Remove { record } => Some(record),
            Self::Reset => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Tag {
        id: u32,
        label: String,
    }

    fn tag() -> Tag {
        Tag {
            id: 1,
            label: "a".to_string(),
        }
    }

    #[test]
    fn test_put_serializes_tagged() {
        let json = serde_json::to_value(ChangeEvent::put(tag())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "put", "record": { "id": 1, "label": "a" } })
        );
    }

    #[test]
    fn test_reset_round_trips() {
        let json = serde_json::to_string(&ChangeEvent::<Tag>::reset()).unwrap();
        assert_eq!(json, r#"{"type":"reset"}"#);
        let back: ChangeEvent<Tag> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChangeEvent::Reset);
    }

    #[test]
    fn test_name_and_record_accessors() {
        let remove = ChangeEvent::remove(tag());
        assert_eq!(remove.name(), "remove");
        assert_eq!(remove.record(), Some(&tag()));
        assert_eq!(ChangeEvent::<Tag>::reset().record(), None);
    }
}
