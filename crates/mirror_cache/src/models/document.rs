use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mirror_cache_core::storage::Record;

/// A titled document, the record type used by the demo binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    /// Incremented by the store on every write.
    pub revision: u32,
    /// Set by the store on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Creates a document that has not been stored yet (nil id).
    pub fn draft(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.into(),
            revision: 0,
            updated_at: None,
        }
    }

    /// Creates a document with a caller-chosen id.
    pub fn with_id(id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id,
            ..Self::draft(title)
        }
    }

    pub fn is_draft(&self) -> bool {
        self.id.is_nil()
    }

    /// Server-side normalization applied by a store on `put`.
    ///
    /// Assigns an id to drafts, bumps the revision and stamps `updated_at`.
    pub fn normalize(mut self) -> Self {
        if self.is_draft() {
            self.id = Uuid::new_v4();
        }
        self.revision += 1;
        self.updated_at = Some(Utc::now());
        self
    }
}

impl Record for Document {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }
}
