//! Memory record types
//!
//! A memory is a short piece of text owned by one user and guarded by a
//! privacy level. `NewDocument` is the shape accepted at the store's write
//! boundary, `Document` is what the store holds, and `MemoryRecord` is the
//! stripped projection handed back from a search.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Privacy level of a memory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    /// Readable by any requester
    Public,

    /// Readable by the owner only
    #[default]
    Private,

    /// Readable by the owner and the users on the access list
    Shared,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
            Privacy::Shared => "shared",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "private" => Ok(Privacy::Private),
            "shared" => Ok(Privacy::Shared),
            other => Err(EngineError::InvalidDocument(format!(
                "unknown privacy level '{}'. Must be one of: public, private, shared",
                other
            ))),
        }
    }
}

/// Users allowed to read a `shared` memory
///
/// Serialized as a comma-separated string (`"u2,u3"`), which is also the
/// form stored in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AccessList(BTreeSet<String>);

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list, ignoring blanks and surrounding whitespace
    pub fn parse(csv: &str) -> Self {
        csv.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// Exact membership test (no substring matching)
    pub fn contains(&self, user_id: &str) -> bool {
        self.0.contains(user_id)
    }

    pub fn insert(&mut self, user_id: impl Into<String>) -> bool {
        self.0.insert(user_id.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn to_csv(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

impl<S: Into<String>> FromIterator<S> for AccessList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<String> for AccessList {
    fn from(csv: String) -> Self {
        Self::parse(&csv)
    }
}

impl From<AccessList> for String {
    fn from(list: AccessList) -> Self {
        list.to_csv()
    }
}

/// A memory as submitted to the store
///
/// All of `content`, `user_id` and `privacy` are required; a map missing
/// any of them fails to deserialize. `access_list` defaults to empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub content: String,
    pub user_id: String,
    pub privacy: Privacy,
    #[serde(default)]
    pub access_list: AccessList,
}

impl NewDocument {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, privacy: Privacy) -> Self {
        Self {
            content: content.into(),
            user_id: user_id.into(),
            privacy,
            access_list: AccessList::new(),
        }
    }

    /// A private memory with an empty access list
    pub fn private_note(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(user_id, content, Privacy::Private)
    }

    /// Set the users allowed to read the memory
    ///
    /// The privacy level is left as given; the list is dropped on
    /// validation unless the memory is `shared`.
    pub fn with_access_list<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access_list = users.into_iter().collect();
        self
    }

    /// Check required fields and normalise the access list
    ///
    /// The access list only means something for `shared` memories, so it
    /// is cleared for the other two levels.
    pub fn validate(mut self) -> Result<Self, EngineError> {
        if self.content.trim().is_empty() {
            return Err(EngineError::InvalidDocument(
                "content is required".to_string(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(EngineError::InvalidDocument(
                "user_id is required".to_string(),
            ));
        }
        if self.privacy != Privacy::Shared {
            self.access_list.clear();
        }
        Ok(self)
    }
}

/// Replacement values for the mutable fields of a stored memory
///
/// A revision replaces all three fields at once; there is no partial patch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRevision {
    pub content: String,
    pub privacy: Privacy,
    #[serde(default)]
    pub access_list: AccessList,
}

impl DocumentRevision {
    pub fn new(content: impl Into<String>, privacy: Privacy) -> Self {
        Self {
            content: content.into(),
            privacy,
            access_list: AccessList::new(),
        }
    }

    pub fn with_access_list<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access_list = users.into_iter().collect();
        self
    }

    pub fn validate(mut self) -> Result<Self, EngineError> {
        if self.content.trim().is_empty() {
            return Err(EngineError::InvalidDocument(
                "content is required".to_string(),
            ));
        }
        if self.privacy != Privacy::Shared {
            self.access_list.clear();
        }
        Ok(self)
    }
}

/// A stored memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// UUIDv7, sortable by creation time
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub privacy: Privacy,
    pub access_list: AccessList,
}

impl Document {
    /// Whether `requester` may read this memory
    pub fn is_visible_to(&self, requester: &str) -> bool {
        if self.user_id == requester {
            return true;
        }
        match self.privacy {
            Privacy::Public => true,
            Privacy::Private => false,
            Privacy::Shared => self.access_list.contains(requester),
        }
    }

    /// Project to the caller-facing record, dropping id, owner and access fields
    pub fn to_record(&self) -> MemoryRecord {
        MemoryRecord {
            content: self.content.clone(),
            time: self
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%:z")
                .to_string(),
        }
    }
}

/// A search hit as returned to the requester
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryRecord {
    pub content: String,

    /// Creation time in the local timezone
    pub time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(owner: &str, privacy: Privacy, access: &str) -> Document {
        Document {
            id: "0190".to_string(),
            content: "likes Linux".to_string(),
            created_at: Utc::now(),
            user_id: owner.to_string(),
            privacy,
            access_list: AccessList::parse(access),
        }
    }

    #[test]
    fn test_access_list_parse_and_csv() {
        let list = AccessList::parse(" u3, u2,,u2 ");
        assert_eq!(list.len(), 2);
        assert!(list.contains("u2"));
        assert_eq!(list.to_csv(), "u2,u3");
    }

    #[test]
    fn test_access_list_exact_membership() {
        let list = AccessList::parse("user12");
        assert!(!list.contains("user1"));
        assert!(list.contains("user12"));
    }

    #[test]
    fn test_visibility_rules() {
        assert!(doc("u1", Privacy::Private, "").is_visible_to("u1"));
        assert!(!doc("u1", Privacy::Private, "u2").is_visible_to("u2"));
        assert!(doc("u1", Privacy::Public, "").is_visible_to("anyone"));
        assert!(doc("u1", Privacy::Shared, "u2").is_visible_to("u2"));
        assert!(!doc("u1", Privacy::Shared, "u2").is_visible_to("u3"));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(NewDocument::private_note("u1", "   ").validate().is_err());
        assert!(NewDocument::private_note("", "note").validate().is_err());
    }

    #[test]
    fn test_validate_clears_access_list_unless_shared() {
        let mut doc = NewDocument::new("u1", "note", Privacy::Public);
        doc.access_list = AccessList::parse("u2");
        let doc = doc.validate().unwrap();
        assert!(doc.access_list.is_empty());

        let shared = NewDocument::new("u1", "note", Privacy::Shared)
            .with_access_list(["u2"])
            .validate()
            .unwrap();
        assert_eq!(shared.privacy, Privacy::Shared);
        assert!(shared.access_list.contains("u2"));
    }

    #[test]
    fn test_access_list_keeps_requested_privacy() {
        let public = NewDocument::new("u1", "note", Privacy::Public)
            .with_access_list(Vec::<String>::new())
            .validate()
            .unwrap();
        assert_eq!(public.privacy, Privacy::Public);

        let revision = DocumentRevision::new("note", Privacy::Private)
            .with_access_list(["u2"])
            .validate()
            .unwrap();
        assert_eq!(revision.privacy, Privacy::Private);
        assert!(revision.access_list.is_empty());
    }

    #[test]
    fn test_boundary_shape_deserializes() {
        let json = r#"{"content":"likes Linux","user_id":"u1","privacy":"shared","access_list":"u2,u3"}"#;
        let doc: NewDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.privacy, Privacy::Shared);
        assert!(doc.access_list.contains("u3"));

        let missing_owner = r#"{"content":"likes Linux","privacy":"public"}"#;
        assert!(serde_json::from_str::<NewDocument>(missing_owner).is_err());
    }

    #[test]
    fn test_privacy_from_str() {
        assert_eq!("Shared".parse::<Privacy>().unwrap(), Privacy::Shared);
        assert!("secret".parse::<Privacy>().is_err());
    }

    #[test]
    fn test_record_strips_internal_fields() {
        let record = doc("u1", Privacy::Private, "").to_record();
        let json = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["content".to_string(), "time".to_string()]);
    }
}
