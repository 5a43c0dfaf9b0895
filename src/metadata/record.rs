//! Metadata records for namespace entries.
//!
//! A [`Metadata`] value describes one entry of the namespace tree.  The
//! fields that only make sense for a particular entry type live in the
//! [`EntryKind`] variant, so a directory can never carry a placement list
//! and an object can never lack one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Content type used by clients to create directories.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-json-stream; type=directory";

/// Content type used by clients to create links.
pub const LINK_CONTENT_TYPE: &str = "application/json; type=link";

/// Content type assigned to objects uploaded without one.
pub const DEFAULT_OBJECT_CONTENT_TYPE: &str = "application/octet-stream";

/// A storage node holding one replica of an object's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    /// Datacenter the node lives in.
    pub datacenter: String,
    /// Storage node identifier.
    pub storage_id: String,
}

/// Object-only metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Size in bytes.
    pub content_length: u64,
    /// Base64-encoded MD5 digest of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
    /// MIME content type.
    pub content_type: String,
    /// Identifier of the stored content.
    pub object_id: String,
    /// Storage nodes holding replicas; empty for zero-byte objects.
    #[serde(default)]
    pub sharks: Vec<StorageNode>,
}

/// Entry type together with its type-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    Object(ObjectInfo),
    /// A link to another record; the target's metadata is captured at
    /// link time.
    Link {
        link: Box<Metadata>,
    },
    /// Not-found sentinel.  Never persisted.
    Absent,
}

/// Discriminant of [`EntryKind`], used for filters and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Directory,
    Object,
    Link,
    Absent,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Directory => "directory",
            EntryType::Object => "object",
            EntryType::Link => "link",
            EntryType::Absent => "absent",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted description of one namespace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Normalized key (`/<owner uuid>/...`).
    pub key: String,
    /// Key of the parent directory.
    pub dirname: String,
    /// Owner account uuid.
    #[serde(default)]
    pub owner: String,
    /// Modification time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub mtime: i64,
    /// Request that last wrote this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Stored custom response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Role identifiers tagged on this entry.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Optimistic-concurrency token issued by the store.  On writes this
    /// is the token the stored record is expected to still carry.
    #[serde(skip)]
    pub etag: Option<String>,
    #[serde(flatten)]
    pub kind: EntryKind,
}

impl Metadata {
    /// A synthetic record for a key the store has no entry for.
    pub fn absent(key: &str) -> Self {
        Self::synthetic(key, EntryKind::Absent)
    }

    /// A synthetic directory record, used for root directories that
    /// conceptually always exist.
    pub fn implicit_directory(key: &str) -> Self {
        Self::synthetic(key, EntryKind::Directory)
    }

    fn synthetic(key: &str, kind: EntryKind) -> Self {
        Self {
            key: key.to_string(),
            dirname: dirname(key),
            owner: String::new(),
            mtime: 0,
            request_id: None,
            headers: BTreeMap::new(),
            roles: Vec::new(),
            etag: None,
            kind,
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self.kind {
            EntryKind::Directory => EntryType::Directory,
            EntryKind::Object(_) => EntryType::Object,
            EntryKind::Link { .. } => EntryType::Link,
            EntryKind::Absent => EntryType::Absent,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self.kind, EntryKind::Absent)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Object fields, if this is an object record.
    pub fn object(&self) -> Option<&ObjectInfo> {
        match &self.kind {
            EntryKind::Object(info) => Some(info),
            _ => None,
        }
    }

    /// Last path segment of the key.
    pub fn name(&self) -> &str {
        basename(&self.key)
    }
}

/// Parent directory of a normalized key (`/a/b/c` -> `/a/b`, `/a` -> `/`).
pub fn dirname(key: &str) -> String {
    match key.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => key[..idx].to_string(),
    }
}

/// Last segment of a normalized key.
pub fn basename(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
