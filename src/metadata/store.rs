//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses manually desugared async methods (pinned boxed futures) so it can
//! be used as a trait object from the request pipeline.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::stream::BoxStream;
use thiserror::Error;

use super::record::{EntryType, Metadata};

// ── Errors ─────────────────────────────────────────────────────────

/// Failures reported by a metadata store.  Not-found is kept apart from
/// every other failure so callers can default it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record is stored under the key.
    #[error("{key} does not exist")]
    NotFound { key: String },

    /// The stored concurrency token no longer matches the expected one.
    #[error("{key} was modified concurrently")]
    Conflict { key: String },

    /// Network or backend failure.
    #[error("metadata store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

// ── Record types ───────────────────────────────────────────────────

/// A record read from the store, with the partition that served it.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// The record, with its concurrency token set.
    pub metadata: Metadata,
    /// Shard that answered the read.
    pub shard: String,
}

/// One row of a search result.
#[derive(Debug, Clone)]
pub struct SearchRecord {
    /// Key of the matching record.
    pub key: String,
    /// The record, with its concurrency token set.
    pub value: Metadata,
}

// ── Search ─────────────────────────────────────────────────────────

/// Attributes a search filter or sort may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Owner,
    Dirname,
    Type,
    Name,
    Mtime,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Owner => "owner",
            Attribute::Dirname => "dirname",
            Attribute::Type => "type",
            Attribute::Name => "name",
            Attribute::Mtime => "_mtime",
        }
    }
}

/// Typed value a filter term compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Type(EntryType),
    Time(i64),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(&escape_filter_value(s)),
            FilterValue::Type(t) => f.write_str(t.as_str()),
            FilterValue::Time(ms) => write!(f, "{ms}"),
        }
    }
}

/// Search filter, rendered in the store's LDAP-style filter syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Equal(Attribute, FilterValue),
    GreaterOrEqual(Attribute, FilterValue),
    LessOrEqual(Attribute, FilterValue),
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(terms) => {
                f.write_str("(&")?;
                for term in terms {
                    write!(f, "{term}")?;
                }
                f.write_str(")")
            }
            Filter::Equal(attr, value) => write!(f, "({}={})", attr.as_str(), value),
            Filter::GreaterOrEqual(attr, value) => write!(f, "({}>={})", attr.as_str(), value),
            Filter::LessOrEqual(attr, value) => write!(f, "({}<={})", attr.as_str(), value),
        }
    }
}

/// Escape the characters that are special in filter values.
fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            _ => out.push(c),
        }
    }
    out
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A filtered, sorted, limited search over records.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub filter: Filter,
    pub sort_attribute: Attribute,
    pub sort_order: SortOrder,
    pub limit: u32,
    /// Key the store hashes on to pick a shard.
    pub hash_key: String,
    /// Request correlation id.
    pub request_id: String,
}

/// Lazy, single-pass sequence of search results.
pub type RecordStream = BoxStream<'static, Result<SearchRecord, StoreError>>;

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
pub trait MetadataStore: Send + Sync + 'static {
    /// Fetch the record stored under `key`.
    fn get_record(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<StoredRecord, StoreError>> + Send + '_>>;

    /// Run a search; rows are produced lazily as the caller polls.
    fn search(
        &self,
        request: SearchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RecordStream, StoreError>> + Send + '_>>;

    /// Insert or replace a record and return its new concurrency token.
    ///
    /// When `record.etag` is set the write only succeeds if the stored
    /// record still carries that token.  Unconditioned writes are retried
    /// once by the store on conflict.
    fn put_record(
        &self,
        record: Metadata,
    ) -> Pin<Box<dyn Future<Output = Result<String, StoreError>> + Send + '_>>;

    /// Delete the record stored under `key`, optionally conditioned on
    /// its concurrency token.
    fn delete_record(
        &self,
        key: &str,
        expected_etag: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_renders_conjunction() {
        let filter = Filter::And(vec![
            Filter::Equal(Attribute::Owner, FilterValue::Text("u1".into())),
            Filter::Equal(Attribute::Dirname, FilterValue::Text("/u1/stor".into())),
            Filter::Equal(Attribute::Type, FilterValue::Type(EntryType::Directory)),
            Filter::GreaterOrEqual(Attribute::Mtime, FilterValue::Time(1000)),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(owner=u1)(dirname=/u1/stor)(type=directory)(_mtime>=1000))"
        );
    }

    #[test]
    fn test_filter_escapes_special_characters() {
        let filter = Filter::LessOrEqual(Attribute::Name, FilterValue::Text("a*(b)".into()));
        assert_eq!(filter.to_string(), "(name<=a\\2a\\28b\\29)");
    }
}
