//! In-memory metadata store.
//!
//! Stores all metadata in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<BTreeMap>` for thread-safe
//! access; searches evaluate the structured [`Filter`] directly.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use futures::stream::{self, StreamExt};

use super::record::Metadata;
use super::store::{
    Attribute, Filter, FilterValue, MetadataStore, RecordStream, SearchRecord, SearchRequest,
    SortOrder, StoreError, StoredRecord,
};

pub struct MemoryMetadataStore {
    shard: String,
    records: RwLock<BTreeMap<String, Metadata>>,
}

impl MemoryMetadataStore {
    pub fn new(shard: &str) -> Self {
        Self {
            shard: shard.to_string(),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().expect("rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn new_etag() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn attribute_value(md: &Metadata, attr: Attribute) -> FilterValue {
    match attr {
        Attribute::Owner => FilterValue::Text(md.owner.clone()),
        Attribute::Dirname => FilterValue::Text(md.dirname.clone()),
        Attribute::Type => FilterValue::Type(md.entry_type()),
        Attribute::Name => FilterValue::Text(md.name().to_string()),
        Attribute::Mtime => FilterValue::Time(md.mtime),
    }
}

fn compare(left: &FilterValue, right: &FilterValue) -> Option<Ordering> {
    match (left, right) {
        (FilterValue::Text(a), FilterValue::Text(b)) => Some(a.cmp(b)),
        (FilterValue::Time(a), FilterValue::Time(b)) => Some(a.cmp(b)),
        (FilterValue::Type(a), FilterValue::Type(b)) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn matches(filter: &Filter, md: &Metadata) -> bool {
    match filter {
        Filter::And(terms) => terms.iter().all(|t| matches(t, md)),
        Filter::Equal(attr, value) => {
            compare(&attribute_value(md, *attr), value) == Some(Ordering::Equal)
        }
        Filter::GreaterOrEqual(attr, value) => matches!(
            compare(&attribute_value(md, *attr), value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::LessOrEqual(attr, value) => matches!(
            compare(&attribute_value(md, *attr), value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn sort_key_cmp(a: &Metadata, b: &Metadata, attr: Attribute) -> Ordering {
    let primary = match attr {
        Attribute::Mtime => a.mtime.cmp(&b.mtime),
        Attribute::Name => a.name().cmp(b.name()),
        other => compare(&attribute_value(a, other), &attribute_value(b, other))
            .unwrap_or(Ordering::Equal),
    };
    primary.then_with(|| a.key.cmp(&b.key))
}

impl MetadataStore for MemoryMetadataStore {
    fn get_record(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<StoredRecord, StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let records = self.records.read().expect("rwlock poisoned");
            match records.get(&key) {
                Some(md) => Ok(StoredRecord {
                    metadata: md.clone(),
                    shard: self.shard.clone(),
                }),
                None => Err(StoreError::NotFound { key }),
            }
        })
    }

    fn search(
        &self,
        request: SearchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RecordStream, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let records = self.records.read().expect("rwlock poisoned");
            let mut rows: Vec<Metadata> = records
                .values()
                .filter(|md| matches(&request.filter, md))
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                let ord = sort_key_cmp(a, b, request.sort_attribute);
                match request.sort_order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
            rows.truncate(request.limit as usize);

            let rows = rows.into_iter().map(|value| {
                Ok(SearchRecord {
                    key: value.key.clone(),
                    value,
                })
            });
            Ok(stream::iter(rows).boxed())
        })
    }

    fn put_record(
        &self,
        mut record: Metadata,
    ) -> Pin<Box<dyn Future<Output = Result<String, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut records = self.records.write().expect("rwlock poisoned");
            if let Some(expected) = record.etag.take() {
                let current = records.get(&record.key).and_then(|md| md.etag.as_deref());
                if current != Some(expected.as_str()) {
                    return Err(StoreError::Conflict { key: record.key });
                }
            }
            let etag = new_etag();
            record.etag = Some(etag.clone());
            records.insert(record.key.clone(), record);
            Ok(etag)
        })
    }

    fn delete_record(
        &self,
        key: &str,
        expected_etag: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        let expected = expected_etag.map(str::to_string);
        Box::pin(async move {
            let mut records = self.records.write().expect("rwlock poisoned");
            let Some(current) = records.get(&key) else {
                return Err(StoreError::NotFound { key });
            };
            if let Some(expected) = expected {
                if current.etag.as_deref() != Some(expected.as_str()) {
                    return Err(StoreError::Conflict { key });
                }
            }
            records.remove(&key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::metadata::record::{EntryKind, EntryType, ObjectInfo};

    fn make_dir(key: &str, mtime: i64) -> Metadata {
        Metadata {
            owner: "u".to_string(),
            mtime,
            ..Metadata::implicit_directory(key)
        }
    }

    fn make_object(key: &str, mtime: i64) -> Metadata {
        Metadata {
            owner: "u".to_string(),
            mtime,
            kind: EntryKind::Object(ObjectInfo {
                content_length: 1,
                content_md5: None,
                content_type: "text/plain".to_string(),
                object_id: "oid".to_string(),
                sharks: Vec::new(),
            }),
            ..Metadata::absent(key)
        }
    }

    fn search(filter: Filter, attr: Attribute, order: SortOrder, limit: u32) -> SearchRequest {
        SearchRequest {
            filter,
            sort_attribute: attr,
            sort_order: order,
            limit,
            hash_key: "/u/stor".to_string(),
            request_id: "req".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryMetadataStore::new("1.meta");
        assert!(matches!(
            store.get_record("/u/stor/x").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_issues_etag_and_get_reports_shard() {
        let store = MemoryMetadataStore::new("2.meta");
        let etag = store.put_record(make_dir("/u/stor/a", 1)).await.unwrap();
        let got = store.get_record("/u/stor/a").await.unwrap();
        assert_eq!(got.metadata.etag.as_deref(), Some(etag.as_str()));
        assert_eq!(got.shard, "2.meta");
    }

    #[tokio::test]
    async fn test_conditional_put_conflicts_on_stale_etag() {
        let store = MemoryMetadataStore::new("1.meta");
        let first = store.put_record(make_dir("/u/stor/a", 1)).await.unwrap();
        store.put_record(make_dir("/u/stor/a", 2)).await.unwrap();

        let mut stale = make_dir("/u/stor/a", 3);
        stale.etag = Some(first);
        assert!(matches!(
            store.put_record(stale).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_with_expected_etag() {
        let store = MemoryMetadataStore::new("1.meta");
        let etag = store.put_record(make_dir("/u/stor/a", 1)).await.unwrap();
        assert!(matches!(
            store.delete_record("/u/stor/a", Some("nope")).await,
            Err(StoreError::Conflict { .. })
        ));
        store.delete_record("/u/stor/a", Some(&etag)).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_limits() {
        let store = MemoryMetadataStore::new("1.meta");
        store.put_record(make_object("/u/stor/c", 30)).await.unwrap();
        store.put_record(make_dir("/u/stor/a", 10)).await.unwrap();
        store.put_record(make_object("/u/stor/b", 20)).await.unwrap();
        store.put_record(make_object("/u/stor/a/nested", 5)).await.unwrap();

        let filter = Filter::And(vec![
            Filter::Equal(Attribute::Owner, FilterValue::Text("u".into())),
            Filter::Equal(Attribute::Dirname, FilterValue::Text("/u/stor".into())),
            Filter::Equal(Attribute::Type, FilterValue::Type(EntryType::Object)),
        ]);
        let rows: Vec<_> = store
            .search(search(filter, Attribute::Mtime, SortOrder::Desc, 10))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["/u/stor/c", "/u/stor/b"]);

        let filter = Filter::Equal(Attribute::Dirname, FilterValue::Text("/u/stor".into()));
        let rows: Vec<_> = store
            .search(search(filter, Attribute::Name, SortOrder::Asc, 2))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["/u/stor/a", "/u/stor/b"]);
    }
}
