//! Directory listing.
//!
//! Query parameters are validated up front by [`ListingQuery::from_params`];
//! [`list`] then runs a single store search and yields entries lazily.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use futures::stream::{BoxStream, StreamExt};
use metrics::counter;
use serde::Serialize;
use tracing::debug;

use crate::errors::GatewayError;
use crate::metadata::record::{basename, EntryType};
use crate::metadata::store::{
    Attribute, Filter, FilterValue, MetadataStore, SearchRecord, SearchRequest, SortOrder,
};
use crate::metrics::LISTINGS_TOTAL;

pub const DEFAULT_LIMIT: u32 = 256;
pub const MAX_LIMIT: u32 = 1024;

/// A validated listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    /// Key of the directory being listed.
    pub dir: String,
    pub filter: Filter,
    pub sort_attribute: Attribute,
    pub sort_order: SortOrder,
    pub limit: u32,
}

impl ListingQuery {
    /// Validate listing parameters for directory `dir` owned by `owner`.
    pub fn from_params(
        dir: &str,
        owner: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, GatewayError> {
        let limit = match params.get("limit") {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if (1..=MAX_LIMIT as i64).contains(&n) => n as u32,
                _ => {
                    return Err(GatewayError::InvalidPageSize {
                        limit: raw.clone(),
                    })
                }
            },
        };

        let has = |names: [&str; 2]| names.iter().any(|n| params.contains_key(*n));
        let dirs_only = has(["dir", "directory"]);
        let objects_only = has(["obj", "object"]);

        let mut terms = vec![
            Filter::Equal(Attribute::Owner, FilterValue::Text(owner.to_string())),
            Filter::Equal(Attribute::Dirname, FilterValue::Text(dir.to_string())),
        ];
        match (dirs_only, objects_only) {
            (true, false) => terms.push(Filter::Equal(
                Attribute::Type,
                FilterValue::Type(EntryType::Directory),
            )),
            (false, true) => terms.push(Filter::Equal(
                Attribute::Type,
                FilterValue::Type(EntryType::Object),
            )),
            _ => {}
        }

        let reverse = params.get("sort_order").is_some_and(|v| v == "reverse");
        let by_time = params.get("sort").is_some_and(|v| v == "mtime");

        if let Some(marker) = params.get("marker").filter(|m| !m.is_empty()) {
            let bound = if by_time {
                let ms = parse_time_marker(marker).ok_or_else(|| GatewayError::InvalidMarker {
                    name: "marker".to_string(),
                    value: marker.clone(),
                })?;
                let value = FilterValue::Time(ms);
                if reverse {
                    Filter::GreaterOrEqual(Attribute::Mtime, value)
                } else {
                    Filter::LessOrEqual(Attribute::Mtime, value)
                }
            } else {
                let value = FilterValue::Text(marker.clone());
                if reverse {
                    Filter::LessOrEqual(Attribute::Name, value)
                } else {
                    Filter::GreaterOrEqual(Attribute::Name, value)
                }
            };
            terms.push(bound);
        }

        let (sort_attribute, sort_order) = match (by_time, reverse) {
            (true, false) => (Attribute::Mtime, SortOrder::Desc),
            (true, true) => (Attribute::Mtime, SortOrder::Asc),
            (false, false) => (Attribute::Name, SortOrder::Asc),
            (false, true) => (Attribute::Name, SortOrder::Desc),
        };

        Ok(Self {
            dir: dir.to_string(),
            filter: Filter::And(terms),
            sort_attribute,
            sort_order,
            limit,
        })
    }

    fn search_request(&self, request_id: &str) -> SearchRequest {
        SearchRequest {
            filter: self.filter.clone(),
            sort_attribute: self.sort_attribute,
            sort_order: self.sort_order,
            limit: self.limit,
            hash_key: self.dir.clone(),
            request_id: request_id.to_string(),
        }
    }
}

/// Milliseconds since the epoch for an RFC 3339, HTTP-date or date-only
/// (`YYYY-MM-DD`, midnight UTC) marker.
fn parse_time_marker(marker: &str) -> Option<i64> {
    if let Ok(t) = DateTime::parse_from_rfc3339(marker) {
        return Some(t.timestamp_millis());
    }
    if let Ok(t) = httpdate::parse_http_date(marker) {
        return Some(DateTime::<Utc>::from(t).timestamp_millis());
    }
    let day = NaiveDate::parse_from_str(marker, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub mtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durability: Option<usize>,
}

impl ListingEntry {
    fn from_record(record: SearchRecord) -> Self {
        let md = record.value;
        let object = md.object();
        let mtime = DateTime::<Utc>::from_timestamp_millis(md.mtime)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            name: basename(&record.key).to_string(),
            etag: md.etag.clone(),
            size: object.map(|o| o.content_length),
            entry_type: md.entry_type(),
            mtime,
            durability: object.map(|o| o.sharks.len()),
        }
    }
}

pub type ListingStream = BoxStream<'static, Result<ListingEntry, GatewayError>>;

/// Run the listing search and return its entries as a lazy stream.
///
/// The record stored under `self_key` (the directory itself) is skipped.
pub async fn list(
    store: &dyn MetadataStore,
    query: &ListingQuery,
    self_key: &str,
    request_id: &str,
) -> Result<ListingStream, GatewayError> {
    debug!(
        dir = %query.dir,
        filter = %query.filter,
        limit = query.limit,
        req_id = request_id,
        "list: entered"
    );
    let sort = if query.sort_attribute == Attribute::Mtime {
        "mtime"
    } else {
        "name"
    };
    counter!(LISTINGS_TOTAL, "sort" => sort).increment(1);

    let records = store
        .search(query.search_request(request_id))
        .await
        .map_err(|e| GatewayError::from_store(&query.dir, e))?;

    let self_key = self_key.to_string();
    let dir = query.dir.clone();
    let entries = records.filter_map(move |row| {
        let item = match row {
            Ok(record) if record.key == self_key => None,
            Ok(record) => Some(Ok(ListingEntry::from_record(record))),
            Err(err) => Some(Err(GatewayError::from_store(&dir, err))),
        };
        futures::future::ready(item)
    });
    Ok(entries.boxed())
}
