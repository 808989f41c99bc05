//! # Query Normalization
//!
//! Turns the raw parameter mapping of a request into structured descriptors before
//! anything touches the store.
//!
//! Three keys are reserved and never reach the store filter:
//!
//! | key          | structured form                                  |
//! |--------------|--------------------------------------------------|
//! | `sort`       | `{"field": 1 \| -1 \| "asc" \| "desc"}` or `"-a b"` |
//! | `pagination` | `{"page": 0, "pageSize": 10, "disabled": false}` |
//! | `populates`  | `["author:name", {"path": "comments"}]`          |
//!
//! Query strings can only carry text, so from [`Source::Query`] these keys are
//! JSON-encoded strings. From [`Source::Body`] they are already structured. Each key is
//! decoded once, up front, through [`RawParam`]; everything downstream sees typed values.
//!
//! The remaining query-string values become the filter. Those that read as a number
//! or a boolean are compared as one, so `?rank=2` matches `{"rank": 2}`.
//!
//! ```rust
//! use docprovider::query::{normalize, Source};
//! use serde_json::json;
//!
//! let params = json!({
//!     "status": "open",
//!     "sort": "{\"createdAt\":-1}",
//!     "pagination": "{\"page\":1,\"pageSize\":2}"
//! });
//! let query = normalize(params.as_object().cloned().unwrap(), Source::Query).unwrap();
//! assert_eq!(query.filter.len(), 1);
//! assert_eq!(query.pagination.page, 1);
//! ```

pub mod pagination;
pub mod populate;
pub mod sort;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProviderError;
use crate::store::Filter;

pub use pagination::{PaginationSpec, Pager, RawPagination, DEFAULT_PAGE_SIZE};
pub use populate::Population;
pub use sort::{SortDirection, SortSpec};

pub const SORT_KEY: &str = "sort";
pub const PAGINATION_KEY: &str = "pagination";
pub const POPULATES_KEY: &str = "populates";

/// Keys pulled out of the parameter mapping before it becomes a filter.
pub const RESERVED_KEYS: [&str; 3] = [SORT_KEY, PAGINATION_KEY, POPULATES_KEY];

/// Where a handler reads its parameters from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Query,
    Body,
}

/// A reserved parameter before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawParam {
    /// JSON text, as carried by a query string
    Encoded(String),
    /// Already-structured JSON, as carried by a request body
    Structured(Value),
}

impl RawParam {
    /// Classify a value by the transport it came from. Only query-string
    /// strings are treated as encoded; a body string is a structured string.
    #[must_use]
    pub fn from_source(value: Value, source: Source) -> Self {
        match (source, value) {
            (Source::Query, Value::String(text)) => Self::Encoded(text),
            (_, value) => Self::Structured(value),
        }
    }

    /// # Errors
    ///
    /// `MalformedInput` when encoded text is not valid JSON.
    pub fn decode(self, field: &str) -> Result<Value, ProviderError> {
        match self {
            Self::Encoded(text) => {
                serde_json::from_str(&text).map_err(|e| ProviderError::malformed(field, e))
            }
            Self::Structured(value) => Ok(value),
        }
    }
}

/// Structured descriptors for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedQuery {
    pub filter: Filter,
    pub sort: Option<SortSpec>,
    pub pagination: PaginationSpec,
    pub populations: Vec<Population>,
}

/// A bare scalar when `raw` is JSON for one, the text itself otherwise.
pub(crate) fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_object() && !value.is_array() => value,
        _ => Value::String(raw.to_string()),
    }
}

fn take_reserved(params: &mut Filter, key: &str, source: Source) -> Result<Option<Value>, ProviderError> {
    let Some(value) = params.shift_remove(key) else {
        return Ok(None);
    };
    let decoded = RawParam::from_source(value, source).decode(key)?;
    Ok((!decoded.is_null()).then_some(decoded))
}

fn coerce_query_scalars(filter: &mut Filter) {
    for value in filter.values_mut() {
        if let Value::String(text) = value
            && let scalar @ (Value::Bool(_) | Value::Number(_)) = parse_scalar(text)
        {
            *value = scalar;
        }
    }
}

fn decode_populations(value: Value) -> Result<Vec<Population>, ProviderError> {
    match value {
        Value::Array(entries) => entries.into_iter().map(Population::from_value).collect(),
        single => Ok(vec![Population::from_value(single)?]),
    }
}

/// Normalize with the stock default page size.
///
/// # Errors
///
/// See [`normalize_with`].
pub fn normalize(params: Filter, source: Source) -> Result<NormalizedQuery, ProviderError> {
    normalize_with(params, source, DEFAULT_PAGE_SIZE)
}

/// Split reserved keys off `params`, decode them, and keep the rest as the filter.
///
/// Absent pagination means page 0 of `default_page_size` documents, enabled.
///
/// # Errors
///
/// `MalformedInput` when a reserved key fails to decode or has the wrong shape;
/// `InvalidArgument` when pagination values are out of domain.
pub fn normalize_with(
    mut params: Filter,
    source: Source,
    default_page_size: u64,
) -> Result<NormalizedQuery, ProviderError> {
    let sort = take_reserved(&mut params, SORT_KEY, source)?;
    let raw_pagination = take_reserved(&mut params, PAGINATION_KEY, source)?;
    let populates = take_reserved(&mut params, POPULATES_KEY, source)?;

    let sort = sort.as_ref().map(SortSpec::from_value).transpose()?;
    let raw_pagination = raw_pagination
        .map(RawPagination::from_value)
        .transpose()?
        .unwrap_or_default();
    let pagination = pagination::validate_with_default(&raw_pagination, default_page_size)?;
    let populations = populates.map(decode_populations).transpose()?.unwrap_or_default();
    if source == Source::Query {
        coerce_query_scalars(&mut params);
    }

    Ok(NormalizedQuery {
        filter: params,
        sort,
        pagination,
        populations,
    })
}
