use axum::http::{HeaderMap, HeaderValue, header::CONTENT_RANGE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use utoipa::ToSchema;

use crate::errors::ProviderError;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Pagination as it arrives on the wire. Every field may be a number or a
/// numeric string (`?pagination={"page":"2"}` is as valid as `{"page": 2}`).
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPagination {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub page: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub page_size: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub disabled: Option<bool>,
}

impl RawPagination {
    /// Decode a structured pagination value.
    ///
    /// # Errors
    ///
    /// `MalformedInput` when the value is not an object or a field has the wrong type.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if !value.is_object() {
            return Err(ProviderError::malformed("pagination", "expected an object"));
        }
        serde_json::from_value(value).map_err(|e| ProviderError::malformed("pagination", e))
    }
}

/// Validated pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationSpec {
    /// Zero-based page index
    pub page: u64,
    /// Documents per page, always at least 1
    pub page_size: u64,
    /// When set, page and page size are ignored and the full match set is returned
    pub disabled: bool,
}

impl PaginationSpec {
    #[must_use]
    pub const fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size,
            disabled: false,
        }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            disabled: true,
        }
    }

    #[must_use]
    pub const fn skip(&self) -> u64 {
        self.page.saturating_mul(self.page_size)
    }
}

impl Default for PaginationSpec {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

/// Validate with the stock default page size of 10.
///
/// # Errors
///
/// See [`validate_with_default`].
pub fn validate(raw: &RawPagination) -> Result<PaginationSpec, ProviderError> {
    validate_with_default(raw, DEFAULT_PAGE_SIZE)
}

/// Bounds-check raw pagination.
///
/// Disabled pagination is not validated: out-of-domain values fall back to
/// `page = 0` and the default page size. Enabled pagination is strict.
///
/// # Errors
///
/// `InvalidArgument` when `page < 0` or `pageSize <= 0`.
pub fn validate_with_default(
    raw: &RawPagination,
    default_page_size: u64,
) -> Result<PaginationSpec, ProviderError> {
    let default_page_size = default_page_size.max(1);
    if raw.disabled.unwrap_or(false) {
        return Ok(PaginationSpec {
            page: raw.page.and_then(|p| u64::try_from(p).ok()).unwrap_or(0),
            page_size: raw
                .page_size
                .and_then(|s| u64::try_from(s).ok())
                .filter(|s| *s > 0)
                .unwrap_or(default_page_size),
            disabled: true,
        });
    }

    let page = match raw.page {
        None => 0,
        Some(p) => u64::try_from(p)
            .map_err(|_| ProviderError::invalid("pagination.page", format!("must be >= 0, got {p}")))?,
    };
    let page_size = match raw.page_size {
        None => default_page_size,
        Some(s) if s > 0 => s.unsigned_abs(),
        Some(s) => {
            return Err(ProviderError::invalid(
                "pagination.pageSize",
                format!("must be >= 1, got {s}"),
            ));
        }
    };
    Ok(PaginationSpec::new(page, page_size))
}

/// Pagination metadata attached to a paginated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    pub page: u64,
    pub total: u64,
    pub page_size: u64,
    /// `ceil(total / pageSize)`
    pub total_page: u64,
}

impl Pager {
    #[must_use]
    pub const fn new(pagination: &PaginationSpec, total: u64) -> Self {
        let divisor = if pagination.page_size == 0 { 1 } else { pagination.page_size };
        Self {
            page: pagination.page,
            total,
            page_size: pagination.page_size,
            total_page: total.div_ceil(divisor),
        }
    }
}

/// Sanitize resource name by removing control characters for HTTP headers
fn sanitize_resource_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
}

/// Build the `Content-Range` header for a page window: `<resource> <first>-<last>/<total>`.
///
/// An empty window (page past the end, or no documents) is reported as
/// `<resource> */<total>`.
#[must_use]
pub fn content_range(pager: &Pager, returned: u64, resource_name: &str) -> HeaderMap {
    let safe_name = sanitize_resource_name(resource_name);
    let first = pager.page.saturating_mul(pager.page_size);
    let range = if returned == 0 {
        format!("{safe_name} */{}", pager.total)
    } else {
        format!("{safe_name} {first}-{}/{}", first + returned - 1, pager.total)
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&range) {
        headers.insert(CONTENT_RANGE, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawPagination {
        RawPagination::from_value(value).unwrap()
    }

    #[test]
    fn test_string_fields_are_coerced() {
        let spec = validate(&raw(json!({"page": "2", "pageSize": "25", "disabled": "false"}))).unwrap();
        assert_eq!(spec, PaginationSpec::new(2, 25));
    }

    #[test]
    fn test_missing_page_size_defaults_to_ten() {
        let spec = validate(&raw(json!({"page": 3}))).unwrap();
        assert_eq!(spec.page_size, 10);
        assert_eq!(spec.skip(), 30);
    }

    #[test]
    fn test_negative_page_is_rejected() {
        let err = validate(&raw(json!({"page": -1, "pageSize": 5}))).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument { .. }));
    }

    #[test]
    fn test_non_positive_page_size_is_rejected() {
        for size in [0, -3] {
            let err = validate(&raw(json!({"page": 0, "pageSize": size}))).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidArgument { .. }));
        }
    }

    #[test]
    fn test_disabled_skips_validation() {
        let spec = validate(&raw(json!({"page": -4, "pageSize": 0, "disabled": true}))).unwrap();
        assert!(spec.disabled);
        assert_eq!(spec.page, 0);
        assert_eq!(spec.page_size, 10);
    }

    #[test]
    fn test_non_numeric_values_are_malformed() {
        let err = RawPagination::from_value(json!({"page": "two"})).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedInput { .. }));
        let err = RawPagination::from_value(json!([0, 10])).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedInput { .. }));
    }

    #[test]
    fn test_custom_default_page_size() {
        let spec = validate_with_default(&RawPagination::default(), 50).unwrap();
        assert_eq!(spec, PaginationSpec::new(0, 50));
    }

    #[test]
    fn test_pager_total_page_rounds_up() {
        let pager = Pager::new(&PaginationSpec::new(1, 2), 5);
        assert_eq!(pager.total_page, 3);
        assert_eq!(Pager::new(&PaginationSpec::new(0, 5), 0).total_page, 0);
        assert_eq!(Pager::new(&PaginationSpec::new(0, 5), 10).total_page, 2);
    }

    #[test]
    fn test_content_range() {
        let pager = Pager::new(&PaginationSpec::new(1, 2), 5);
        let headers = content_range(&pager, 2, "tickets");
        assert_eq!(headers.get(CONTENT_RANGE).unwrap(), "tickets 2-3/5");

        let past_end = Pager::new(&PaginationSpec::new(9, 2), 5);
        let headers = content_range(&past_end, 0, "tickets");
        assert_eq!(headers.get(CONTENT_RANGE).unwrap(), "tickets */5");
    }

    #[test]
    fn test_content_range_strips_control_characters() {
        let pager = Pager::new(&PaginationSpec::new(0, 10), 100);
        let headers = content_range(&pager, 10, "users\r\nInjected: evil");
        let value = headers.get(CONTENT_RANGE).unwrap().to_str().unwrap();
        assert!(!value.contains('\r'));
        assert!(!value.contains('\n'));
    }
}
