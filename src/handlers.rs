//! # Handler Adapter
//!
//! Axum handlers over any [`CrudProvider`], plus [`router`] assembling them into the
//! HTTP surface of one route group:
//!
//! | method | path    | handler         | provider primitive             |
//! |--------|---------|-----------------|--------------------------------|
//! | GET    | `/`     | [`list`]        | `get_many`, paginated          |
//! | GET    | `/find` | [`find`]        | `get_many`, pagination off     |
//! | GET    | `/one`  | [`find_one`]    | `get_one`                      |
//! | POST   | `/`     | [`create`]      | `create_one` (validated)       |
//! | POST   | `/many` | [`create_many`] | `create_many`                  |
//! | PUT    | `/`     | [`update`]      | `update_one`, body `{query, data}` |
//! | PUT    | `/many` | [`update_many`] | `update_many`, body `{query, data}` |
//! | DELETE | `/`     | [`delete`]      | `delete_one`, body is the filter |
//! | DELETE | `/many` | [`delete_many`] | `delete_many`, body is the filter |
//!
//! Every handler runs its work through the same [`guard`]: a failure during
//! normalization or store access becomes a [`HandlerError`] response and never
//! escapes the handler.
//!
//! ```rust,no_run
//! use axum::Router;
//! use docprovider::{handlers, Provider, ProviderConfig};
//! use docprovider::store::MemoryCollection;
//! use std::sync::Arc;
//!
//! let tickets = Provider::new(Arc::new(MemoryCollection::new("tickets")));
//! let app: Router = Router::new().nest("/tickets", handlers::router(Arc::new(tickets), ProviderConfig::default()));
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use std::{future::Future, sync::Arc};

use crate::config::ProviderConfig;
use crate::errors::{HandlerError, ProviderError};
use crate::provider::{CreateMode, CrudProvider, GetManyOptions};
use crate::query::{PAGINATION_KEY, Source, normalize_with, pagination::content_range};
use crate::store::{Document, Filter};

/// Query-string pairs in request order. A decoding failure is kept so the handler
/// can report it through [`guard`].
pub type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Shared state of one route group.
pub struct RouteState<P: ?Sized> {
    pub provider: Arc<P>,
    pub config: ProviderConfig,
}

impl<P: ?Sized> Clone for RouteState<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
        }
    }
}

impl<P: CrudProvider + ?Sized> RouteState<P> {
    pub const fn new(provider: Arc<P>, config: ProviderConfig) -> Self {
        Self { provider, config }
    }

    fn options(&self, source: Source, params: Filter) -> Result<(Filter, GetManyOptions), ProviderError> {
        let query = normalize_with(params, source, self.config.default_page_size)?;
        let options = GetManyOptions {
            pagination: Some(query.pagination),
            sort: query.sort,
            populations: query.populations,
        };
        Ok((query.filter, options))
    }
}

/// Raw parameters from the configured source. Query-string values arrive as text.
fn request_params(source: Source, query: QueryPairs, body: &Bytes) -> Result<Filter, ProviderError> {
    match source {
        Source::Query => {
            let Query(pairs) = query.map_err(|e| ProviderError::malformed("query", e.body_text()))?;
            Ok(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
        }
        Source::Body => body_object(body),
    }
}

/// Run a handler body, turning any [`ProviderError`] into a [`HandlerError`] response.
pub async fn guard<T, F>(operation: &'static str, resource: &str, work: F) -> Response
where
    T: IntoResponse,
    F: Future<Output = Result<T, ProviderError>>,
{
    tracing::debug!(operation, resource, "Handling request");
    match work.await {
        Ok(output) => output.into_response(),
        Err(err) => HandlerError::from(err).into_response(),
    }
}

fn parse_body(body: &Bytes) -> Result<Value, ProviderError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ProviderError::malformed("body", e))
}

/// The body as a JSON object; an empty body is an empty object.
fn body_object(body: &Bytes) -> Result<Document, ProviderError> {
    match parse_body(body)? {
        Value::Null => Ok(Document::new()),
        Value::Object(map) => Ok(map),
        other => Err(ProviderError::malformed("body", format!("expected a JSON object, got `{other}`"))),
    }
}

fn object_field(payload: &mut Document, field: &str) -> Result<Option<Document>, ProviderError> {
    match payload.shift_remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(ProviderError::malformed(field, format!("expected a JSON object, got `{other}`"))),
    }
}

/// Split an update body `{query, data}`. A missing `query` matches everything.
fn update_payload(body: &Bytes) -> Result<(Filter, Document), ProviderError> {
    let mut payload = body_object(body)?;
    let filter = object_field(&mut payload, "query")?.unwrap_or_default();
    let patch = object_field(&mut payload, "data")?
        .ok_or_else(|| ProviderError::malformed("data", "update body needs a `data` object"))?;
    Ok((filter, patch))
}

/// `GET /`: paginated listing. Responds with `{data, pager}` (or a bare array when
/// the request disables pagination) and a `Content-Range` header for pages.
pub async fn list<P: CrudProvider + ?Sized>(
    State(state): State<RouteState<P>>,
    query: QueryPairs,
    body: Bytes,
) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("list", &resource, async {
        let source = state.config.list_source;
        let (filter, options) = state.options(source, request_params(source, query, &body)?)?;
        let result = state.provider.get_many(filter, options).await?;
        let headers = result.pager().map_or_else(HeaderMap::new, |pager| {
            content_range(pager, result.documents().len() as u64, &resource)
        });
        Ok((headers, Json(result)))
    })
    .await
}

/// `GET /find`: every match as a bare array. Any `pagination` parameter is ignored.
pub async fn find<P: CrudProvider + ?Sized>(
    State(state): State<RouteState<P>>,
    query: QueryPairs,
    body: Bytes,
) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("find", &resource, async {
        let source = state.config.find_source;
        let mut params = request_params(source, query, &body)?;
        params.shift_remove(PAGINATION_KEY);
        let (filter, mut options) = state.options(source, params)?;
        options.pagination = None;
        Ok(Json(state.provider.get_many(filter, options).await?))
    })
    .await
}

/// `GET /one`: the first match, or `null`. Honors `populates`.
pub async fn find_one<P: CrudProvider + ?Sized>(
    State(state): State<RouteState<P>>,
    query: QueryPairs,
    body: Bytes,
) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("find_one", &resource, async {
        let source = state.config.find_one_source;
        let mut params = request_params(source, query, &body)?;
        params.shift_remove(PAGINATION_KEY);
        let (filter, options) = state.options(source, params)?;
        Ok(Json(state.provider.get_one(filter, &options.populations).await?))
    })
    .await
}

/// `POST /`: validated insert of the body document.
pub async fn create<P: CrudProvider + ?Sized>(State(state): State<RouteState<P>>, body: Bytes) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("create", &resource, async {
        let doc = body_object(&body)?;
        let created = state.provider.create_one(doc, CreateMode::Validated).await?;
        Ok((StatusCode::CREATED, Json(created)))
    })
    .await
}

/// `POST /many`: body is an array of documents, inserted all or nothing.
pub async fn create_many<P: CrudProvider + ?Sized>(State(state): State<RouteState<P>>, body: Bytes) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("create_many", &resource, async {
        let Value::Array(entries) = parse_body(&body)? else {
            return Err(ProviderError::malformed("body", "expected a JSON array of documents"));
        };
        let docs = entries
            .into_iter()
            .map(|entry| match entry {
                Value::Object(doc) => Ok(doc),
                other => Err(ProviderError::malformed("body", format!("expected a document, got `{other}`"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let created = state.provider.create_many(docs).await?;
        Ok((StatusCode::CREATED, Json(created)))
    })
    .await
}

/// `PUT /`: patch the first match of `query` with `data`. Responds with the updated
/// document, or `null` when nothing matched. Never inserts.
pub async fn update<P: CrudProvider + ?Sized>(State(state): State<RouteState<P>>, body: Bytes) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("update", &resource, async {
        let (filter, patch) = update_payload(&body)?;
        Ok(Json(state.provider.update_one(filter, patch).await?))
    })
    .await
}

/// `PUT /many`: patch every match of `query` with `data`, inserting when none match.
pub async fn update_many<P: CrudProvider + ?Sized>(State(state): State<RouteState<P>>, body: Bytes) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("update_many", &resource, async {
        let (filter, patch) = update_payload(&body)?;
        Ok(Json(state.provider.update_many(filter, patch).await?))
    })
    .await
}

pub async fn delete<P: CrudProvider + ?Sized>(State(state): State<RouteState<P>>, body: Bytes) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("delete", &resource, async {
        let filter = body_object(&body)?;
        Ok(Json(state.provider.delete_one(filter).await?))
    })
    .await
}

pub async fn delete_many<P: CrudProvider + ?Sized>(State(state): State<RouteState<P>>, body: Bytes) -> Response {
    let resource = state.provider.resource_name().to_string();
    guard("delete_many", &resource, async {
        let filter = body_object(&body)?;
        Ok(Json(state.provider.delete_many(filter).await?))
    })
    .await
}

/// The full route group for one provider, ready to be nested under a prefix.
pub fn router<P: CrudProvider + ?Sized + 'static>(provider: Arc<P>, config: ProviderConfig) -> Router {
    Router::new()
        .route(
            "/",
            get(list::<P>).post(create::<P>).put(update::<P>).delete(delete::<P>),
        )
        .route("/find", get(find::<P>))
        .route("/one", get(find_one::<P>))
        .route(
            "/many",
            axum::routing::post(create_many::<P>)
                .put(update_many::<P>)
                .delete(delete_many::<P>),
        )
        .with_state(RouteState::new(provider, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_body_is_an_empty_object() {
        assert!(body_object(&Bytes::new()).unwrap().is_empty());
        assert!(body_object(&Bytes::from_static(b"  \n")).unwrap().is_empty());
    }

    #[test]
    fn test_non_object_body_is_malformed() {
        for raw in [&b"[1,2]"[..], b"\"text\"", b"{broken"] {
            let err = body_object(&Bytes::copy_from_slice(raw)).unwrap_err();
            assert!(matches!(err, ProviderError::MalformedInput { .. }));
        }
    }

    #[test]
    fn test_update_payload_split() {
        let body = Bytes::from(json!({"query": {"status": "open"}, "data": {"owner": "ada"}}).to_string());
        let (filter, patch) = update_payload(&body).unwrap();
        assert_eq!(Value::Object(filter), json!({"status": "open"}));
        assert_eq!(Value::Object(patch), json!({"owner": "ada"}));

        let body = Bytes::from(json!({"data": {"owner": "ada"}}).to_string());
        assert!(update_payload(&body).unwrap().0.is_empty());

        let body = Bytes::from(json!({"query": {"status": "open"}}).to_string());
        assert!(matches!(
            update_payload(&body).unwrap_err(),
            ProviderError::MalformedInput { field, .. } if field == "data"
        ));
    }
}
