#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use docprovider::store::{
    Collection, DeleteResult, Document, Filter, FindOptions, MemoryCollection, StoreError, UpdateOptions,
    UpdateResult,
};
use docprovider::{Population, Provider, ProviderConfig, handlers, schema::Schema};
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::Barrier;
use tower::ServiceExt;

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("test documents are objects")
}

pub fn users() -> Arc<MemoryCollection> {
    Arc::new(MemoryCollection::new("users").with_documents([
        doc(json!({"_id": "u1", "name": "Ada", "email": "ada@example.com", "active": true})),
        doc(json!({"_id": "u2", "name": "Bob", "email": "bob@example.com", "active": false})),
    ]))
}

/// Five tickets `t1..t5`; `t5` is closed, the rest open. Only `t3` is urgent.
pub fn tickets() -> MemoryCollection {
    let schema = Schema::new()
        .required("title")
        .default_value("status", json!("open"));
    let docs = (1..=5).map(|i| {
        let status = if i == 5 { "closed" } else { "open" };
        let author = if i % 2 == 0 { "u2" } else { "u1" };
        let urgent = i == 3;
        doc(json!({
            "_id": format!("t{i}"),
            "title": format!("Ticket {i}"),
            "status": status,
            "rank": i,
            "urgent": urgent,
            "author": author,
            "watchers": ["u1", "u2"]
        }))
    });
    MemoryCollection::new("tickets")
        .with_schema(schema)
        .with_relation("author", users())
        .with_relation("watchers", users())
        .with_documents(docs)
}

pub fn setup_app<C: Collection + 'static>(collection: Arc<C>) -> Router {
    setup_app_with(collection, ProviderConfig::default())
}

pub fn setup_app_with<C: Collection + 'static>(collection: Arc<C>, config: ProviderConfig) -> Router {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let provider = Arc::new(Provider::new(collection));
    Router::new().nest("/tickets", handlers::router(provider, config))
}

pub fn encode(value: &Value) -> String {
    url_escape::encode_component(&value.to_string()).into_owned()
}

pub async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, value)
}

pub fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .expect("an array of documents")
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect()
}

/// Delegates to an inner collection and counts every store call.
pub struct CountingCollection<C> {
    pub inner: C,
    calls: AtomicUsize,
}

impl<C> CountingCollection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<C: Collection> Collection for CountingCollection<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        self.hit();
        self.inner.find(filter, options).await
    }

    async fn find_one(&self, filter: &Filter, populations: &[Population]) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.find_one(filter, populations).await
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.hit();
        self.inner.count(filter).await
    }

    async fn insert_one(&self, doc: Document, validate: bool) -> Result<Document, StoreError> {
        self.hit();
        self.inner.insert_one(doc, validate).await
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        self.hit();
        self.inner.insert_many(docs).await
    }

    async fn update_one(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.update_one(filter, patch, options).await
    }

    async fn update_many(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError> {
        self.hit();
        self.inner.update_many(filter, patch, options).await
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.hit();
        self.inner.delete_one(filter).await
    }

    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.hit();
        self.inner.delete_many(filter).await
    }
}

/// `find` and `count` each wait until the other has started, so a caller
/// awaiting them one after the other never finishes.
pub struct RendezvousCollection {
    pub inner: MemoryCollection,
    barrier: Barrier,
}

impl RendezvousCollection {
    pub fn new(inner: MemoryCollection) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
        }
    }
}

#[async_trait]
impl Collection for RendezvousCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        self.barrier.wait().await;
        self.inner.find(filter, options).await
    }

    async fn find_one(&self, filter: &Filter, populations: &[Population]) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(filter, populations).await
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.barrier.wait().await;
        self.inner.count(filter).await
    }

    async fn insert_one(&self, doc: Document, validate: bool) -> Result<Document, StoreError> {
        self.inner.insert_one(doc, validate).await
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        self.inner.insert_many(docs).await
    }

    async fn update_one(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.update_one(filter, patch, options).await
    }

    async fn update_many(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError> {
        self.inner.update_many(filter, patch, options).await
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.inner.delete_one(filter).await
    }

    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        self.inner.delete_many(filter).await
    }
}

/// Every operation fails. `count_only` fails just the total count, so a paginated
/// read has one half succeed and the other fail.
pub struct FailingCollection {
    pub error: StoreError,
    pub count_only: Option<MemoryCollection>,
}

impl FailingCollection {
    pub fn new(error: StoreError) -> Self {
        Self { error, count_only: None }
    }

    pub fn failing_count(inner: MemoryCollection) -> Self {
        Self {
            error: StoreError::Connection("count timed out".to_string()),
            count_only: Some(inner),
        }
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        Err(self.error.clone())
    }
}

#[async_trait]
impl Collection for FailingCollection {
    fn name(&self) -> &str {
        "failing"
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        match &self.count_only {
            Some(inner) => inner.find(filter, options).await,
            None => self.fail(),
        }
    }

    async fn find_one(&self, _: &Filter, _: &[Population]) -> Result<Option<Document>, StoreError> {
        self.fail()
    }

    async fn count(&self, _: &Filter) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn insert_one(&self, _: Document, _: bool) -> Result<Document, StoreError> {
        self.fail()
    }

    async fn insert_many(&self, _: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        self.fail()
    }

    async fn update_one(&self, _: &Filter, _: &Document, _: UpdateOptions) -> Result<Option<Document>, StoreError> {
        self.fail()
    }

    async fn update_many(&self, _: &Filter, _: &Document, _: UpdateOptions) -> Result<UpdateResult, StoreError> {
        self.fail()
    }

    async fn delete_one(&self, _: &Filter) -> Result<DeleteResult, StoreError> {
        self.fail()
    }

    async fn delete_many(&self, _: &Filter) -> Result<DeleteResult, StoreError> {
        self.fail()
    }
}
