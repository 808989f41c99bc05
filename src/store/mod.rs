//! # Document Store Contract
//!
//! The provider layer never talks to a database directly. It orchestrates calls
//! against a [`Collection`], which must offer matching, sorting, skip/limit,
//! counting and relation population on its own.
//!
//! [`MemoryCollection`] is a complete in-process implementation, used by the test
//! suite and handy for prototyping a route group before a real store exists.

pub mod matcher;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::query::{Population, SortSpec};
use crate::schema::ValidationErrors;

pub use memory::MemoryCollection;

/// A stored document. Field order is preserved.
pub type Document = Map<String, Value>;

/// Store-native match criteria. Opaque to the provider layer.
pub type Filter = Map<String, Value>;

/// Failures reported by a collection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("cannot populate unknown relation `{0}`")]
    UnknownRelation(String),

    #[error("{0}")]
    Other(String),
}

/// Options for a multi-document read.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub populations: Vec<Population>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Insert a document built from the filter and patch when nothing matches.
    pub upsert: bool,
}

/// Outcome of a multi-document update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub upserted_id: Option<Value>,
}

/// Deletion acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

impl DeleteResult {
    #[must_use]
    pub const fn deleted(count: u64) -> Self {
        Self {
            acknowledged: true,
            deleted_count: count,
        }
    }
}

/// The primitives a document collection must provide.
///
/// Every method returns through the same `Result<_, StoreError>` contract. Retries,
/// pooling and backpressure belong to the implementation, not to callers.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Name used in logs and in the `Content-Range` header.
    fn name(&self) -> &str;

    /// All matching documents, sorted, then windowed by skip/limit, then populated.
    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError>;

    /// First matching document in natural order, populated.
    async fn find_one(
        &self,
        filter: &Filter,
        populations: &[Population],
    ) -> Result<Option<Document>, StoreError>;

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Insert one document. `validate` runs the collection's defaulting and validation first.
    async fn insert_one(&self, doc: Document, validate: bool) -> Result<Document, StoreError>;

    /// Insert every document or none of them. Documents are validated.
    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, StoreError>;

    /// Patch the first match and return it as it is after the update.
    async fn update_one(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError>;

    async fn update_many(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError>;

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult, StoreError>;

    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult, StoreError>;
}
