//! # Providers
//!
//! A provider is bound to exactly one collection and exposes eight uniform
//! primitives over it. It holds no per-request state, so one instance is built at
//! startup and shared by every request.
//!
//! ```rust
//! use docprovider::provider::{CrudProvider, GetManyOptions, ListResult, Provider};
//! use docprovider::query::PaginationSpec;
//! use docprovider::store::{Filter, MemoryCollection};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), docprovider::ProviderError> {
//! let provider = Provider::new(Arc::new(MemoryCollection::new("tickets")));
//! let page = provider
//!     .get_many(Filter::new(), GetManyOptions::paginated(PaginationSpec::new(0, 20)))
//!     .await?;
//! assert!(matches!(page, ListResult::Page { .. }));
//! # Ok(())
//! # }
//! ```
//!
//! ## Upsert asymmetry
//!
//! `update_one` never inserts. `update_many` inserts a document built from the filter
//! and patch when nothing matches. Callers relying on one behaviour must pick the
//! matching primitive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::query::{PaginationSpec, Pager, Population, SortSpec};
use crate::store::{
    Collection, DeleteResult, Document, Filter, FindOptions, UpdateOptions, UpdateResult,
};

/// How `create_one` inserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateMode {
    /// Run the collection's defaulting and validation first
    #[default]
    Validated,
    /// Insert the document as given
    Direct,
}

/// Options for [`CrudProvider::get_many`]. Without pagination, or with disabled
/// pagination, the full match set is returned. Sort and populations apply either way.
#[derive(Debug, Clone, Default)]
pub struct GetManyOptions {
    pub pagination: Option<PaginationSpec>,
    pub sort: Option<SortSpec>,
    pub populations: Vec<Population>,
}

impl GetManyOptions {
    #[must_use]
    pub fn paginated(pagination: PaginationSpec) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn populated(mut self, populations: Vec<Population>) -> Self {
        self.populations = populations;
        self
    }
}

/// Result envelope of `get_many`: a bare sequence, or a page with its pager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListResult {
    All(Vec<Document>),
    Page { data: Vec<Document>, pager: Pager },
}

impl ListResult {
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        match self {
            Self::All(data) | Self::Page { data, .. } => data,
        }
    }

    #[must_use]
    pub const fn pager(&self) -> Option<&Pager> {
        match self {
            Self::All(_) => None,
            Self::Page { pager, .. } => Some(pager),
        }
    }
}

/// The eight primitives every provider exposes. Handlers only ever see this trait.
#[async_trait]
pub trait CrudProvider: Send + Sync {
    /// Name of the bound collection.
    fn resource_name(&self) -> &str;

    /// First match with populations applied, or `None`.
    async fn get_one(
        &self,
        filter: Filter,
        populations: &[Population],
    ) -> Result<Option<Document>, ProviderError>;

    /// Page window and total count run concurrently when paginated; both must succeed.
    async fn get_many(&self, filter: Filter, options: GetManyOptions) -> Result<ListResult, ProviderError>;

    async fn create_one(&self, doc: Document, mode: CreateMode) -> Result<Document, ProviderError>;

    async fn create_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, ProviderError>;

    /// Patch the first match. Never inserts.
    async fn update_one(&self, filter: Filter, patch: Document) -> Result<Option<Document>, ProviderError>;

    /// Patch every match. Inserts when nothing matches.
    async fn update_many(&self, filter: Filter, patch: Document) -> Result<UpdateResult, ProviderError>;

    async fn delete_one(&self, filter: Filter) -> Result<DeleteResult, ProviderError>;

    async fn delete_many(&self, filter: Filter) -> Result<DeleteResult, ProviderError>;
}

/// The stock provider: a thin orchestration layer over one [`Collection`].
#[derive(Debug)]
pub struct Provider<C> {
    collection: Arc<C>,
}

impl<C> Clone for Provider<C> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
        }
    }
}

impl<C: Collection> Provider<C> {
    pub const fn new(collection: Arc<C>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }
}

#[async_trait]
impl<C: Collection + 'static> CrudProvider for Provider<C> {
    fn resource_name(&self) -> &str {
        self.collection.name()
    }

    async fn get_one(
        &self,
        filter: Filter,
        populations: &[Population],
    ) -> Result<Option<Document>, ProviderError> {
        tracing::debug!(collection = self.resource_name(), "get_one");
        Ok(self.collection.find_one(&filter, populations).await?)
    }

    async fn get_many(&self, filter: Filter, options: GetManyOptions) -> Result<ListResult, ProviderError> {
        let GetManyOptions {
            pagination,
            sort,
            populations,
        } = options;

        let Some(pagination) = pagination.filter(|p| !p.disabled) else {
            tracing::debug!(collection = self.resource_name(), "get_many without pagination");
            let find = FindOptions {
                sort,
                populations,
                ..FindOptions::default()
            };
            return Ok(ListResult::All(self.collection.find(&filter, &find).await?));
        };

        tracing::debug!(
            collection = self.resource_name(),
            page = pagination.page,
            page_size = pagination.page_size,
            "get_many"
        );
        let find = FindOptions {
            sort,
            skip: Some(pagination.skip()),
            limit: Some(pagination.page_size),
            populations,
        };
        let (data, total) = tokio::try_join!(
            self.collection.find(&filter, &find),
            self.collection.count(&filter)
        )?;
        Ok(ListResult::Page {
            data,
            pager: Pager::new(&pagination, total),
        })
    }

    async fn create_one(&self, doc: Document, mode: CreateMode) -> Result<Document, ProviderError> {
        tracing::debug!(collection = self.resource_name(), ?mode, "create_one");
        let validate = mode == CreateMode::Validated;
        Ok(self.collection.insert_one(doc, validate).await?)
    }

    async fn create_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, ProviderError> {
        tracing::debug!(collection = self.resource_name(), count = docs.len(), "create_many");
        Ok(self.collection.insert_many(docs).await?)
    }

    async fn update_one(&self, filter: Filter, patch: Document) -> Result<Option<Document>, ProviderError> {
        tracing::debug!(collection = self.resource_name(), "update_one");
        let options = UpdateOptions { upsert: false };
        Ok(self.collection.update_one(&filter, &patch, options).await?)
    }

    async fn update_many(&self, filter: Filter, patch: Document) -> Result<UpdateResult, ProviderError> {
        tracing::debug!(collection = self.resource_name(), "update_many");
        let options = UpdateOptions { upsert: true };
        Ok(self.collection.update_many(&filter, &patch, options).await?)
    }

    async fn delete_one(&self, filter: Filter) -> Result<DeleteResult, ProviderError> {
        tracing::debug!(collection = self.resource_name(), "delete_one");
        Ok(self.collection.delete_one(&filter).await?)
    }

    async fn delete_many(&self, filter: Filter) -> Result<DeleteResult, ProviderError> {
        tracing::debug!(collection = self.resource_name(), "delete_many");
        Ok(self.collection.delete_many(&filter).await?)
    }
}
