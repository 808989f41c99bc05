//! Generic CRUD providers over document collections, with ready-made Axum handlers.
//!
//! A [`Provider`] binds one [`store::Collection`] and exposes eight primitives
//! through [`CrudProvider`]. [`handlers::router`] turns any provider into a route
//! group with pagination, sorting and relation population driven by the request.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod provider;
pub mod query;
pub mod schema;
pub mod store;

pub use config::ProviderConfig;
pub use errors::{HandlerError, ProviderError};
pub use provider::{CreateMode, CrudProvider, GetManyOptions, ListResult, Provider};
pub use query::{NormalizedQuery, PaginationSpec, Pager, Population, SortSpec, Source};
pub use serde_with;
