//! # Error Handling
//!
//! Two layers:
//!
//! - [`ProviderError`] is what normalization and provider primitives return. It keeps
//!   the taxonomy callers need to react to: malformed structured input, out-of-domain
//!   pagination values, and store failures carrying the underlying [`StoreError`].
//! - [`HandlerError`] is the single shape every HTTP handler hands to the rest of the
//!   request pipeline: `{code, message}`. It is written as the JSON response body and
//!   also stored in the response extensions, so middleware can inspect it without
//!   reparsing the body.
//!
//! "Not found" is not an error here: `get_one`, `update_one` and `delete_one` report
//! absence through `None` or a zero count.
//!
//! ## Logging
//!
//! Store failures are logged with `tracing::error!` when converted. Client errors are
//! logged at debug level. No output unless the application installs a subscriber.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;

use crate::store::StoreError;

/// Failures raised while normalizing a request or running a provider primitive.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// A structured field (sort, pagination, populates, payload) failed to decode
    /// or has the wrong shape.
    #[error("malformed `{field}`: {reason}")]
    MalformedInput { field: String, reason: String },

    /// Pagination values outside their domain.
    #[error("invalid `{field}`: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// The underlying collection operation failed. Never retried here.
    #[error("store failure: {0}")]
    StoreFailure(#[from] StoreError),
}

impl ProviderError {
    pub fn malformed(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::MalformedInput {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller, not the server, is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedInput { .. } | Self::InvalidArgument { .. })
    }
}

/// The uniform error object produced at the handler boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HandlerError {
    /// HTTP status code
    pub code: u16,
    /// User-facing message
    pub message: String,
}

impl HandlerError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Convert a provider failure into the handler error shape.
///
/// **Conversion Rules:**
/// - `MalformedInput`, `InvalidArgument` → 400 with the full reason
/// - `StoreFailure` with a validation or duplicate-key error → 500, store message forwarded
/// - every other `StoreFailure` → 500 "A database error occurred" (details logged only)
impl From<ProviderError> for HandlerError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::MalformedInput { .. } | ProviderError::InvalidArgument { .. } => {
                tracing::debug!(error = %err, "Rejected request input");
                Self::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            ProviderError::StoreFailure(store) => {
                tracing::error!(error = ?store, "Store operation failed");
                match store {
                    StoreError::Validation(_) | StoreError::DuplicateKey(_) | StoreError::InvalidUpdate(_) => {
                        Self::new(StatusCode::INTERNAL_SERVER_ERROR, store.to_string())
                    }
                    _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred"),
                }
            }
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.clone())).into_response();
        response.extensions_mut().insert(self);
        response
    }
}
