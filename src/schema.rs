//! Document schema support
//!
//! A [`Schema`] carries the defaulting and required-field rules a collection
//! applies on validated inserts (and on documents created by an upsert).
//! Direct inserts skip it entirely.
//!
//! # Example
//!
//! ```rust
//! use docprovider::schema::Schema;
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .required("title")
//!     .default_value("status", json!("open"));
//!
//! let mut doc = json!({"title": "Write docs"}).as_object().cloned().unwrap();
//! schema.apply(&mut doc).unwrap();
//! assert_eq!(doc["status"], "open");
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::store::Document;

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.field, self.message)
    }
}

/// Every rejected field of one document, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("document failed validation")?;
        for (index, error) in self.0.iter().enumerate() {
            f.write_str(if index == 0 { ": " } else { "; " })?;
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Defaulting and required-field rules for one collection.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    defaults: Vec<(String, Value)>,
    required: Vec<String>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a top-level field as required (present and not null).
    #[must_use]
    pub fn required(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Value written into a document when the field is absent.
    #[must_use]
    pub fn default_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.defaults.push((field.into(), value));
        self
    }

    /// Fill in defaults for absent fields. Existing values, including nulls, are kept.
    pub fn apply_defaults(&self, doc: &mut Document) {
        for (field, value) in &self.defaults {
            if !doc.contains_key(field) {
                doc.insert(field.clone(), value.clone());
            }
        }
    }

    /// Check required fields without touching the document.
    ///
    /// # Errors
    ///
    /// Returns every missing or null required field at once.
    pub fn validate(&self, doc: &Document) -> Result<(), ValidationErrors> {
        let errors: ValidationErrors = self
            .required
            .iter()
            .filter(|field| doc.get(field.as_str()).is_none_or(Value::is_null))
            .map(ValidationError::required)
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Defaults first, then validation.
    ///
    /// # Errors
    ///
    /// See [`Schema::validate`].
    pub fn apply(&self, doc: &mut Document) -> Result<(), ValidationErrors> {
        self.apply_defaults(doc);
        self.validate(doc)
    }
}
