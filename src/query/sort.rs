use serde::Serialize;
use serde_json::Value;

use crate::errors::ProviderError;

const FIELD: &str = "sort";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Convert a direction token to `SortDirection`
fn parse_direction(field: &str, value: &Value) -> Result<SortDirection, ProviderError> {
    match value {
        Value::Number(n) if n.as_i64() == Some(1) => Ok(SortDirection::Ascending),
        Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortDirection::Descending),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortDirection::Ascending),
            "desc" | "descending" | "-1" => Ok(SortDirection::Descending),
            _ => Err(ProviderError::malformed(FIELD, format!("unknown direction `{s}` for `{field}`"))),
        },
        other => Err(ProviderError::malformed(FIELD, format!("unknown direction `{other}` for `{field}`"))),
    }
}

/// Field name to direction, in precedence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(Vec<(String, SortDirection)>);

impl SortSpec {
    #[must_use]
    pub const fn from_fields(fields: Vec<(String, SortDirection)>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, SortDirection)> {
        self.0.iter().map(|(field, direction)| (field.as_str(), *direction))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode an already-structured sort value.
    ///
    /// Accepted shapes:
    /// - `{"createdAt": -1, "name": "asc"}`: object order is precedence order
    /// - `"-createdAt name"`: a leading `-` means descending
    ///
    /// # Errors
    ///
    /// `MalformedInput` for any other shape, empty field names or unknown directions.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        let fields = match value {
            Value::Object(map) => map
                .iter()
                .map(|(field, direction)| {
                    if field.is_empty() {
                        return Err(ProviderError::malformed(FIELD, "empty field name"));
                    }
                    Ok((field.clone(), parse_direction(field, direction)?))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::String(s) => s
                .split_whitespace()
                .map(|token| {
                    let (field, direction) = match token.strip_prefix('-') {
                        Some(field) => (field, SortDirection::Descending),
                        None => (token.trim_start_matches('+'), SortDirection::Ascending),
                    };
                    if field.is_empty() {
                        return Err(ProviderError::malformed(FIELD, "empty field name"));
                    }
                    Ok((field.to_string(), direction))
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(ProviderError::malformed(
                    FIELD,
                    format!("expected an object or a string, got `{other}`"),
                ));
            }
        };
        Ok(Self(fields))
    }
}
