//! Population directives.
//!
//! A directive names a relation to expand plus optional refinements, packed into
//! one colon-separated string so it survives a query string:
//!
//! ```text
//! path[:select[:match[:limit]]]
//!
//! author                               expand `author`
//! author:name email                    ...keeping only name, email (and _id)
//! comments::status\:approved:5         ...approved comments only, at most 5 per parent
//! comments::{"votes"\:{"$gte"\:3}}     ...match slot given as a JSON filter
//! ```
//!
//! `\:` is a literal colon and `\\` a literal backslash inside a slot. Empty slots are
//! unset. The match slot is a JSON object or comma-separated `field:value` pairs whose
//! values are read as JSON scalars when they parse as one (`5`, `true`) and as strings
//! otherwise.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_scalar;
use crate::errors::ProviderError;
use crate::store::Filter;

const FIELD: &str = "populates";

/// One relation expansion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Population {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Decode one entry of a structured `populates` list: either a directive
    /// string or an object `{path, select, match, limit}`.
    ///
    /// # Errors
    ///
    /// `MalformedInput` for other shapes or an empty path.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        let population = match value {
            Value::String(directive) => return parse(&directive),
            Value::Object(_) => serde_json::from_value::<Self>(value)
                .map_err(|e| ProviderError::malformed(FIELD, e))?,
            other => {
                return Err(ProviderError::malformed(
                    FIELD,
                    format!("expected a directive string or an object, got `{other}`"),
                ));
            }
        };
        if population.path.is_empty() {
            return Err(ProviderError::malformed(FIELD, "empty relation path"));
        }
        Ok(population)
    }
}

/// Split on unescaped colons, resolving `\:` and `\\`.
fn split_slots(directive: &str) -> Result<Vec<String>, ProviderError> {
    let mut slots = Vec::new();
    let mut current = String::new();
    let mut chars = directive.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ (':' | '\\')) => current.push(escaped),
                Some(other) => {
                    return Err(ProviderError::malformed(FIELD, format!("invalid escape `\\{other}`")));
                }
                None => return Err(ProviderError::malformed(FIELD, "dangling escape")),
            },
            ':' => slots.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    slots.push(current);
    Ok(slots)
}

fn parse_match(slot: &str) -> Result<Filter, ProviderError> {
    if slot.trim_start().starts_with('{') {
        return serde_json::from_str::<Filter>(slot)
            .map_err(|e| ProviderError::malformed(FIELD, format!("match filter: {e}")));
    }
    let mut filter = Filter::new();
    for pair in slot.split(',') {
        let (field, value) = pair
            .split_once(':')
            .ok_or_else(|| ProviderError::malformed(FIELD, format!("match pair `{pair}` needs `field:value`")))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(ProviderError::malformed(FIELD, "match pair with empty field"));
        }
        filter.insert(field.to_string(), parse_scalar(value.trim()));
    }
    Ok(filter)
}

/// Parse one compact population directive.
///
/// # Errors
///
/// `MalformedInput` on an empty path, more than four slots, a bad escape, an
/// unparseable match slot or a limit that is not a non-negative integer.
pub fn parse(directive: &str) -> Result<Population, ProviderError> {
    let slots = split_slots(directive)?;
    if slots.len() > 4 {
        return Err(ProviderError::malformed(
            FIELD,
            format!("directive `{directive}` has {} slots, at most 4 allowed", slots.len()),
        ));
    }
    let slot = |index: usize| slots.get(index).map(String::as_str).filter(|s| !s.is_empty());

    let path = slot(0)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ProviderError::malformed(FIELD, format!("directive `{directive}` has an empty path")))?;
    let limit = slot(3)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ProviderError::malformed(FIELD, format!("limit `{raw}` is not a non-negative integer")))
        })
        .transpose()?;

    Ok(Population {
        path: path.to_string(),
        select: slot(1).map(str::to_string),
        match_filter: slot(2).map(parse_match).transpose()?,
        limit,
    })
}

/// Parse a list of directives, keeping their order.
///
/// # Errors
///
/// The first malformed directive aborts the whole list.
pub fn parse_all<I, S>(directives: I) -> Result<Vec<Population>, ProviderError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    directives.into_iter().map(|d| parse(d.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_four_slots() {
        let population = parse(r"author:name email:status\:active:5").unwrap();
        assert_eq!(population.path, "author");
        assert_eq!(population.select.as_deref(), Some("name email"));
        assert_eq!(Value::Object(population.match_filter.unwrap()), json!({"status": "active"}));
        assert_eq!(population.limit, Some(5));
    }

    #[test]
    fn test_path_only() {
        assert_eq!(parse("author").unwrap(), Population::path("author"));
    }

    #[test]
    fn test_empty_slots_are_unset() {
        let population = parse("comments:::3").unwrap();
        assert_eq!(population.select, None);
        assert_eq!(population.match_filter, None);
        assert_eq!(population.limit, Some(3));
    }

    #[test]
    fn test_json_match_slot_and_scalar_values() {
        let population = parse(r#"comments::{"votes"\:{"$gte"\:3}}"#).unwrap();
        assert_eq!(Value::Object(population.match_filter.unwrap()), json!({"votes": {"$gte": 3}}));

        let population = parse(r"comments::approved\:true,score\:7").unwrap();
        assert_eq!(
            Value::Object(population.match_filter.unwrap()),
            json!({"approved": true, "score": 7})
        );
    }

    #[test]
    fn test_escaped_backslash() {
        let population = parse(r"notes:a\\b").unwrap();
        assert_eq!(population.select.as_deref(), Some(r"a\b"));
    }

    #[test]
    fn test_malformed_directives() {
        for bad in ["", ":name", "author:name::x", "author:a:b:c:d", r"author\x", "author\\", "a::nocolon"] {
            let err = parse(bad).unwrap_err();
            assert!(matches!(err, ProviderError::MalformedInput { .. }), "{bad:?} should be malformed");
        }
    }

    #[test]
    fn test_list_order_is_preserved() {
        let parsed = parse_all(["comments", "author:name"]).unwrap();
        let paths: Vec<&str> = parsed.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["comments", "author"]);
    }

    #[test]
    fn test_structured_entries() {
        let population =
            Population::from_value(json!({"path": "author", "select": "name", "match": {"active": true}, "limit": 1}))
                .unwrap();
        assert_eq!(population.limit, Some(1));
        assert!(Population::from_value(json!({"path": ""})).is_err());
        assert!(Population::from_value(json!(42)).is_err());
        assert_eq!(Population::from_value(json!("author")).unwrap(), Population::path("author"));
    }
}
