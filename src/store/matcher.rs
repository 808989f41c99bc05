//! Document-level helpers for stores that evaluate queries in process: filter
//! matching, ordering, projection and update operators.
//!
//! Supported filter forms:
//!
//! ```text
//! {"status": "open"}                      equality (array fields match on containment)
//! {"author.name": "Ada"}                  dotted paths
//! {"priority": {"$gte": 3, "$lt": 8}}     $eq $ne $gt $gte $lt $lte $in $nin $exists
//! {"$or": [{"a": 1}, {"b": 2}]}           $and / $or
//! ```

use serde_json::{Number, Value};
use std::cmp::Ordering;

use super::{Document, Filter, StoreError};
use crate::query::{SortDirection, SortSpec};

/// Resolve a dotted path inside a document. Numeric segments index into arrays.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// # Errors
///
/// Fails when an intermediate segment holds a non-object value.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), StoreError> {
    let Some((parent, leaf)) = path.rsplit_once('.') else {
        doc.insert(path.to_string(), value);
        return Ok(());
    };
    let mut current = doc;
    for segment in parent.split('.') {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        current = slot.as_object_mut().ok_or_else(|| {
            StoreError::InvalidUpdate(format!("cannot create field `{path}`: `{segment}` is not an object"))
        })?;
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

fn remove_path(doc: &mut Document, path: &str) {
    let Some((parent, leaf)) = path.rsplit_once('.') else {
        doc.shift_remove(path);
        return;
    };
    let mut current = doc;
    for segment in parent.split('.') {
        match current.get_mut(segment).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return,
        }
    }
    current.shift_remove(leaf);
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values: first by type, then by value. Missing sorts as null.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(Some(l), Some(r)))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => {
            Value::Object(x.clone()).to_string().cmp(&Value::Object(y.clone()).to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x.cmp(&y);
    }
    let x = x.as_f64().unwrap_or(f64::NAN);
    let y = y.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y).is_eq(),
        _ => a == b,
    }
}

/// Equality as a query sees it: arrays match when any element is equal, and a
/// null criterion matches a missing field.
fn equality_match(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn ordered_match(field: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| {
        type_rank(value) == type_rank(bound) && accept(compare_values(Some(value), Some(bound)))
    };
    match field {
        Some(Value::Array(items)) if !bound.is_array() => items.iter().any(check),
        Some(value) => check(value),
        None => false,
    }
}

fn operator_match(field: Option<&Value>, operators: &Filter) -> Result<bool, StoreError> {
    for (operator, argument) in operators {
        let matched = match operator.as_str() {
            "$eq" => equality_match(field, argument),
            "$ne" => !equality_match(field, argument),
            "$gt" => ordered_match(field, argument, Ordering::is_gt),
            "$gte" => ordered_match(field, argument, Ordering::is_ge),
            "$lt" => ordered_match(field, argument, Ordering::is_lt),
            "$lte" => ordered_match(field, argument, Ordering::is_le),
            "$in" | "$nin" => {
                let candidates = argument.as_array().ok_or_else(|| {
                    StoreError::Other(format!("{operator} needs an array argument"))
                })?;
                let found = candidates.iter().any(|c| equality_match(field, c));
                if operator == "$in" { found } else { !found }
            }
            "$exists" => field.is_some() == truthy(argument),
            other => return Err(StoreError::Other(format!("unknown query operator `{other}`"))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(operator: &str, value: &'a Value) -> Result<Vec<&'a Filter>, StoreError> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_object).collect::<Vec<_>>())
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::Other(format!("{operator} needs a non-empty array of filters")))
}

/// Whether `doc` satisfies every criterion in `filter`. An empty filter matches everything.
///
/// # Errors
///
/// Unknown operators and malformed operator arguments are rejected.
pub fn matches(doc: &Document, filter: &Filter) -> Result<bool, StoreError> {
    for (key, criterion) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, criterion)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, criterion)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            _ => match criterion.as_object() {
                Some(operators) if is_operator_object(criterion) => {
                    operator_match(get_path(doc, key), operators)?
                }
                _ => equality_match(get_path(doc, key), criterion),
            },
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Stable sort; earlier sort fields take precedence.
pub fn sort_documents(docs: &mut [Document], sort: &SortSpec) {
    docs.sort_by(|a, b| {
        sort.fields()
            .map(|(field, direction)| {
                let ord = compare_values(get_path(a, field), get_path(b, field));
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Apply a space-separated field selection. `-field` excludes a field; when only
/// exclusions are given every other field is kept. `_id` stays unless `-_id` is listed.
#[must_use]
pub fn project(doc: &Document, select: &str) -> Document {
    let tokens: Vec<&str> = select.split_whitespace().collect();
    let includes: Vec<&str> = tokens.iter().copied().filter(|t| !t.starts_with('-')).collect();
    let excludes: Vec<&str> = tokens.iter().filter_map(|t| t.strip_prefix('-')).collect();

    if includes.is_empty() {
        let mut projected = doc.clone();
        for field in excludes {
            remove_path(&mut projected, field);
        }
        return projected;
    }

    let mut projected = Document::new();
    if !excludes.contains(&"_id")
        && let Some(id) = doc.get("_id")
    {
        projected.insert("_id".to_string(), id.clone());
    }
    for field in includes {
        if let Some(value) = get_path(doc, field) {
            // `projected` only holds objects along included paths
            let _ = set_path(&mut projected, field, value.clone());
        }
    }
    projected
}

fn increment(current: Option<&Value>, by: &Value, path: &str) -> Result<Value, StoreError> {
    let not_numeric = || StoreError::InvalidUpdate(format!("$inc on `{path}` needs numeric values"));
    let by = by.as_number().ok_or_else(not_numeric)?;
    let current = match current {
        None | Some(Value::Null) => return Ok(Value::Number(by.clone())),
        Some(value) => value.as_number().ok_or_else(not_numeric)?,
    };
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64())
        && let Some(sum) = a.checked_add(b)
    {
        return Ok(Value::from(sum));
    }
    let sum = current.as_f64().unwrap_or_default() + by.as_f64().unwrap_or_default();
    Number::from_f64(sum).map(Value::Number).ok_or_else(not_numeric)
}

/// Apply an update document in place and report whether anything changed.
///
/// Plain keys are treated as `$set`. Supported operators: `$set`, `$unset`, `$inc`, `$push`.
///
/// # Errors
///
/// Mixing plain and operator keys, unknown operators, type mismatches and changes
/// to `_id` are rejected. The document may be partially modified on error, so callers
/// should patch a copy.
pub fn apply_patch(doc: &mut Document, patch: &Document) -> Result<bool, StoreError> {
    let operator_keys = patch.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys != 0 && operator_keys != patch.len() {
        return Err(StoreError::InvalidUpdate(
            "update mixes operators and plain fields".to_string(),
        ));
    }

    let before = doc.clone();
    if operator_keys == 0 {
        for (path, value) in patch {
            set_path(doc, path, value.clone())?;
        }
    } else {
        for (operator, arguments) in patch {
            let arguments = arguments.as_object().ok_or_else(|| {
                StoreError::InvalidUpdate(format!("{operator} needs an object argument"))
            })?;
            for (path, value) in arguments {
                match operator.as_str() {
                    "$set" => set_path(doc, path, value.clone())?,
                    "$unset" => remove_path(doc, path),
                    "$inc" => {
                        let next = increment(get_path(doc, path), value, path)?;
                        set_path(doc, path, next)?;
                    }
                    "$push" => match get_path(doc, path) {
                        None | Some(Value::Null) => set_path(doc, path, Value::Array(vec![value.clone()]))?,
                        Some(Value::Array(items)) => {
                            let mut items = items.clone();
                            items.push(value.clone());
                            set_path(doc, path, Value::Array(items))?;
                        }
                        Some(_) => {
                            return Err(StoreError::InvalidUpdate(format!(
                                "$push on `{path}` needs an array field"
                            )));
                        }
                    },
                    other => {
                        return Err(StoreError::InvalidUpdate(format!("unknown update operator `{other}`")));
                    }
                }
            }
        }
    }

    if before.get("_id") != doc.get("_id") {
        return Err(StoreError::InvalidUpdate("the `_id` field is immutable".to_string()));
    }
    Ok(before != *doc)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
        Value::String(_) | Value::Array(_) | Value::Object(_) => true,
    }
}

/// Starting document for an upsert: the filter's plain equality criteria.
///
/// # Errors
///
/// Fails when two criteria claim the same path, such as `a` and `a.b`.
pub fn seed_from_filter(filter: &Filter) -> Result<Document, StoreError> {
    let mut seed = Document::new();
    for (key, criterion) in filter {
        if key.starts_with('$') {
            continue;
        }
        let value = if is_operator_object(criterion) {
            match criterion.get("$eq") {
                Some(value) => value.clone(),
                None => continue,
            }
        } else {
            criterion.clone()
        };
        set_path(&mut seed, key, value)?;
    }
    Ok(seed)
}
