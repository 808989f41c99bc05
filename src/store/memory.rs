use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::matcher::{apply_patch, get_path, matches, project, seed_from_filter, set_path, sort_documents};
use super::{
    Collection, DeleteResult, Document, Filter, FindOptions, StoreError, UpdateOptions, UpdateResult,
};
use crate::query::Population;
use crate::schema::Schema;

const ID_FIELD: &str = "_id";

/// An in-process document collection.
///
/// Documents keep insertion order. Generated ids are UUID v4 strings stored under `_id`.
/// Relations for population are registered per path and point at other collections;
/// the field at that path holds one id or an array of ids.
///
/// ```rust
/// use docprovider::store::{Collection, MemoryCollection};
/// use std::sync::Arc;
///
/// let users = Arc::new(MemoryCollection::new("users"));
/// let posts = MemoryCollection::new("posts").with_relation("author", users.clone());
/// assert_eq!(posts.name(), "posts");
/// ```
#[derive(Debug, Default)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    schema: Schema,
    relations: HashMap<String, Arc<MemoryCollection>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Defaults and required fields enforced on validated inserts.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Register the collection that ids stored at `path` refer to.
    #[must_use]
    pub fn with_relation(mut self, path: impl Into<String>, target: Arc<Self>) -> Self {
        self.relations.insert(path.into(), target);
        self
    }

    /// Seed documents without validation. Missing ids are generated.
    #[must_use]
    pub fn with_documents(mut self, documents: impl IntoIterator<Item = Document>) -> Self {
        let store = self.documents.get_mut();
        store.extend(documents.into_iter().map(with_id));
        self
    }

    /// Copy of every stored document, in insertion order.
    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    async fn matching(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let mut found = Vec::new();
        for doc in documents.iter() {
            if matches(doc, filter)? {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }

    fn prepare(&self, mut doc: Document, validate: bool) -> Result<Document, StoreError> {
        if validate {
            self.schema.apply(&mut doc)?;
        }
        Ok(with_id(doc))
    }

    fn upsert_document(&self, filter: &Filter, patch: &Document) -> Result<Document, StoreError> {
        let mut doc = seed_from_filter(filter)?;
        apply_patch(&mut doc, patch)?;
        self.schema.apply_defaults(&mut doc);
        Ok(with_id(doc))
    }

    async fn populate(
        &self,
        mut docs: Vec<Document>,
        populations: &[Population],
    ) -> Result<Vec<Document>, StoreError> {
        for population in populations {
            let target = self
                .relations
                .get(&population.path)
                .ok_or_else(|| StoreError::UnknownRelation(population.path.clone()))?;
            let related = target.documents.read().await.clone();
            for doc in &mut docs {
                let expanded = match get_path(doc, &population.path) {
                    None | Some(Value::Null) => continue,
                    Some(Value::Array(ids)) => {
                        let mut items = Vec::new();
                        for id in ids {
                            if let Some(found) = resolve(&related, id, population)? {
                                items.push(found);
                            }
                        }
                        if let Some(limit) = population.limit {
                            items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                        }
                        Value::Array(items)
                    }
                    Some(id) => resolve(&related, id, population)?.unwrap_or(Value::Null),
                };
                set_path(doc, &population.path, expanded)?;
            }
        }
        Ok(docs)
    }
}

fn with_id(mut doc: Document) -> Document {
    if doc.get(ID_FIELD).is_none_or(Value::is_null) {
        doc.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    doc
}

fn document_id(doc: &Document) -> String {
    doc.get(ID_FIELD).map(Value::to_string).unwrap_or_default()
}

/// Look up one referenced document and refine it with the population's match and select.
fn resolve(related: &[Document], id: &Value, population: &Population) -> Result<Option<Value>, StoreError> {
    let Some(found) = related.iter().find(|d| d.get(ID_FIELD) == Some(id)) else {
        return Ok(None);
    };
    if let Some(filter) = &population.match_filter
        && !matches(found, filter)?
    {
        return Ok(None);
    }
    let refined = match &population.select {
        Some(select) => project(found, select),
        None => found.clone(),
    };
    Ok(Some(Value::Object(refined)))
}

fn first_match(documents: &[Document], filter: &Filter) -> Result<Option<usize>, StoreError> {
    for (index, doc) in documents.iter().enumerate() {
        if matches(doc, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn ensure_unique(existing: &[Document], incoming: &[Document]) -> Result<(), StoreError> {
    let mut seen: HashSet<String> = existing.iter().map(document_id).collect();
    for doc in incoming {
        let id = document_id(doc);
        if !seen.insert(id.clone()) {
            return Err(StoreError::DuplicateKey(format!("_id {id}")));
        }
    }
    Ok(())
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.matching(filter).await?;
        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, sort);
        }
        let skip = options.skip.map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
        let limit = options.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let window: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();
        self.populate(window, &options.populations).await
    }

    async fn find_one(
        &self,
        filter: &Filter,
        populations: &[Population],
    ) -> Result<Option<Document>, StoreError> {
        let first = {
            let documents = self.documents.read().await;
            first_match(&documents, filter)?.map(|index| documents[index].clone())
        };
        match first {
            Some(doc) => Ok(self.populate(vec![doc], populations).await?.pop()),
            None => Ok(None),
        }
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let documents = self.documents.read().await;
        let mut total = 0;
        for doc in documents.iter() {
            if matches(doc, filter)? {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn insert_one(&self, doc: Document, validate: bool) -> Result<Document, StoreError> {
        let doc = self.prepare(doc, validate)?;
        let mut documents = self.documents.write().await;
        ensure_unique(&documents, std::slice::from_ref(&doc))?;
        documents.push(doc.clone());
        Ok(doc)
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, StoreError> {
        let docs = docs
            .into_iter()
            .map(|doc| self.prepare(doc, true))
            .collect::<Result<Vec<_>, _>>()?;
        let mut documents = self.documents.write().await;
        ensure_unique(&documents, &docs)?;
        documents.extend(docs.iter().cloned());
        Ok(docs)
    }

    async fn update_one(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError> {
        let mut documents = self.documents.write().await;
        if let Some(index) = first_match(&documents, filter)? {
            let mut updated = documents[index].clone();
            apply_patch(&mut updated, patch)?;
            documents[index] = updated.clone();
            return Ok(Some(updated));
        }
        if !options.upsert {
            return Ok(None);
        }
        let created = self.upsert_document(filter, patch)?;
        ensure_unique(&documents, std::slice::from_ref(&created))?;
        documents.push(created.clone());
        Ok(Some(created))
    }

    async fn update_many(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError> {
        let mut documents = self.documents.write().await;
        let mut pending = Vec::new();
        for (index, doc) in documents.iter().enumerate() {
            if matches(doc, filter)? {
                let mut updated = doc.clone();
                let changed = apply_patch(&mut updated, patch)?;
                pending.push((index, updated, changed));
            }
        }

        if pending.is_empty() && options.upsert {
            let created = self.upsert_document(filter, patch)?;
            ensure_unique(&documents, std::slice::from_ref(&created))?;
            let upserted_id = created.get(ID_FIELD).cloned();
            documents.push(created);
            return Ok(UpdateResult {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0,
                upserted_id,
            });
        }

        let matched_count = pending.len() as u64;
        let mut modified_count = 0;
        for (index, updated, changed) in pending {
            if changed {
                modified_count += 1;
            }
            documents[index] = updated;
        }
        Ok(UpdateResult {
            acknowledged: true,
            matched_count,
            modified_count,
            upserted_id: None,
        })
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let mut documents = self.documents.write().await;
        match first_match(&documents, filter)? {
            Some(index) => {
                documents.remove(index);
                Ok(DeleteResult::deleted(1))
            }
            None => Ok(DeleteResult::deleted(0)),
        }
    }

    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let mut documents = self.documents.write().await;
        let keep = documents
            .iter()
            .map(|doc| matches(doc, filter).map(|hit| !hit))
            .collect::<Result<Vec<bool>, _>>()?;
        let before = documents.len();
        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));
        Ok(DeleteResult::deleted((before - documents.len()) as u64))
    }
}
