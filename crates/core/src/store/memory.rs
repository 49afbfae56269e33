use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::traits::{DocumentFilter, DocumentStore, UpsertOutcome};
use crate::errors::StoreError;

type Collection = BTreeMap<String, Value>;

/// Process-local document store.
///
/// Collections are created on first write. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document in `collection`, ordered by key.
    pub async fn documents(&self, collection: &str) -> Vec<(String, Value)> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        if !document.is_object() {
            return Err(StoreError::NotAnObject {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }

        let mut collections = self.collections.write().await;
        let previous = collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<usize, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0))
    }

    async fn find_latest(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        sort_field: &str,
    ) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(None);
        };
        Ok(docs
            .values()
            .filter(|doc| filter.matches(doc))
            .max_by(|a, b| compare_field(a.get(sort_field), b.get(sort_field)))
            .cloned())
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
