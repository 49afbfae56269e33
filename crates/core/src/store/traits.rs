//! Document store interface.
//!
//! The sync service persists JSON documents into named collections, keyed by
//! a caller-chosen string. Upserts are atomic per key; nothing else is
//! assumed of the backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StoreError;

/// Whether an upsert created or replaced a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Equality filter on top-level document fields.
///
/// An empty filter matches every document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentFilter {
    fields: BTreeMap<String, Value>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

/// Storage interface for sync output.
///
/// # Method Naming Convention
///
/// - `upsert` - Insert or replace one document by key
/// - `count_documents` - Count documents matching a filter
/// - `find_latest` - Document with the greatest value of a sort field
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `document` under `key`, replacing any existing document.
    ///
    /// Documents must be JSON objects.
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Document stored under `key`, if any.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    async fn count_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<usize, StoreError>;

    /// Matching document with the greatest `sort_field`.
    ///
    /// Documents lacking the field sort first. Numbers compare numerically,
    /// strings lexicographically.
    async fn find_latest(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        sort_field: &str,
    ) -> Result<Option<Value>, StoreError>;
}
