//! Abstract contract of the similarity-search service.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Free-form record attributes. Rollcall only ever writes string values.
pub type Metadata = serde_json::Map<String, Value>;

/// Similarity metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    #[serde(rename = "dotproduct")]
    DotProduct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// One stored vector with its id and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One nearest-neighbour hit. Higher `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ScoredMatch {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A page of record ids plus the token for the next page, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdPage {
    pub ids: Vec<String>,
    pub next: Option<String>,
}

/// Conjunction of `field == value` predicates over record metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: BTreeMap<String, String>,
}

impl Filter {
    pub fn eq(field: &str, value: &str) -> Self {
        Self::default().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: &str, value: &str) -> Self {
        self.clauses.insert(field.to_string(), value.to_string());
        self
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| metadata.get(field).and_then(Value::as_str) == Some(value))
    }

    /// Mongo-style filter document: `{"field": {"$eq": "value"}, ...}`.
    pub fn to_json(&self) -> Value {
        let clauses: serde_json::Map<String, Value> = self
            .clauses
            .iter()
            .map(|(field, value)| (field.clone(), json!({ "$eq": value })))
            .collect();
        Value::Object(clauses)
    }
}

/// Operations the vector service must provide. Every call is synchronous and
/// either succeeds or reports a [`StoreError`]; nothing is retried.
pub trait VectorService: Send + Sync {
    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError>;

    /// Up to `top_k` matches ordered by descending score.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredMatch>, StoreError>;

    fn upsert(&self, collection: &str, records: &[Record]) -> Result<(), StoreError>;

    /// Replace the metadata of `id`, leaving its vector alone.
    fn update(&self, collection: &str, id: &str, metadata: &Metadata) -> Result<(), StoreError>;

    fn delete(&self, collection: &str, filter: &Filter) -> Result<(), StoreError>;

    /// Records for whichever of `ids` exist.
    fn fetch(&self, collection: &str, ids: &[String]) -> Result<BTreeMap<String, Record>, StoreError>;

    fn list_ids(
        &self,
        collection: &str,
        pagination_token: Option<&str>,
        limit: usize,
    ) -> Result<IdPage, StoreError>;
}
