//! In-process vector service.
//!
//! Exact brute-force search over every record in a collection. Used by the
//! workspace tests and for offline runs; it can also be told to fail so the
//! no-rollback paths can be exercised.

use crate::error::StoreError;
use crate::service::{CollectionSpec, Filter, IdPage, Metadata, Metric, Record, ScoredMatch, VectorService};
use rollcall_core::types::{cosine_similarity, euclidean_distance};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

struct Collection {
    spec: CollectionSpec,
    records: BTreeMap<String, Record>,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    /// Upsert calls still allowed before every further upsert fails.
    upserts_before_failure: Option<usize>,
    unavailable: bool,
}

#[derive(Default)]
pub struct MemoryService {
    state: Mutex<State>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` more upsert calls succeed, then fail all later ones.
    pub fn fail_upserts_after(&self, n: usize) {
        self.lock().upserts_before_failure = Some(n);
    }

    /// Make every call fail as if the service were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Number of records currently held by `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }

    /// Every record of `collection`, ordered by id.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call; the maps are still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn guard(&self, op: &'static str) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Transport {
                op,
                message: "memory service marked unavailable".into(),
            });
        }
        Ok(state)
    }
}

fn collection<'a>(state: &'a mut State, name: &str) -> Result<&'a mut Collection, StoreError> {
    state
        .collections
        .get_mut(name)
        .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
}

fn check_dimension(spec: &CollectionSpec, actual: usize) -> Result<(), StoreError> {
    if spec.dimension != actual {
        return Err(StoreError::DimensionMismatch {
            expected: spec.dimension,
            actual,
        });
    }
    Ok(())
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        // Map distance into (0, 1] so that higher still means closer.
        Metric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
        Metric::DotProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
    }
}

impl VectorService for MemoryService {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let state = self.guard("list_collections")?;
        Ok(state.collections.keys().cloned().collect())
    }

    fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let mut state = self.guard("create_collection")?;
        state
            .collections
            .entry(spec.name.clone())
            .or_insert_with(|| Collection {
                spec: spec.clone(),
                records: BTreeMap::new(),
            });
        Ok(())
    }

    fn query(
        &self,
        collection_name: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredMatch>, StoreError> {
        let mut state = self.guard("query")?;
        let coll = collection(&mut state, collection_name)?;
        check_dimension(&coll.spec, vector.len())?;

        let mut matches: Vec<ScoredMatch> = coll
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| ScoredMatch {
                id: r.id.clone(),
                score: score(coll.spec.metric, vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    fn upsert(&self, collection_name: &str, records: &[Record]) -> Result<(), StoreError> {
        let mut state = self.guard("upsert")?;
        let budget = state.upserts_before_failure;
        match budget {
            Some(0) => {
                return Err(StoreError::Service {
                    op: "upsert",
                    message: "injected failure".into(),
                })
            }
            Some(n) => state.upserts_before_failure = Some(n - 1),
            None => {}
        }

        let coll = collection(&mut state, collection_name)?;
        for record in records {
            check_dimension(&coll.spec, record.values.len())?;
        }
        for record in records {
            coll.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn update(&self, collection_name: &str, id: &str, metadata: &Metadata) -> Result<(), StoreError> {
        let mut state = self.guard("update")?;
        let coll = collection(&mut state, collection_name)?;
        match coll.records.get_mut(id) {
            Some(record) => {
                record.metadata = metadata.clone();
                Ok(())
            }
            None => Err(StoreError::Service {
                op: "update",
                message: format!("no record with id {id}"),
            }),
        }
    }

    fn delete(&self, collection_name: &str, filter: &Filter) -> Result<(), StoreError> {
        let mut state = self.guard("delete")?;
        let coll = collection(&mut state, collection_name)?;
        coll.records.retain(|_, r| !filter.matches(&r.metadata));
        Ok(())
    }

    fn fetch(&self, collection_name: &str, ids: &[String]) -> Result<BTreeMap<String, Record>, StoreError> {
        let mut state = self.guard("fetch")?;
        let coll = collection(&mut state, collection_name)?;
        Ok(ids
            .iter()
            .filter_map(|id| coll.records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    fn list_ids(
        &self,
        collection_name: &str,
        pagination_token: Option<&str>,
        limit: usize,
    ) -> Result<IdPage, StoreError> {
        let mut state = self.guard("list_ids")?;
        let coll = collection(&mut state, collection_name)?;

        let mut remaining = coll
            .records
            .keys()
            .filter(|id| pagination_token.map_or(true, |after| id.as_str() > after));
        let ids: Vec<String> = remaining.by_ref().take(limit.max(1)).cloned().collect();
        let next = if remaining.next().is_some() {
            ids.last().cloned()
        } else {
            None
        };
        Ok(IdPage { ids, next })
    }
}
