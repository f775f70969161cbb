//! The face and attendance collections.

use crate::error::StoreError;
use crate::records::FaceEntry;
use crate::service::{CollectionSpec, Filter, Metadata, Metric, Record, ScoredMatch, VectorService};
use std::sync::Arc;

/// Records per upsert call; keeps request bodies under service payload limits.
pub const UPSERT_BATCH_SIZE: usize = 32;
/// Ids per fetch call.
pub const FETCH_BATCH_SIZE: usize = 100;
/// Ids per list page.
pub const LIST_PAGE_SIZE: usize = 100;
/// Largest `top_k` the service accepts.
pub const MAX_TOP_K: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Face,
    Attendance,
}

/// Names and shared dimension of the two collections.
#[derive(Debug, Clone)]
pub struct Collections {
    pub face: String,
    pub attendance: String,
    pub dimension: usize,
}

impl Collections {
    fn specs(&self) -> [CollectionSpec; 2] {
        [
            CollectionSpec {
                name: self.face.clone(),
                dimension: self.dimension,
                metric: Metric::Cosine,
            },
            CollectionSpec {
                name: self.attendance.clone(),
                dimension: self.dimension,
                metric: Metric::Euclidean,
            },
        ]
    }
}

/// Client for both collections on one vector service.
#[derive(Clone)]
pub struct VectorStore {
    service: Arc<dyn VectorService>,
    collections: Collections,
}

impl VectorStore {
    pub fn new(service: Arc<dyn VectorService>, collections: Collections) -> Self {
        Self {
            service,
            collections,
        }
    }

    /// Build a store and make sure both collections exist.
    pub fn connect(service: Arc<dyn VectorService>, collections: Collections) -> Result<Self, StoreError> {
        let store = Self::new(service, collections);
        store.ensure_collections()?;
        Ok(store)
    }

    /// Create whichever of the two collections is missing. Safe to repeat.
    pub fn ensure_collections(&self) -> Result<(), StoreError> {
        let existing = self.service.list_collections()?;
        for spec in self.collections.specs() {
            if existing.contains(&spec.name) {
                tracing::debug!(collection = %spec.name, "collection present");
                continue;
            }
            tracing::info!(collection = %spec.name, dimension = spec.dimension, metric = ?spec.metric, "creating collection");
            self.service.create_collection(&spec)?;
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.collections.dimension
    }

    pub fn collection_name(&self, kind: CollectionKind) -> &str {
        match kind {
            CollectionKind::Face => &self.collections.face,
            CollectionKind::Attendance => &self.collections.attendance,
        }
    }

    /// Constant vector for queries and records whose vector is irrelevant.
    pub fn placeholder_vector(&self) -> Vec<f32> {
        vec![1.0; self.collections.dimension]
    }

    fn check_dimension(&self, actual: usize) -> Result<(), StoreError> {
        if actual != self.collections.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.collections.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Write face samples under fresh ids, [`UPSERT_BATCH_SIZE`] at a time.
    ///
    /// Succeeds only if every batch is written. A failure part-way leaves the
    /// earlier batches in place; there is no rollback.
    pub fn upsert_face_batch(&self, entries: Vec<FaceEntry>) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        for entry in &entries {
            self.check_dimension(entry.vector.len())?;
        }

        let total = entries.len();
        let records: Vec<Record> = entries.into_iter().map(FaceEntry::into_record).collect();
        let collection = self.collection_name(CollectionKind::Face);

        for (i, batch) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            if let Err(e) = self.service.upsert(collection, batch) {
                tracing::error!(
                    collection,
                    batch = i,
                    written = i * UPSERT_BATCH_SIZE,
                    total,
                    error = %e,
                    "face upload failed part-way"
                );
                return Err(e);
            }
        }

        tracing::info!(collection, count = total, "uploaded face vectors");
        Ok(total)
    }

    /// Write records to one collection in a single call.
    pub fn upsert(&self, kind: CollectionKind, records: &[Record]) -> Result<(), StoreError> {
        for record in records {
            self.check_dimension(record.values.len())?;
        }
        self.service.upsert(self.collection_name(kind), records)
    }

    /// Up to `top_k` nearest records by descending score. An empty result is
    /// not an error.
    pub fn query_nearest(
        &self,
        kind: CollectionKind,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredMatch>, StoreError> {
        self.check_dimension(vector.len())?;
        self.service
            .query(self.collection_name(kind), vector, top_k.min(MAX_TOP_K), filter)
    }

    pub fn fetch_by_id(&self, kind: CollectionKind, id: &str) -> Result<Option<Record>, StoreError> {
        let mut found = self
            .service
            .fetch(self.collection_name(kind), &[id.to_string()])?;
        Ok(found.remove(id))
    }

    /// Fetch every existing record among `ids`, [`FETCH_BATCH_SIZE`] per call.
    pub fn fetch_many(&self, kind: CollectionKind, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let collection = self.collection_name(kind);
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(FETCH_BATCH_SIZE) {
            let mut found = self.service.fetch(collection, chunk)?;
            records.extend(chunk.iter().filter_map(|id| found.remove(id)));
        }
        Ok(records)
    }

    pub fn update_metadata(&self, kind: CollectionKind, id: &str, metadata: &Metadata) -> Result<(), StoreError> {
        self.service.update(self.collection_name(kind), id, metadata)
    }

    pub fn delete_by_filter(&self, kind: CollectionKind, filter: &Filter) -> Result<(), StoreError> {
        let collection = self.collection_name(kind);
        self.service.delete(collection, filter)?;
        tracing::info!(collection, ?filter, "deleted matching records");
        Ok(())
    }

    /// Every id in a collection, following pagination to the end.
    pub fn list_all_ids(&self, kind: CollectionKind) -> Result<Vec<String>, StoreError> {
        let collection = self.collection_name(kind);
        let mut ids = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.service.list_ids(collection, token.as_deref(), LIST_PAGE_SIZE)?;
            ids.extend(page.ids);
            match page.next {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                _ => break,
            }
        }
        Ok(ids)
    }

    /// Every record in a collection.
    pub fn scan_all(&self, kind: CollectionKind) -> Result<Vec<Record>, StoreError> {
        let ids = self.list_all_ids(kind)?;
        self.fetch_many(kind, &ids)
    }
}
