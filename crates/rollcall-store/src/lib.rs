//! rollcall-store — Client for the external similarity-search service.
//!
//! [`VectorStore`] owns the face and attendance collections and is the only
//! part of rollcall that talks to the network. The wire protocol sits behind
//! the [`VectorService`] trait: [`PineconeService`] speaks the Pinecone REST
//! API, [`MemoryService`] keeps everything in process.

pub mod error;
pub mod memory;
pub mod pinecone;
pub mod records;
pub mod service;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryService;
pub use pinecone::{PineconeConfig, PineconeService};
pub use records::{AttendanceRecord, FaceEntry};
pub use service::{CollectionSpec, Filter, IdPage, Metadata, Metric, Record, ScoredMatch, VectorService};
pub use store::{CollectionKind, Collections, VectorStore};
