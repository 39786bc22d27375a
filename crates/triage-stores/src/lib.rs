//! Vector store (C2) and graph store (C3) adapters.

mod backoff;
pub mod error;
pub mod graph_store;
pub mod vector_store;

#[cfg(feature = "test-support")]
pub mod fakes;

pub use error::{StoreError, StoreResult};
pub use graph_store::{GraphStoreAdapter, HttpGraphStore};
pub use vector_store::{HttpVectorStore, KeywordTimeWindowQuery, KnnFilter, VectorStoreAdapter};

#[cfg(feature = "test-support")]
pub use fakes::{InMemoryGraphStore, InMemoryVectorStore};
