//! Loading of precomputed knowledge-graph artifacts: parquet table
//! readers, indexer adapters, the text-embedder client, and the LanceDB
//! entity-description embedding store.

pub mod adapters;
pub mod embedder;
pub mod model;
pub mod store;
pub mod tables;

pub use adapters::{
    read_covariates, read_entities, read_relationships, read_reports, read_text_units,
};
pub use embedder::{OllamaEmbedder, TextEmbedder};
pub use model::{CommunityReport, Covariate, Entity, Relationship, TextUnit};
pub use store::{EmbeddingStore, LanceEmbeddingStore, ScoredId};
pub use tables::read_parquet;
