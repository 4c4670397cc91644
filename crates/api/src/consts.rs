//! Names of the artifact tables produced by the indexing pipeline, and the
//! community granularity the query side loads.

pub const ENTITY_TABLE: &str = "create_final_nodes";
pub const ENTITY_EMBEDDING_TABLE: &str = "create_final_entities";
pub const RELATIONSHIP_TABLE: &str = "create_final_relationships";
pub const COVARIATE_TABLE: &str = "create_final_covariates";
pub const COMMUNITY_REPORT_TABLE: &str = "create_final_community_reports";
pub const TEXT_UNIT_TABLE: &str = "create_final_text_units";

/// Granularity level at which entities and community reports are read.
/// Higher levels mean finer-grained communities.
pub const COMMUNITY_LEVEL: i64 = 2;

pub const ENTITY_DESCRIPTION_COLLECTION: &str = "entity_description_embeddings";
