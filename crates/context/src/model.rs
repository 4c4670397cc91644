use serde::{Deserialize, Serialize};

/// A node in the knowledge graph. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Human-readable short id from the indexing pipeline, if present.
    pub short_id: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub description: Option<String>,
    /// Embedding of the description, used for similarity search.
    pub description_embedding: Option<Vec<f32>>,
    /// Node degree in the graph.
    pub rank: f64,
    /// Communities this entity belongs to, across levels.
    pub community_ids: Vec<String>,
    pub text_unit_ids: Vec<String>,
}

/// A typed edge between two entities, referenced by title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub short_id: Option<String>,
    pub source: String,
    pub target: String,
    pub description: Option<String>,
    pub weight: f64,
    pub text_unit_ids: Vec<String>,
}

/// Summary document covering a cluster of entities at one granularity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: String,
    pub short_id: Option<String>,
    pub community_id: String,
    pub title: String,
    pub summary: String,
    pub full_content: String,
    pub rank: f64,
    pub level: i64,
}

/// A chunk of original source text that graph records were extracted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub short_id: Option<String>,
    pub text: String,
    pub n_tokens: Option<i64>,
    pub entity_ids: Vec<String>,
    pub relationship_ids: Vec<String>,
    pub document_ids: Vec<String>,
}

/// A claim about an entity, extracted alongside the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Covariate {
    pub id: String,
    pub short_id: Option<String>,
    /// Title of the entity this claim is about.
    pub subject_id: String,
    pub covariate_type: String,
    pub description: Option<String>,
    pub object_id: Option<String>,
    pub status: Option<String>,
    pub text_unit_ids: Vec<String>,
}
