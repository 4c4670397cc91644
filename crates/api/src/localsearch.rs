//! Wires the precomputed artifacts into a local search engine: reads the
//! parquet tables, populates the entity-description vector store, and
//! assembles the context builder and engine configuration.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use context::{
    read_covariates, read_entities, read_parquet, read_relationships, read_reports,
    read_text_units, LanceEmbeddingStore, TextEmbedder,
};
use query::{ChatModel, LocalContextBuilder, LocalContextParams, LocalSearch, ModelParams};

use crate::consts;
use crate::settings::Settings;

fn table_path(input_dir: &Path, table: &str) -> std::path::PathBuf {
    input_dir.join(format!("{table}.parquet"))
}

/// Load every artifact the local-search context needs. Fail-fast: any
/// missing table or schema mismatch propagates to the caller, and the load
/// is expected to run once at process startup.
pub async fn load_local_context(
    input_dir: &Path,
    lancedb_uri: &str,
    embedder: Arc<dyn TextEmbedder>,
    load_covariates: bool,
) -> Result<LocalContextBuilder> {
    // The node table carries community and degree data; the entity table
    // carries descriptions and their embeddings.
    let node_batches = read_parquet(&table_path(input_dir, consts::ENTITY_TABLE))?;
    let entity_batches = read_parquet(&table_path(input_dir, consts::ENTITY_EMBEDDING_TABLE))?;
    let entities = read_entities(&node_batches, &entity_batches, consts::COMMUNITY_LEVEL)?;

    // Load description embeddings into the LanceDB collection.
    let store =
        LanceEmbeddingStore::connect(lancedb_uri, consts::ENTITY_DESCRIPTION_COLLECTION).await?;
    let embeddings_stored = store.store_entity_description_embeddings(&entities).await?;

    let relationship_batches =
        read_parquet(&table_path(input_dir, consts::RELATIONSHIP_TABLE))?;
    let relationships = read_relationships(&relationship_batches)?;

    let report_batches = read_parquet(&table_path(input_dir, consts::COMMUNITY_REPORT_TABLE))?;
    let reports = read_reports(&report_batches, &node_batches, consts::COMMUNITY_LEVEL)?;

    let text_unit_batches = read_parquet(&table_path(input_dir, consts::TEXT_UNIT_TABLE))?;
    let text_units = read_text_units(&text_unit_batches)?;

    let covariates = if load_covariates {
        let covariate_batches = read_parquet(&table_path(input_dir, consts::COVARIATE_TABLE))?;
        Some(read_covariates(&covariate_batches)?)
    } else {
        None
    };

    tracing::info!(
        entities = entities.len(),
        embeddings = embeddings_stored,
        relationships = relationships.len(),
        reports = reports.len(),
        text_units = text_units.len(),
        "Loaded local search context"
    );

    Ok(LocalContextBuilder::new(
        entities,
        relationships,
        reports,
        text_units,
        covariates,
        Arc::new(store),
        embedder,
    ))
}

/// Assemble the search engine from a model handle and a prepared context
/// builder. Parameter values pass through unvalidated; bad ones surface as
/// downstream errors.
pub fn build_local_search_engine(
    llm: Arc<dyn ChatModel>,
    context_builder: LocalContextBuilder,
    settings: &Settings,
) -> LocalSearch {
    let context_params = LocalContextParams {
        max_context_tokens: settings.max_tokens,
        ..Default::default()
    };
    let model_params = ModelParams {
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };
    LocalSearch::new(
        llm,
        context_builder,
        context_params,
        model_params,
        "multiple paragraphs",
    )
}
