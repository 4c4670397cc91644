//! LanceDB-backed store for entity description embeddings.

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::Entity;

/// A similarity-search hit: entity id plus a cosine-space score where
/// higher is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Vector index over entity description embeddings.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredId>>;
}

pub struct LanceEmbeddingStore {
    connection: Connection,
    collection: String,
    table: RwLock<Option<Table>>,
}

impl LanceEmbeddingStore {
    /// Connect to (or create) a LanceDB database at the given URI. If the
    /// collection already exists it is opened so searches work without a
    /// fresh populate.
    pub async fn connect(uri: &str, collection: &str) -> Result<Self> {
        // Remote URIs carry a scheme; only local paths need the directory.
        if !uri.contains("://") {
            tokio::fs::create_dir_all(uri)
                .await
                .with_context(|| format!("Failed to create LanceDB directory {uri}"))?;
        }

        let connection = connect(uri)
            .execute()
            .await
            .with_context(|| format!("Failed to connect to LanceDB at {uri}"))?;

        let existing = connection
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;

        let table = if existing.iter().any(|name| name == collection) {
            Some(
                connection
                    .open_table(collection)
                    .execute()
                    .await
                    .with_context(|| format!("Failed to open collection '{collection}'"))?,
            )
        } else {
            None
        };

        Ok(Self {
            connection,
            collection: collection.to_string(),
            table: RwLock::new(table),
        })
    }

    /// Replace the collection with one row per entity that carries a
    /// description embedding. Returns the number of rows written.
    ///
    /// All embeddings must share one dimension; an empty entity set is an
    /// error, since a search engine without vectors cannot answer anything.
    pub async fn store_entity_description_embeddings(
        &self,
        entities: &[Entity],
    ) -> Result<usize> {
        let rows: Vec<&Entity> = entities
            .iter()
            .filter(|e| e.description_embedding.is_some())
            .collect();

        if rows.is_empty() {
            anyhow::bail!("No entity description embeddings to load");
        }

        let dim = rows[0]
            .description_embedding
            .as_ref()
            .map(|v| v.len())
            .unwrap_or(0);

        let mut ids = Vec::with_capacity(rows.len());
        let mut titles = Vec::with_capacity(rows.len());
        let mut texts = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * dim);

        for entity in &rows {
            let Some(embedding) = entity.description_embedding.as_ref() else {
                continue;
            };
            if embedding.len() != dim {
                anyhow::bail!(
                    "Embedding dimension mismatch for entity '{}': expected {}, got {}",
                    entity.title,
                    dim,
                    embedding.len()
                );
            }
            ids.push(entity.id.clone());
            titles.push(entity.title.clone());
            texts.push(entity.description.clone().unwrap_or_default());
            values.extend_from_slice(embedding);
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dim as i32,
                ),
                false,
            ),
        ]));

        let vectors = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dim as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )
        .context("Failed to build embedding column")?;

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(texts)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to build embedding record batch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        let table = self
            .connection
            .create_table(self.collection.as_str(), Box::new(reader))
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await
            .with_context(|| format!("Failed to create collection '{}'", self.collection))?;

        tracing::info!(
            collection = %self.collection,
            rows = rows.len(),
            dimension = dim,
            "Stored entity description embeddings"
        );

        *self.table.write().await = Some(table);
        Ok(rows.len())
    }

    async fn table(&self) -> Result<Table> {
        if let Some(table) = self.table.read().await.as_ref() {
            return Ok(table.clone());
        }
        let table = self
            .connection
            .open_table(self.collection.as_str())
            .execute()
            .await
            .with_context(|| format!("Collection '{}' is not populated", self.collection))?;
        *self.table.write().await = Some(table.clone());
        Ok(table)
    }
}

#[async_trait]
impl EmbeddingStore for LanceEmbeddingStore {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        let table = self.table().await?;

        let batches: Vec<RecordBatch> = table
            .query()
            .nearest_to(vector)
            .context("Invalid query vector")?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("Vector search failed")?
            .try_collect()
            .await
            .context("Failed to read vector search results")?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .context("Search result missing 'id' column")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .context("Search result missing '_distance' column")?;

            for row in 0..batch.num_rows() {
                hits.push(ScoredId {
                    id: ids.value(row).to_string(),
                    // cosine distance, flipped so larger means closer
                    score: 1.0 - distances.value(row),
                });
            }
        }
        Ok(hits)
    }
}
