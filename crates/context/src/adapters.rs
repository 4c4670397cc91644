//! Converters from indexing-pipeline artifact tables into domain records.
//!
//! These mirror the shape of the pipeline outputs: the node table carries
//! community/level/degree data, the entity table carries descriptions and
//! their embeddings, and the two are joined by entity id.

use anyhow::Result;
use arrow_array::RecordBatch;
use std::collections::{HashMap, HashSet};

use crate::model::{CommunityReport, Covariate, Entity, Relationship, TextUnit};
use crate::tables::{float_list, numeric_value, required_string, string_list, string_value};

struct NodeAgg {
    title: String,
    rank: f64,
    community_ids: Vec<String>,
}

/// Join the node and entity tables into entity records, keeping only nodes
/// at or below `community_level`.
///
/// Node rows are aggregated per entity id (max degree, union of community
/// ids) before the join; first-appearance order is preserved.
pub fn read_entities(
    nodes: &[RecordBatch],
    entities: &[RecordBatch],
    community_level: i64,
) -> Result<Vec<Entity>> {
    let mut order: Vec<String> = Vec::new();
    let mut aggregated: HashMap<String, NodeAgg> = HashMap::new();

    for batch in nodes {
        for row in 0..batch.num_rows() {
            let level = numeric_value(batch, "level", row).unwrap_or(0.0) as i64;
            if level > community_level {
                continue;
            }

            let id = required_string(batch, "id", row)?;
            let title = required_string(batch, "title", row)?;
            let rank = numeric_value(batch, "degree", row).unwrap_or(0.0);
            let community = string_value(batch, "community", row);

            let agg = aggregated.entry(id.clone()).or_insert_with(|| {
                order.push(id.clone());
                NodeAgg {
                    title,
                    rank: 0.0,
                    community_ids: Vec::new(),
                }
            });
            agg.rank = agg.rank.max(rank);
            if let Some(community) = community {
                if !agg.community_ids.contains(&community) {
                    agg.community_ids.push(community);
                }
            }
        }
    }

    struct EntityRow {
        short_id: Option<String>,
        entity_type: Option<String>,
        description: Option<String>,
        description_embedding: Option<Vec<f32>>,
        text_unit_ids: Vec<String>,
    }

    let mut details: HashMap<String, EntityRow> = HashMap::new();
    for batch in entities {
        for row in 0..batch.num_rows() {
            let id = required_string(batch, "id", row)?;
            details.insert(
                id,
                EntityRow {
                    short_id: string_value(batch, "human_readable_id", row),
                    entity_type: string_value(batch, "type", row),
                    description: string_value(batch, "description", row),
                    description_embedding: float_list(batch, "description_embedding", row),
                    text_unit_ids: string_list(batch, "text_unit_ids", row),
                },
            );
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for id in order {
        let agg = aggregated.remove(&id).unwrap_or(NodeAgg {
            title: id.clone(),
            rank: 0.0,
            community_ids: Vec::new(),
        });
        let detail = details.remove(&id);
        let (short_id, entity_type, description, description_embedding, text_unit_ids) =
            match detail {
                Some(d) => (
                    d.short_id,
                    d.entity_type,
                    d.description,
                    d.description_embedding,
                    d.text_unit_ids,
                ),
                None => (None, None, None, None, Vec::new()),
            };
        out.push(Entity {
            id,
            short_id,
            title: agg.title,
            entity_type,
            description,
            description_embedding,
            rank: agg.rank,
            community_ids: agg.community_ids,
            text_unit_ids,
        });
    }
    Ok(out)
}

/// One relationship record per row; a missing weight defaults to 1.0.
pub fn read_relationships(batches: &[RecordBatch]) -> Result<Vec<Relationship>> {
    let mut out = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            out.push(Relationship {
                id: required_string(batch, "id", row)?,
                short_id: string_value(batch, "human_readable_id", row),
                source: required_string(batch, "source", row)?,
                target: required_string(batch, "target", row)?,
                description: string_value(batch, "description", row),
                weight: numeric_value(batch, "weight", row).unwrap_or(1.0),
                text_unit_ids: string_list(batch, "text_unit_ids", row),
            });
        }
    }
    Ok(out)
}

/// Community reports for the communities that survive the same node-level
/// filter used by [`read_entities`], at or below `community_level`.
pub fn read_reports(
    reports: &[RecordBatch],
    nodes: &[RecordBatch],
    community_level: i64,
) -> Result<Vec<CommunityReport>> {
    let mut communities: HashSet<String> = HashSet::new();
    for batch in nodes {
        for row in 0..batch.num_rows() {
            let level = numeric_value(batch, "level", row).unwrap_or(0.0) as i64;
            if level > community_level {
                continue;
            }
            if let Some(community) = string_value(batch, "community", row) {
                communities.insert(community);
            }
        }
    }

    let mut out = Vec::new();
    for batch in reports {
        for row in 0..batch.num_rows() {
            let level = numeric_value(batch, "level", row).unwrap_or(0.0) as i64;
            if level > community_level {
                continue;
            }
            let community_id = required_string(batch, "community", row)?;
            if !communities.contains(&community_id) {
                continue;
            }
            out.push(CommunityReport {
                id: required_string(batch, "id", row)?,
                short_id: string_value(batch, "human_readable_id", row),
                community_id,
                title: string_value(batch, "title", row).unwrap_or_default(),
                summary: string_value(batch, "summary", row).unwrap_or_default(),
                full_content: string_value(batch, "full_content", row).unwrap_or_default(),
                rank: numeric_value(batch, "rank", row).unwrap_or(0.0),
                level,
            });
        }
    }
    Ok(out)
}

/// One text unit per row. The short id is the running row index, matching
/// how the pipeline numbers sources for citation.
pub fn read_text_units(batches: &[RecordBatch]) -> Result<Vec<TextUnit>> {
    let mut out = Vec::new();
    let mut index = 0usize;
    for batch in batches {
        for row in 0..batch.num_rows() {
            out.push(TextUnit {
                id: required_string(batch, "id", row)?,
                short_id: Some(index.to_string()),
                text: string_value(batch, "text", row).unwrap_or_default(),
                n_tokens: numeric_value(batch, "n_tokens", row).map(|v| v as i64),
                entity_ids: string_list(batch, "entity_ids", row),
                relationship_ids: string_list(batch, "relationship_ids", row),
                document_ids: string_list(batch, "document_ids", row),
            });
            index += 1;
        }
    }
    Ok(out)
}

/// One claim record per covariate row.
pub fn read_covariates(batches: &[RecordBatch]) -> Result<Vec<Covariate>> {
    let mut out = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            out.push(Covariate {
                id: required_string(batch, "id", row)?,
                short_id: string_value(batch, "human_readable_id", row),
                subject_id: required_string(batch, "subject_id", row)?,
                covariate_type: string_value(batch, "type", row)
                    .unwrap_or_else(|| "claim".to_string()),
                description: string_value(batch, "description", row),
                object_id: string_value(batch, "object_id", row),
                status: string_value(batch, "status", row),
                text_unit_ids: string_list(batch, "text_unit_ids", row),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::types::Float32Type;
    use arrow_array::{Float64Array, Int64Array, ListArray, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn node_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("level", DataType::Int64, false),
            Field::new("degree", DataType::Int64, false),
            Field::new("community", DataType::Int64, true),
        ]));
        // e1 appears at two levels with different communities; e3 sits
        // below the configured level and must be filtered out.
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["e1", "e2", "e1", "e3"])),
                Arc::new(StringArray::from(vec!["ALPHA", "BETA", "ALPHA", "GAMMA"])),
                Arc::new(Int64Array::from(vec![0, 0, 1, 3])),
                Arc::new(Int64Array::from(vec![2, 1, 3, 9])),
                Arc::new(Int64Array::from(vec![0, 0, 4, 7])),
            ],
        )
        .unwrap()
    }

    fn entity_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("human_readable_id", DataType::Int64, false),
            Field::new("description", DataType::Utf8, true),
            Field::new(
                "description_embedding",
                DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
                true,
            ),
        ]));
        let embeddings = ListArray::from_iter_primitive::<Float32Type, _, _>(vec![
            Some(vec![Some(1.0), Some(0.0)]),
            Some(vec![Some(0.0), Some(1.0)]),
        ]);
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["e1", "e2"])),
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["first entity", "second entity"])),
                Arc::new(embeddings),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_read_entities_filters_and_joins() {
        let entities = read_entities(&[node_batch()], &[entity_batch()], 2).unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, "e1");
        assert_eq!(entities[0].title, "ALPHA");
        // max degree across the two surviving rows
        assert_eq!(entities[0].rank, 3.0);
        assert_eq!(entities[0].community_ids, vec!["0", "4"]);
        assert_eq!(entities[0].description.as_deref(), Some("first entity"));
        assert_eq!(entities[0].description_embedding, Some(vec![1.0, 0.0]));
        assert_eq!(entities[1].id, "e2");
    }

    #[test]
    fn test_read_entities_level_zero() {
        let entities = read_entities(&[node_batch()], &[entity_batch()], 0).unwrap();
        assert_eq!(entities.len(), 2);
        // community from level 1 no longer contributes
        assert_eq!(entities[0].community_ids, vec!["0"]);
        assert_eq!(entities[0].rank, 2.0);
    }

    #[test]
    fn test_read_reports_respects_node_filter() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("human_readable_id", DataType::Int64, false),
            Field::new("community", DataType::Int64, false),
            Field::new("level", DataType::Int64, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new("full_content", DataType::Utf8, false),
            Field::new("rank", DataType::Float64, false),
        ]));
        // community 7 only exists on level-3 nodes, so its report is dropped
        let reports = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["r0", "r4", "r7"])),
                Arc::new(Int64Array::from(vec![10, 14, 17])),
                Arc::new(Int64Array::from(vec![0, 4, 7])),
                Arc::new(Int64Array::from(vec![0, 1, 2])),
                Arc::new(StringArray::from(vec!["Zero", "Four", "Seven"])),
                Arc::new(StringArray::from(vec!["s0", "s4", "s7"])),
                Arc::new(StringArray::from(vec!["c0", "c4", "c7"])),
                Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0])),
            ],
        )
        .unwrap();

        let out = read_reports(&[reports], &[node_batch()], 2).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].community_id, "0");
        assert_eq!(out[0].short_id.as_deref(), Some("10"));
        assert_eq!(out[1].community_id, "4");
    }

    #[test]
    fn test_read_relationships_defaults_weight() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("target", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["r1"])),
                Arc::new(StringArray::from(vec!["ALPHA"])),
                Arc::new(StringArray::from(vec!["BETA"])),
            ],
        )
        .unwrap();

        let rels = read_relationships(&[batch]).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].weight, 1.0);
    }

    #[test]
    fn test_read_text_units_numbers_rows() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["t1", "t2"])),
                Arc::new(StringArray::from(vec!["one", "two"])),
            ],
        )
        .unwrap();

        let units = read_text_units(&[batch]).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].short_id.as_deref(), Some("1"));
    }
}
