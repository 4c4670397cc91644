//! Assembles the local-search context window: the entities nearest the
//! question, the relationships and claims that connect them, community
//! summaries, and the source text they were extracted from, packed into a
//! token budget.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use context::{
    CommunityReport, Covariate, EmbeddingStore, Entity, Relationship, TextEmbedder, TextUnit,
};

use crate::history::{render_history, ConversationTurn};
use crate::params::LocalContextParams;

/// Search the store for more candidates than requested so unknown ids can
/// be dropped without starving the selection.
const OVERSAMPLE_SCALER: usize = 2;

/// The records that made it into (or were considered for) the context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextRecords {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub reports: Vec<CommunityReport>,
    pub text_units: Vec<TextUnit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextResult {
    pub context_text: String,
    pub records: ContextRecords,
}

/// Aggregates everything local search needs to answer a query.
///
/// Cross-references between records (entity ids in text units, community
/// ids in reports) were resolved by the indexing pipeline; they are trusted
/// here, not re-verified.
pub struct LocalContextBuilder {
    entities: Vec<Entity>,
    entity_by_id: HashMap<String, usize>,
    relationships: Vec<Relationship>,
    reports: Vec<CommunityReport>,
    text_units: Vec<TextUnit>,
    text_unit_by_id: HashMap<String, usize>,
    covariates: Option<Vec<Covariate>>,
    embedding_store: Arc<dyn EmbeddingStore>,
    embedder: Arc<dyn TextEmbedder>,
}

impl LocalContextBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        reports: Vec<CommunityReport>,
        text_units: Vec<TextUnit>,
        covariates: Option<Vec<Covariate>>,
        embedding_store: Arc<dyn EmbeddingStore>,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Self {
        let entity_by_id = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        let text_unit_by_id = text_units
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self {
            entities,
            entity_by_id,
            relationships,
            reports,
            text_units,
            text_unit_by_id,
            covariates,
            embedding_store,
            embedder,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    pub fn text_unit_count(&self) -> usize {
        self.text_units.len()
    }

    pub fn covariate_count(&self) -> usize {
        self.covariates.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    /// Build the context window for one question.
    pub async fn build_context(
        &self,
        question: &str,
        history: &[ConversationTurn],
        params: &LocalContextParams,
    ) -> Result<ContextResult> {
        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .context("Failed to embed question")?;

        let hits = self
            .embedding_store
            .similarity_search(
                &query_embedding,
                params.top_k_mapped_entities * OVERSAMPLE_SCALER,
            )
            .await
            .context("Entity similarity search failed")?;

        let mut candidates: Vec<&Entity> = Vec::new();
        for hit in &hits {
            if let Some(&idx) = self.entity_by_id.get(&hit.id) {
                candidates.push(&self.entities[idx]);
            }
        }
        let selected: Vec<&Entity> = candidates
            .iter()
            .copied()
            .take(params.top_k_mapped_entities)
            .collect();

        let mut sections: Vec<String> = Vec::new();

        if let Some(history_section) = render_history(
            history,
            params.conversation_history_max_turns,
            params.conversation_history_user_turns_only,
        ) {
            sections.push(history_section);
        }

        sections.push(entity_section(&selected, params.include_entity_rank));

        let claims = self.select_claims(&selected);
        if !claims.is_empty() {
            sections.push(claims_section(&claims));
        }

        let (rels_included, rels_candidates) =
            self.select_relationships(&selected, params.top_k_relationships);
        if !rels_included.is_empty() {
            sections.push(relationship_section(
                &rels_included,
                params.include_relationship_weight,
            ));
        }

        let community_budget =
            (params.max_context_tokens as f64 * params.community_prop) as usize;
        let (reports_included, reports_candidates) =
            self.select_reports(&selected, community_budget);
        if !reports_included.is_empty() {
            sections.push(report_section(
                &reports_included,
                params.include_community_rank,
            ));
        }

        let text_unit_budget =
            (params.max_context_tokens as f64 * params.text_unit_prop) as usize;
        let (units_included, units_candidates) =
            self.select_text_units(&selected, text_unit_budget);
        if !units_included.is_empty() {
            sections.push(source_section(&units_included));
        }

        let context_text = sections.join("\n");

        let records = if params.return_candidate_context {
            ContextRecords {
                entities: candidates.into_iter().cloned().collect(),
                relationships: rels_candidates.into_iter().cloned().collect(),
                reports: reports_candidates.into_iter().cloned().collect(),
                text_units: units_candidates.into_iter().cloned().collect(),
            }
        } else {
            ContextRecords {
                entities: selected.into_iter().cloned().collect(),
                relationships: rels_included.into_iter().cloned().collect(),
                reports: reports_included.into_iter().cloned().collect(),
                text_units: units_included.into_iter().cloned().collect(),
            }
        };

        Ok(ContextResult {
            context_text,
            records,
        })
    }

    /// In-network edges (both endpoints selected) ranked by weight, then
    /// edges reaching out of the selection, capped at `top_k`.
    fn select_relationships<'a>(
        &'a self,
        selected: &[&Entity],
        top_k: usize,
    ) -> (Vec<&'a Relationship>, Vec<&'a Relationship>) {
        let titles: HashSet<&str> = selected.iter().map(|e| e.title.as_str()).collect();

        let mut in_network: Vec<&Relationship> = Vec::new();
        let mut out_network: Vec<&Relationship> = Vec::new();
        for rel in &self.relationships {
            let source_in = titles.contains(rel.source.as_str());
            let target_in = titles.contains(rel.target.as_str());
            if source_in && target_in {
                in_network.push(rel);
            } else if source_in || target_in {
                out_network.push(rel);
            }
        }
        in_network.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        out_network.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let candidates: Vec<&Relationship> =
            in_network.into_iter().chain(out_network).collect();
        let included = candidates.iter().copied().take(top_k).collect();
        (included, candidates)
    }

    /// Reports covering the selected entities, ranked by how many selected
    /// entities each community covers and then by report rank, greedily
    /// packed into the community token budget.
    fn select_reports<'a>(
        &'a self,
        selected: &[&Entity],
        budget_tokens: usize,
    ) -> (Vec<&'a CommunityReport>, Vec<&'a CommunityReport>) {
        let mut coverage: HashMap<&str, usize> = HashMap::new();
        for entity in selected {
            for community in &entity.community_ids {
                *coverage.entry(community.as_str()).or_insert(0) += 1;
            }
        }

        let mut candidates: Vec<&CommunityReport> = self
            .reports
            .iter()
            .filter(|r| coverage.contains_key(r.community_id.as_str()))
            .collect();
        candidates.sort_by(|a, b| {
            let cover_a = coverage.get(a.community_id.as_str()).copied().unwrap_or(0);
            let cover_b = coverage.get(b.community_id.as_str()).copied().unwrap_or(0);
            cover_b
                .cmp(&cover_a)
                .then_with(|| b.rank.total_cmp(&a.rank))
        });

        let mut included = Vec::new();
        let mut used = 0usize;
        for report in &candidates {
            let cost = estimate_tokens(&report.full_content);
            if used + cost > budget_tokens {
                break;
            }
            used += cost;
            included.push(*report);
        }
        (included, candidates)
    }

    /// Text units referenced by the selected entities, in selection order,
    /// greedily packed into the text-unit token budget.
    fn select_text_units<'a>(
        &'a self,
        selected: &[&Entity],
        budget_tokens: usize,
    ) -> (Vec<&'a TextUnit>, Vec<&'a TextUnit>) {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut candidates: Vec<&TextUnit> = Vec::new();
        for entity in selected {
            for unit_id in &entity.text_unit_ids {
                if !seen.insert(unit_id.as_str()) {
                    continue;
                }
                if let Some(&idx) = self.text_unit_by_id.get(unit_id) {
                    candidates.push(&self.text_units[idx]);
                }
            }
        }

        let mut included = Vec::new();
        let mut used = 0usize;
        for unit in &candidates {
            let cost = estimate_tokens(&unit.text);
            if used + cost > budget_tokens {
                break;
            }
            used += cost;
            included.push(*unit);
        }
        (included, candidates)
    }

    fn select_claims(&self, selected: &[&Entity]) -> Vec<&Covariate> {
        let Some(covariates) = self.covariates.as_ref() else {
            return Vec::new();
        };
        let titles: HashSet<&str> = selected.iter().map(|e| e.title.as_str()).collect();
        covariates
            .iter()
            .filter(|c| titles.contains(c.subject_id.as_str()))
            .collect()
    }
}

/// Rough token count for budget packing, ~1.3 tokens per word. A real
/// tokenizer would be tighter; this only has to keep sections near their
/// proportions.
fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * 1.3) as usize
}

fn row_id(short_id: &Option<String>, id: &str) -> String {
    short_id.clone().unwrap_or_else(|| id.to_string())
}

fn entity_section(entities: &[&Entity], include_rank: bool) -> String {
    let mut section = String::from("-----Entities-----\n");
    if include_rank {
        section.push_str("id|entity|description|number of relationships\n");
    } else {
        section.push_str("id|entity|description\n");
    }
    for entity in entities {
        let description = entity.description.as_deref().unwrap_or("");
        if include_rank {
            section.push_str(&format!(
                "{}|{}|{}|{}\n",
                row_id(&entity.short_id, &entity.id),
                entity.title,
                description,
                entity.rank as i64
            ));
        } else {
            section.push_str(&format!(
                "{}|{}|{}\n",
                row_id(&entity.short_id, &entity.id),
                entity.title,
                description
            ));
        }
    }
    section
}

fn relationship_section(relationships: &[&Relationship], include_weight: bool) -> String {
    let mut section = String::from("-----Relationships-----\n");
    if include_weight {
        section.push_str("id|source|target|description|weight\n");
    } else {
        section.push_str("id|source|target|description\n");
    }
    for rel in relationships {
        let description = rel.description.as_deref().unwrap_or("");
        if include_weight {
            section.push_str(&format!(
                "{}|{}|{}|{}|{}\n",
                row_id(&rel.short_id, &rel.id),
                rel.source,
                rel.target,
                description,
                rel.weight
            ));
        } else {
            section.push_str(&format!(
                "{}|{}|{}|{}\n",
                row_id(&rel.short_id, &rel.id),
                rel.source,
                rel.target,
                description
            ));
        }
    }
    section
}

fn report_section(reports: &[&CommunityReport], include_rank: bool) -> String {
    let mut section = String::from("-----Reports-----\n");
    if include_rank {
        section.push_str("id|title|content|rank\n");
    } else {
        section.push_str("id|title|content\n");
    }
    for report in reports {
        if include_rank {
            section.push_str(&format!(
                "{}|{}|{}|{}\n",
                row_id(&report.short_id, &report.id),
                report.title,
                report.full_content,
                report.rank
            ));
        } else {
            section.push_str(&format!(
                "{}|{}|{}\n",
                row_id(&report.short_id, &report.id),
                report.title,
                report.full_content
            ));
        }
    }
    section
}

fn source_section(units: &[&TextUnit]) -> String {
    let mut section = String::from("-----Sources-----\nid|text\n");
    for unit in units {
        section.push_str(&format!(
            "{}|{}\n",
            row_id(&unit.short_id, &unit.id),
            unit.text
        ));
    }
    section
}

fn claims_section(claims: &[&Covariate]) -> String {
    let mut section = String::from("-----Claims-----\nid|subject|type|status|description\n");
    for claim in claims {
        section.push_str(&format!(
            "{}|{}|{}|{}|{}\n",
            row_id(&claim.short_id, &claim.id),
            claim.subject_id,
            claim.covariate_type,
            claim.status.as_deref().unwrap_or(""),
            claim.description.as_deref().unwrap_or("")
        ));
    }
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context::ScoredId;

    struct FakeEmbedder;

    #[async_trait]
    impl TextEmbedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct FakeStore {
        hits: Vec<ScoredId>,
    }

    #[async_trait]
    impl EmbeddingStore for FakeStore {
        async fn similarity_search(&self, _vector: &[f32], k: usize) -> Result<Vec<ScoredId>> {
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    fn entity(id: &str, title: &str, communities: &[&str], units: &[&str]) -> Entity {
        Entity {
            id: id.to_string(),
            short_id: None,
            title: title.to_string(),
            entity_type: None,
            description: Some(format!("about {title}")),
            description_embedding: None,
            rank: 1.0,
            community_ids: communities.iter().map(|s| s.to_string()).collect(),
            text_unit_ids: units.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn relationship(id: &str, source: &str, target: &str, weight: f64) -> Relationship {
        Relationship {
            id: id.to_string(),
            short_id: None,
            source: source.to_string(),
            target: target.to_string(),
            description: None,
            weight,
            text_unit_ids: Vec::new(),
        }
    }

    fn report(id: &str, community: &str, rank: f64, content: &str) -> CommunityReport {
        CommunityReport {
            id: id.to_string(),
            short_id: Some(format!("hr-{id}")),
            community_id: community.to_string(),
            title: format!("report {id}"),
            summary: content.to_string(),
            full_content: content.to_string(),
            rank,
            level: 0,
        }
    }

    fn text_unit(id: &str, text: &str) -> TextUnit {
        TextUnit {
            id: id.to_string(),
            short_id: None,
            text: text.to_string(),
            n_tokens: None,
            entity_ids: Vec::new(),
            relationship_ids: Vec::new(),
            document_ids: Vec::new(),
        }
    }

    fn hit(id: &str, score: f32) -> ScoredId {
        ScoredId {
            id: id.to_string(),
            score,
        }
    }

    fn builder(hits: Vec<ScoredId>) -> LocalContextBuilder {
        LocalContextBuilder::new(
            vec![
                entity("e1", "ALPHA", &["0"], &["t1", "t2"]),
                entity("e2", "BETA", &["0", "4"], &["t2", "t3"]),
                entity("e3", "GAMMA", &["4"], &["t3"]),
            ],
            vec![
                relationship("r1", "ALPHA", "BETA", 5.0),
                relationship("r2", "BETA", "GAMMA", 7.0),
                relationship("r3", "ALPHA", "DELTA", 9.0),
            ],
            vec![
                report("rep0", "0", 1.0, "community zero report"),
                report("rep4", "4", 9.0, "community four report"),
            ],
            vec![
                text_unit("t1", "alpha beta gamma"),
                text_unit("t2", "delta epsilon zeta"),
                text_unit("t3", "eta theta iota"),
            ],
            None,
            Arc::new(FakeStore { hits }),
            Arc::new(FakeEmbedder),
        )
    }

    #[tokio::test]
    async fn test_entity_selection_follows_store_order() {
        let ctx = builder(vec![hit("e2", 0.9), hit("e1", 0.8), hit("e3", 0.7)]);
        let params = LocalContextParams {
            top_k_mapped_entities: 2,
            ..Default::default()
        };

        let result = ctx.build_context("question", &[], &params).await.unwrap();
        assert_eq!(result.records.entities.len(), 2);
        assert_eq!(result.records.entities[0].id, "e2");
        assert_eq!(result.records.entities[1].id, "e1");
        assert!(result.context_text.contains("-----Entities-----"));
        assert!(result.context_text.contains("BETA"));
    }

    #[tokio::test]
    async fn test_unknown_store_ids_are_skipped() {
        let ctx = builder(vec![hit("missing", 0.9), hit("e1", 0.8)]);
        let params = LocalContextParams::default();

        let result = ctx.build_context("question", &[], &params).await.unwrap();
        assert_eq!(result.records.entities.len(), 1);
        assert_eq!(result.records.entities[0].id, "e1");
    }

    #[tokio::test]
    async fn test_in_network_relationships_come_first() {
        let ctx = builder(vec![hit("e1", 0.9), hit("e2", 0.8)]);
        let params = LocalContextParams {
            top_k_relationships: 1,
            ..Default::default()
        };

        let result = ctx.build_context("question", &[], &params).await.unwrap();
        // r3 has the highest weight but reaches outside the selection;
        // the in-network edge r1 wins.
        assert_eq!(result.records.relationships.len(), 1);
        assert_eq!(result.records.relationships[0].id, "r1");
    }

    #[tokio::test]
    async fn test_reports_ranked_by_coverage() {
        let ctx = builder(vec![hit("e1", 0.9), hit("e2", 0.8)]);
        let params = LocalContextParams::default();

        let result = ctx.build_context("question", &[], &params).await.unwrap();
        // community 0 covers both selected entities, community 4 only one
        assert_eq!(result.records.reports.len(), 2);
        assert_eq!(result.records.reports[0].id, "rep0");
        // report rows print the human-readable id like every other section
        assert!(result.context_text.contains("hr-rep0|"));
    }

    #[tokio::test]
    async fn test_token_budget_limits_text_units() {
        let ctx = builder(vec![hit("e1", 0.9), hit("e2", 0.8)]);
        // text-unit budget = 0.5 * 7 = 3 tokens, one 3-word unit fits
        let params = LocalContextParams {
            max_context_tokens: 7,
            ..Default::default()
        };

        let result = ctx.build_context("question", &[], &params).await.unwrap();
        assert_eq!(result.records.text_units.len(), 1);
        assert_eq!(result.records.text_units[0].id, "t1");
        // community budget rounds down to 0, so no reports fit
        assert!(result.records.reports.is_empty());
    }

    #[tokio::test]
    async fn test_candidate_context_returns_everything_considered() {
        let ctx = builder(vec![hit("e1", 0.9), hit("e2", 0.8)]);
        let params = LocalContextParams {
            top_k_relationships: 1,
            return_candidate_context: true,
            ..Default::default()
        };

        let result = ctx.build_context("question", &[], &params).await.unwrap();
        assert_eq!(result.records.relationships.len(), 3);
    }

    #[tokio::test]
    async fn test_history_is_rendered_into_context() {
        use crate::history::Role;

        let ctx = builder(vec![hit("e1", 0.9)]);
        let params = LocalContextParams::default();
        let history = vec![ConversationTurn {
            role: Role::User,
            content: "earlier question".to_string(),
        }];

        let result = ctx
            .build_context("question", &history, &params)
            .await
            .unwrap();
        assert!(result.context_text.contains("-----Conversation History-----"));
        assert!(result.context_text.contains("earlier question"));
    }
}
