use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::history::ConversationTurn;
use crate::llm::ChatModel;
use crate::mixed_context::{ContextRecords, LocalContextBuilder};
use crate::params::{LocalContextParams, ModelParams};

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub response: String,
    pub context_text: String,
    pub context_data: ContextRecords,
    pub completion_time_ms: u64,
}

/// Answers natural-language questions over the assembled context.
/// Stateless between queries; conversation history is supplied per call.
pub struct LocalSearch {
    llm: Arc<dyn ChatModel>,
    context_builder: LocalContextBuilder,
    context_params: LocalContextParams,
    model_params: ModelParams,
    response_type: String,
}

impl LocalSearch {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        context_builder: LocalContextBuilder,
        context_params: LocalContextParams,
        model_params: ModelParams,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            context_builder,
            context_params,
            model_params,
            response_type: response_type.into(),
        }
    }

    pub fn context_builder(&self) -> &LocalContextBuilder {
        &self.context_builder
    }

    pub fn context_params(&self) -> &LocalContextParams {
        &self.context_params
    }

    pub fn model_params(&self) -> &ModelParams {
        &self.model_params
    }

    pub async fn search(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<SearchResult> {
        let started = Instant::now();

        // Step 1: Build the context window
        let context = self
            .context_builder
            .build_context(question, history, &self.context_params)
            .await?;

        // Step 2: Generate the answer
        let prompt = build_search_prompt(&context.context_text, question, &self.response_type);
        let response = self.llm.generate(&prompt, &self.model_params).await?;

        tracing::info!(
            question_len = question.len(),
            context_len = context.context_text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Local search completed"
        );

        Ok(SearchResult {
            response,
            context_text: context.context_text,
            context_data: context.records,
            completion_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn build_search_prompt(context: &str, question: &str, response_type: &str) -> String {
    format!(
        r#"You are a helpful assistant answering questions about a knowledge graph built from source documents.

CONTEXT:
{}

USER QUESTION: {}

INSTRUCTIONS:
- Answer the question using only information from the context above
- Cite the entities, relationships, reports, or sources that support your answer
- If the context doesn't contain enough information, say so
- Format the response as: {}

ANSWER:"#,
        context, question, response_type
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context::{EmbeddingStore, Entity, ScoredId, TextEmbedder};

    struct FakeEmbedder;

    #[async_trait]
    impl TextEmbedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    struct FakeStore;

    #[async_trait]
    impl EmbeddingStore for FakeStore {
        async fn similarity_search(&self, _vector: &[f32], _k: usize) -> Result<Vec<ScoredId>> {
            Ok(vec![ScoredId {
                id: "e1".to_string(),
                score: 1.0,
            }])
        }
    }

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn generate(&self, prompt: &str, _params: &ModelParams) -> Result<String> {
            Ok(format!("echo: {}", prompt.len()))
        }
    }

    fn engine() -> LocalSearch {
        let entities = vec![Entity {
            id: "e1".to_string(),
            short_id: None,
            title: "ALPHA".to_string(),
            entity_type: None,
            description: Some("the first entity".to_string()),
            description_embedding: None,
            rank: 1.0,
            community_ids: Vec::new(),
            text_unit_ids: Vec::new(),
        }];
        let builder = LocalContextBuilder::new(
            entities,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
            Arc::new(FakeStore),
            Arc::new(FakeEmbedder),
        );
        LocalSearch::new(
            Arc::new(EchoModel),
            builder,
            LocalContextParams::default(),
            ModelParams {
                max_tokens: 512,
                temperature: 0.0,
            },
            "multiple paragraphs",
        )
    }

    #[tokio::test]
    async fn test_search_builds_context_and_answers() {
        let result = engine().search("who is ALPHA?", &[]).await.unwrap();
        assert!(result.response.starts_with("echo:"));
        assert!(result.context_text.contains("ALPHA"));
        assert_eq!(result.context_data.entities.len(), 1);
    }

    #[test]
    fn test_prompt_carries_response_type() {
        let prompt = build_search_prompt("ctx", "q", "multiple paragraphs");
        assert!(prompt.contains("multiple paragraphs"));
        assert!(prompt.contains("USER QUESTION: q"));
    }
}
