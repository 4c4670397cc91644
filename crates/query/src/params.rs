use serde::{Deserialize, Serialize};

/// Context-shaping knobs for local search: how the token budget is split
/// between text units and community summaries, top-k inclusion limits, and
/// the conversation-history window.
///
/// Values are passed through to the context builder unmodified; no range
/// validation happens at this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalContextParams {
    /// Share of the token budget given to source text units.
    pub text_unit_prop: f64,
    /// Share of the token budget given to community summaries.
    pub community_prop: f64,
    pub conversation_history_max_turns: usize,
    pub conversation_history_user_turns_only: bool,
    pub top_k_mapped_entities: usize,
    pub top_k_relationships: usize,
    pub include_entity_rank: bool,
    pub include_relationship_weight: bool,
    pub include_community_rank: bool,
    /// When set, the result records carry every candidate considered
    /// instead of only what fit in the context window.
    pub return_candidate_context: bool,
    /// Overall context-window budget in tokens.
    pub max_context_tokens: usize,
}

impl Default for LocalContextParams {
    fn default() -> Self {
        Self {
            text_unit_prop: 0.5,
            community_prop: 0.1,
            conversation_history_max_turns: 5,
            conversation_history_user_turns_only: true,
            top_k_mapped_entities: 10,
            top_k_relationships: 10,
            include_entity_rank: true,
            include_relationship_weight: true,
            include_community_rank: false,
            return_candidate_context: false,
            max_context_tokens: 12_000,
        }
    }
}

/// Model-call knobs, forwarded to the chat backend as-is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelParams {
    pub max_tokens: usize,
    pub temperature: f32,
}
