//! Local search over loaded knowledge-graph artifacts: parameter bundles,
//! the mixed-context builder, and the search engine itself.

pub mod history;
pub mod llm;
pub mod local_search;
pub mod mixed_context;
pub mod params;

pub use history::{ConversationTurn, Role};
pub use llm::{ChatModel, OllamaChat};
pub use local_search::{LocalSearch, SearchResult};
pub use mixed_context::{ContextRecords, ContextResult, LocalContextBuilder};
pub use params::{LocalContextParams, ModelParams};
