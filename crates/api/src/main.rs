use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod consts;
mod localsearch;
mod settings;

use context::OllamaEmbedder;
use query::{ConversationTurn, LocalSearch, OllamaChat};

use localsearch::{build_local_search_engine, load_local_context};
use settings::Settings;

struct AppState {
    engine: LocalSearch,
}

#[derive(Deserialize)]
struct SearchRequest {
    question: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

#[derive(Serialize)]
struct SearchResponse {
    response: String,
    completion_time_ms: u64,
    context: ContextStats,
}

#[derive(Serialize)]
struct ContextStats {
    entities: usize,
    relationships: usize,
    reports: usize,
    text_units: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    entities: usize,
    relationships: usize,
    reports: usize,
    text_units: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env()?;

    let embedder = Arc::new(OllamaEmbedder::new(
        settings.ollama_base_url.clone(),
        settings.embedding_model.clone(),
    ));

    let context_builder = load_local_context(
        &settings.input_dir,
        &settings.lancedb_uri,
        embedder,
        settings.load_covariates,
    )
    .await
    .context("Failed to load local search context")?;

    let llm = Arc::new(OllamaChat::new(
        settings.ollama_base_url.clone(),
        settings.chat_model.clone(),
    ));
    let engine = build_local_search_engine(llm, context_builder, &settings);

    let state = Arc::new(AppState { engine });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/search", post(search))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;

    tracing::info!("Server listening on http://{}", settings.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let builder = state.engine.context_builder();
    Json(HealthResponse {
        entities: builder.entity_count(),
        relationships: builder.relationship_count(),
        reports: builder.report_count(),
        text_units: builder.text_unit_count(),
    })
}

fn error_body(message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<serde_json::Value>)> {
    let result = state
        .engine
        .search(&req.question, &req.history)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(&format!("Search failed: {e}")),
            )
        })?;

    Ok(Json(SearchResponse {
        response: result.response,
        completion_time_ms: result.completion_time_ms,
        context: ContextStats {
            entities: result.context_data.entities.len(),
            relationships: result.context_data.relationships.len(),
            reports: result.context_data.reports.len(),
            text_units: result.context_data.text_units.len(),
        },
    }))
}
