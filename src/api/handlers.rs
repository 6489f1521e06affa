use axum::{
    extract::{rejection::JsonRejection, State},
    response::Html,
    Json,
};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{error, info, warn};

use super::AppState;
use crate::{
    api::types::GenerateRequest,
    error::{AppError, GenerationError, ValidationError},
    render::{GenerationView, INDEX_PAGE},
};

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn generate_handler(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Html<String>, AppError> {
    let Json(body) = payload.map_err(|rejection| {
        let message = rejection.body_text();
        error!(error = %message, "unreadable generate body");
        AppError::MalformedRequest(message)
    })?;
    let req = GenerateRequest::try_from(body).map_err(|e| {
        error!(error = %e, "invalid generate body");
        e
    })?;

    let prompt = match req.prompt() {
        Some(p) => p.to_owned(),
        None => {
            warn!("generate request without prompt");
            return Err(ValidationError::PromptRequired.into());
        }
    };

    let started = Instant::now();
    let generated_code = run_generation(&state, prompt.clone()).await.map_err(|e| {
        error!(error = %e, prompt_chars = prompt.chars().count(), "generation failed");
        e
    })?;

    info!(
        prompt_chars = prompt.chars().count(),
        output_chars = generated_code.chars().count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generation complete"
    );

    let page = state.templates.render_generation(&GenerationView {
        prompt: &prompt,
        generated_code: &generated_code,
    })?;
    Ok(Html(page))
}

/// Runs the blocking model call on the blocking pool.
async fn run_generation(state: &AppState, prompt: String) -> Result<String, GenerationError> {
    let generator = state.generator.clone();
    let params = state.params;

    tokio::task::spawn_blocking(move || generator.generate(&prompt, params))
        .await
        .map_err(|e| GenerationError::Worker(e.to_string()))?
}
